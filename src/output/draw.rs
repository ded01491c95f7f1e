// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/output/draw.rs - 虚线框绘制
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use serde::{Deserialize, Serialize};

use crate::consolidate::BBox;

// 虚线样式常量
const DASH_LENGTH: f32 = 6.0;
const GAP_LENGTH: f32 = 4.0;
const STROKE_WIDTH: u32 = 1;
const OUTLINE_COLOR: [u8; 3] = [255, 0, 0]; // 红色

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashStyle {
  pub dash_length: f32,
  pub gap_length: f32,
  pub width: u32,
  pub color: [u8; 3],
}

impl Default for DashStyle {
  fn default() -> Self {
    Self {
      dash_length: DASH_LENGTH,
      gap_length: GAP_LENGTH,
      width: STROKE_WIDTH,
      color: OUTLINE_COLOR,
    }
  }
}

/// 沿长度为 `length` 的线段排布虚线，返回每段实线的 (起点, 终点) 距离
///
/// 每个完整周期画 `dash` 跳过 `gap`；最后一个完整周期之后若还有剩余，
/// 从该处一直画到线段终点。长度为 0 时不画；`dash` 不为正时画实线。
pub fn dash_spans(length: f32, dash: f32, gap: f32) -> Vec<(f32, f32)> {
  if !(length > 0.0) {
    return Vec::new();
  }

  let period = dash + gap.max(0.0);
  if !(dash > 0.0) || !period.is_finite() {
    return vec![(0.0, length)];
  }

  let full = (length / period).floor() as usize;
  let mut spans = Vec::with_capacity(full + 1);
  for j in 0..full {
    let start = j as f32 * period;
    let end = start + dash;
    if end > length {
      break;
    }
    spans.push((start, end));
  }

  let last_start = full as f32 * period;
  if last_start < length {
    spans.push((last_start, length));
  }

  spans
}

/// 画一条虚线，`width` 大于 1 时沿法线方向平移叠画
pub fn draw_dashed_line_mut(image: &mut RgbImage, start: (f32, f32), end: (f32, f32), style: &DashStyle) {
  let dx = end.0 - start.0;
  let dy = end.1 - start.1;
  let length = (dx * dx + dy * dy).sqrt();
  if !(length > 0.0) {
    return;
  }

  let (ux, uy) = (dx / length, dy / length);
  let color = Rgb(style.color);
  let width = style.width.max(1);
  let center = (width - 1) as f32 / 2.0;

  for (s, e) in dash_spans(length, style.dash_length, style.gap_length) {
    let from = (start.0 + ux * s, start.1 + uy * s);
    let to = if e >= length {
      end
    } else {
      (start.0 + ux * e, start.1 + uy * e)
    };

    for k in 0..width {
      let offset = k as f32 - center;
      let (ox, oy) = (-uy * offset, ux * offset);
      draw_line_segment_mut(image, (from.0 + ox, from.1 + oy), (to.0 + ox, to.1 + oy), color);
    }
  }
}

/// 按 上、右、下、左 的顺序画虚线矩形，各边首尾相接
pub fn draw_dashed_rect_mut(image: &mut RgbImage, bbox: &BBox, style: &DashStyle) {
  let BBox { x1, y1, x2, y2 } = *bbox;
  draw_dashed_line_mut(image, (x1, y1), (x2, y1), style);
  draw_dashed_line_mut(image, (x2, y1), (x2, y2), style);
  draw_dashed_line_mut(image, (x2, y2), (x1, y2), style);
  draw_dashed_line_mut(image, (x1, y2), (x1, y1), style);
}

#[cfg(test)]
mod tests {
  use super::*;

  const RED: Rgb<u8> = Rgb([255, 0, 0]);
  const BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);

  /// 检查实线段与间隔拼接后恰好铺满整条边
  fn assert_tiles_once(length: f32, dash: f32, gap: f32) {
    let spans = dash_spans(length, dash, gap);
    assert!(!spans.is_empty());
    assert_eq!(spans[0].0, 0.0);

    let mut covered = 0.0;
    let mut cursor = 0.0;
    for (i, &(s, e)) in spans.iter().enumerate() {
      assert!(s < e && e <= length, "span {:?} out of [0, {}]", (s, e), length);
      if i > 0 {
        assert!((s - cursor - gap).abs() < 1e-3, "gap before {:?} is {}", (s, e), s - cursor);
      }
      covered += s - cursor;
      covered += e - s;
      cursor = e;
    }

    let tail = length - cursor;
    assert!(tail.abs() < 1e-3 || (tail - gap).abs() < 1e-3, "tail {}", tail);
    assert!((covered + tail - length).abs() < 1e-3);
  }

  #[test]
  fn spans_cover_each_edge_exactly_once() {
    for length in [1.0, 5.0, 6.0, 9.0, 10.0, 17.0, 90.0, 98.0, 123.5] {
      assert_tiles_once(length, 6.0, 4.0);
    }
  }

  #[test]
  fn remainder_becomes_final_dash() {
    let spans = dash_spans(98.0, 6.0, 4.0);
    assert_eq!(spans.len(), 10);
    assert_eq!(*spans.last().unwrap(), (90.0, 98.0));

    let spans = dash_spans(90.0, 6.0, 4.0);
    assert_eq!(spans.len(), 9);
    assert_eq!(*spans.last().unwrap(), (80.0, 86.0));
  }

  #[test]
  fn zero_length_has_no_spans() {
    assert!(dash_spans(0.0, 6.0, 4.0).is_empty());
  }

  #[test]
  fn perimeter_of_rectangle_is_tiled() {
    let (w, h) = (90.0, 37.0);
    for edge in [w, h, w, h] {
      assert_tiles_once(edge, 6.0, 4.0);
    }
  }

  #[test]
  fn degenerate_box_draws_nothing() {
    let mut image = RgbImage::from_pixel(32, 32, BACKGROUND);
    draw_dashed_rect_mut(&mut image, &BBox::new(8.0, 8.0, 8.0, 8.0), &DashStyle::default());
    assert!(image.pixels().all(|p| *p == BACKGROUND));
  }

  #[test]
  fn rectangle_has_dashes_and_gaps() {
    let mut image = RgbImage::from_pixel(128, 128, BACKGROUND);
    draw_dashed_rect_mut(&mut image, &BBox::new(10.0, 10.0, 100.0, 100.0), &DashStyle::default());

    // 上边第一段实线与第一个间隔
    assert_eq!(*image.get_pixel(10, 10), RED);
    assert_eq!(*image.get_pixel(13, 10), RED);
    assert_eq!(*image.get_pixel(18, 10), BACKGROUND);
    assert_eq!(*image.get_pixel(23, 10), RED);
    // 右边从右上角开始
    assert_eq!(*image.get_pixel(100, 13), RED);
    assert_eq!(*image.get_pixel(100, 18), BACKGROUND);
    // 内部不受影响
    assert_eq!(*image.get_pixel(50, 50), BACKGROUND);
    assert_eq!(*image.get_pixel(50, 11), BACKGROUND);
  }

  #[test]
  fn wide_stroke_straddles_the_edge() {
    let mut image = RgbImage::from_pixel(64, 64, BACKGROUND);
    let style = DashStyle {
      width: 3,
      ..DashStyle::default()
    };
    draw_dashed_line_mut(&mut image, (10.0, 20.0), (50.0, 20.0), &style);
    assert_eq!(*image.get_pixel(13, 19), RED);
    assert_eq!(*image.get_pixel(13, 20), RED);
    assert_eq!(*image.get_pixel(13, 21), RED);
    assert_eq!(*image.get_pixel(13, 22), BACKGROUND);
  }

  #[test]
  fn lines_leaving_the_image_are_clipped() {
    let mut image = RgbImage::from_pixel(16, 16, BACKGROUND);
    draw_dashed_rect_mut(&mut image, &BBox::new(-20.0, -20.0, 40.0, 40.0), &DashStyle::default());
    assert!(image.pixels().all(|p| *p == BACKGROUND));
  }
}
