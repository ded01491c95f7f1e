// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/consolidate.rs - 区域合并：类别过滤与重叠抑制
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

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{config::ConsolidateConfig, detector::RawDetection};

/// 参与抑制的统一分数。所有框分数相同，抑制退化为按输入顺序的几何去重。
const UNIFORM_SCORE: f32 = 1.0;

/// 轴对齐矩形，像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BBox {
  pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  pub fn is_finite(&self) -> bool {
    self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
  }

  /// 交并比；并集为零时返回 0
  ///
  /// 两个框都按角点 `(x1, y1, x2, y2)` 解释。不按 `(x, y, w, h)` 解读角点坐标，
  /// 因此小框之间的重叠不会被放大。
  pub fn iou(&self, other: &BBox) -> f32 {
    let ix1 = self.x1.max(other.x1);
    let iy1 = self.y1.max(other.y1);
    let ix2 = self.x2.min(other.x2);
    let iy2 = self.y2.min(other.y2);

    let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

impl From<[f32; 4]> for BBox {
  fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
    Self { x1, y1, x2, y2 }
  }
}

impl From<BBox> for [f32; 4] {
  fn from(b: BBox) -> Self {
    [b.x1, b.y1, b.x2, b.y2]
  }
}

/// 接受的腐蚀类别名称集合，统一小写存储，匹配时忽略大小写
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
  names: HashSet<String>,
}

impl Vocabulary {
  pub fn new<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    Self {
      names: names
        .into_iter()
        .map(|name| name.as_ref().trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect(),
    }
  }

  pub fn contains(&self, class_name: &str) -> bool {
    self.names.contains(&class_name.to_lowercase())
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }
}

impl Default for Vocabulary {
  fn default() -> Self {
    Self::new(["corrosion", "rust", "segmentation", "defect", "oxidation"])
  }
}

impl From<Vec<String>> for Vocabulary {
  fn from(names: Vec<String>) -> Self {
    Self::new(names)
  }
}

impl From<Vocabulary> for Vec<String> {
  fn from(vocabulary: Vocabulary) -> Self {
    let mut names: Vec<String> = vocabulary.names.into_iter().collect();
    names.sort();
    names
  }
}

/// 通过类别过滤与重叠抑制的区域
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedRegion {
  pub class_id: u32,
  pub class_name: String,
  pub confidence: f32,
  pub bbox: BBox,
}

impl From<RawDetection> for ConsolidatedRegion {
  fn from(det: RawDetection) -> Self {
    Self {
      class_id: det.class_id,
      class_name: det.class_name,
      confidence: det.confidence,
      bbox: det.bbox,
    }
  }
}

/// 只保留类别名称属于词表的检测，保持输入顺序
pub fn filter_relevant(detections: Vec<RawDetection>, vocabulary: &Vocabulary) -> Vec<RawDetection> {
  detections
    .into_iter()
    .filter(|det| vocabulary.contains(&det.class_name))
    .collect()
}

/// 贪心非极大值抑制，返回保留框的下标
///
/// 分数不高于 `score_floor` 的框不参与；其余按分数降序稳定排序，
/// 分数相同时先出现者优先。与任一已保留框交并比超过 `iou_threshold` 的框被丢弃。
pub fn suppress(boxes: &[BBox], scores: &[f32], iou_threshold: f32, score_floor: f32) -> Vec<usize> {
  debug_assert_eq!(boxes.len(), scores.len());

  let mut order: Vec<usize> = (0..boxes.len().min(scores.len()))
    .filter(|&i| scores[i] > score_floor)
    .collect();
  order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

  let mut kept: Vec<usize> = Vec::with_capacity(order.len());
  for candidate in order {
    let overlaps = kept
      .iter()
      .any(|&k| boxes[k].iou(&boxes[candidate]) > iou_threshold);
    if !overlaps {
      kept.push(candidate);
    }
  }

  kept
}

/// 类别过滤后做纯几何去重
pub fn consolidate(detections: Vec<RawDetection>, config: &ConsolidateConfig) -> Vec<ConsolidatedRegion> {
  let total = detections.len();
  let relevant = filter_relevant(detections, &config.vocabulary);
  if relevant.is_empty() {
    debug!("{} 个检测中没有腐蚀类别", total);
    return Vec::new();
  }

  let boxes: Vec<BBox> = relevant.iter().map(|det| det.bbox).collect();
  let scores = vec![UNIFORM_SCORE; boxes.len()];
  let kept = suppress(&boxes, &scores, config.iou_threshold, config.score_floor);

  debug!(
    "区域合并: 输入 {}, 类别匹配 {}, 抑制后保留 {}",
    total,
    relevant.len(),
    kept.len()
  );

  let mut slots: Vec<Option<RawDetection>> = relevant.into_iter().map(Some).collect();
  kept
    .into_iter()
    .filter_map(|index| slots[index].take())
    .map(ConsolidatedRegion::from)
    .collect()
}
