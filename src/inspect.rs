// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/inspect.rs - 判定、标注与检测流水线
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

use std::fmt;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  config::InspectConfig,
  consolidate::{ConsolidatedRegion, consolidate},
  detector::{Detector, ModelHandle},
  model::Model,
  output::draw::{DashStyle, draw_dashed_rect_mut},
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 检测到腐蚀时固定报告的置信度
pub const CORROSION_CONFIDENCE: f32 = 0.99;
/// 未检测到腐蚀时固定报告的置信度
pub const NO_CORROSION_CONFIDENCE: f32 = 0.01;

#[derive(Error, Debug)]
pub enum InspectError {
  #[error("模型不可用: {0}")]
  ModelUnavailable(#[source] BoxError),
  #[error("输入无效: {0}")]
  InvalidInput(String),
  #[error("推理错误: {0}")]
  Inference(#[source] BoxError),
  #[error("标注图像渲染错误: {0}")]
  ImageRender(String),
  #[error("推理工作线程已退出")]
  PoolClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
  Corrosion,
  NoCorrosion,
}

impl Label {
  pub fn as_str(&self) -> &'static str {
    match self {
      Label::Corrosion => "corrosion",
      Label::NoCorrosion => "no_corrosion",
    }
  }

  /// 固定置信度，不随检测强度变化
  pub fn confidence(&self) -> f32 {
    match self {
      Label::Corrosion => CORROSION_CONFIDENCE,
      Label::NoCorrosion => NO_CORROSION_CONFIDENCE,
    }
  }
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for Label {
  type Err = InspectError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "corrosion" => Ok(Label::Corrosion),
      "no_corrosion" => Ok(Label::NoCorrosion),
      other => Err(InspectError::InvalidInput(format!("未知标签: {}", other))),
    }
  }
}

/// 单张图像的检测结果
#[derive(Debug, Clone)]
pub struct InspectionResult {
  pub label: Label,
  pub confidence: f32,
  pub regions: Vec<ConsolidatedRegion>,
  pub annotated_image: RgbImage,
}

impl InspectionResult {
  pub fn has_corrosion(&self) -> bool {
    self.label == Label::Corrosion
  }
}

/// 根据合并后的区域给出判定，并在输入图像的副本上绘制虚线框
pub fn finalize(
  image: &RgbImage,
  regions: Vec<ConsolidatedRegion>,
  style: &DashStyle,
) -> Result<InspectionResult, InspectError> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(InspectError::ImageRender(format!(
      "无法在 {}x{} 的图像上绘制",
      width, height
    )));
  }
  if image.as_raw().len() != (width as usize) * (height as usize) * 3 {
    return Err(InspectError::ImageRender("图像缓冲区长度与尺寸不符".to_string()));
  }

  if let Some(bad) = regions.iter().find(|region| !region.bbox.is_finite()) {
    return Err(InspectError::ImageRender(format!(
      "区域坐标无效: {:?}",
      bad.bbox
    )));
  }

  let mut annotated_image = image.clone();
  for region in regions.iter() {
    draw_dashed_rect_mut(&mut annotated_image, &region.bbox, style);
  }

  let label = if regions.is_empty() {
    Label::NoCorrosion
  } else {
    Label::Corrosion
  };
  debug!("绘制 {} 个区域, 判定为 {}", regions.len(), label);

  Ok(InspectionResult {
    label,
    confidence: label.confidence(),
    regions,
    annotated_image,
  })
}

/// 检测流水线：检测 → 区域合并 → 判定与标注
///
/// 不在调用之间保存状态，唯一共享的是模型句柄。
pub struct Inspector<M> {
  detector: Detector<M>,
  config: InspectConfig,
}

impl<M: Model> Inspector<M> {
  pub fn new(handle: ModelHandle<M>, config: InspectConfig) -> Self {
    Self {
      detector: Detector::new(handle, &config.detector),
      config,
    }
  }

  pub fn config(&self) -> &InspectConfig {
    &self.config
  }

  pub fn detector(&self) -> &Detector<M> {
    &self.detector
  }

  pub fn inspect(&self, image: &RgbImage) -> Result<InspectionResult, InspectError> {
    let now = std::time::Instant::now();
    let detections = self.detector.detect(image)?;
    let regions = consolidate(detections, &self.config.consolidate);
    let result = finalize(image, regions, &self.config.style)?;
    info!(
      "检测完成: {} (置信度 {:.2}, {} 个区域), 耗时: {:.2?}",
      result.label,
      result.confidence,
      result.regions.len(),
      now.elapsed()
    );
    Ok(result)
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;
  use crate::consolidate::BBox;

  fn region(bbox: [f32; 4]) -> ConsolidatedRegion {
    ConsolidatedRegion {
      class_id: 0,
      class_name: "rust".to_string(),
      confidence: 0.3,
      bbox: bbox.into(),
    }
  }

  #[test]
  fn empty_regions_mean_no_corrosion() {
    let image = RgbImage::from_pixel(32, 24, Rgb([40, 40, 40]));
    let result = finalize(&image, Vec::new(), &DashStyle::default()).unwrap();
    assert_eq!(result.label, Label::NoCorrosion);
    assert_eq!(result.confidence, 0.01);
    assert_eq!(result.annotated_image, image);
  }

  #[test]
  fn any_region_means_corrosion_with_fixed_confidence() {
    let image = RgbImage::from_pixel(64, 64, Rgb([40, 40, 40]));
    let result = finalize(&image, vec![region([4.0, 4.0, 40.0, 40.0])], &DashStyle::default()).unwrap();
    assert_eq!(result.label, Label::Corrosion);
    assert_eq!(result.confidence, 0.99);
    assert_eq!(*result.annotated_image.get_pixel(4, 4), Rgb([255, 0, 0]));
    // 原图不变
    assert_eq!(*image.get_pixel(4, 4), Rgb([40, 40, 40]));
  }

  #[test]
  fn non_finite_region_is_render_error() {
    let image = RgbImage::new(16, 16);
    let bad = ConsolidatedRegion {
      bbox: BBox::new(f32::NAN, 0.0, 4.0, 4.0),
      ..region([0.0, 0.0, 4.0, 4.0])
    };
    assert!(matches!(
      finalize(&image, vec![bad], &DashStyle::default()),
      Err(InspectError::ImageRender(_))
    ));
  }

  #[test]
  fn label_parsing_and_serialization() {
    assert_eq!("corrosion".parse::<Label>().unwrap(), Label::Corrosion);
    assert_eq!("No_Corrosion".parse::<Label>().unwrap(), Label::NoCorrosion);
    assert!("maybe".parse::<Label>().is_err());
    assert_eq!(
      serde_json::to_string(&Label::NoCorrosion).unwrap(),
      "\"no_corrosion\""
    );
  }
}
