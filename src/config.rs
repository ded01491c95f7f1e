// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/config.rs - 检测流水线配置
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{consolidate::Vocabulary, model::InferParams, output::draw::DashStyle};

const DEFAULT_RESOLUTION: u32 = 640;
const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.05;
const DEFAULT_IOU_THRESHOLD: f32 = 0.3;
const DEFAULT_SCORE_FLOOR: f32 = 0.1;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("配置文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置文件格式错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("配置项 {field} 无效: {reason}")]
  Invalid { field: &'static str, reason: String },
}

impl ConfigError {
  fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
    ConfigError::Invalid {
      field,
      reason: reason.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  /// 推理输入长边像素
  pub resolution: u32,
  /// 模型自身的置信度下限，取低值把边缘检测留给区域合并判断
  pub confidence_floor: f32,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      resolution: DEFAULT_RESOLUTION,
      confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
    }
  }
}

impl DetectorConfig {
  pub fn infer_params(&self) -> InferParams {
    InferParams {
      resolution: self.resolution,
      confidence_floor: self.confidence_floor,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidateConfig {
  pub iou_threshold: f32,
  pub score_floor: f32,
  pub vocabulary: Vocabulary,
}

impl Default for ConsolidateConfig {
  fn default() -> Self {
    Self {
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      score_floor: DEFAULT_SCORE_FLOOR,
      vocabulary: Vocabulary::default(),
    }
  }
}

/// 完整的流水线配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectConfig {
  pub detector: DetectorConfig,
  pub consolidate: ConsolidateConfig,
  pub style: DashStyle,
}

impl InspectConfig {
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("读取配置文件: {}", path.display());
    let data = std::fs::read(path)?;
    let config: InspectConfig = serde_json::from_slice(&data)?;
    config.validate()?;
    Ok(config)
  }

  pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
    self.consolidate.vocabulary = vocabulary;
    self
  }

  pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.consolidate.iou_threshold = iou_threshold;
    self
  }

  pub fn with_style(mut self, style: DashStyle) -> Self {
    self.style = style;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.detector.resolution == 0 {
      return Err(ConfigError::invalid("detector.resolution", "必须大于 0"));
    }
    check_unit("detector.confidence_floor", self.detector.confidence_floor)?;
    check_unit("consolidate.iou_threshold", self.consolidate.iou_threshold)?;
    check_unit("consolidate.score_floor", self.consolidate.score_floor)?;
    if self.consolidate.vocabulary.is_empty() {
      return Err(ConfigError::invalid("consolidate.vocabulary", "类别词表为空"));
    }
    if !(self.style.dash_length.is_finite() && self.style.dash_length > 0.0) {
      return Err(ConfigError::invalid(
        "style.dash_length",
        format!("必须为正数, 实际为 {}", self.style.dash_length),
      ));
    }
    if !(self.style.gap_length.is_finite() && self.style.gap_length >= 0.0) {
      return Err(ConfigError::invalid(
        "style.gap_length",
        format!("不能为负数, 实际为 {}", self.style.gap_length),
      ));
    }
    if self.style.width == 0 {
      return Err(ConfigError::invalid("style.width", "必须大于 0"));
    }
    Ok(())
  }
}

fn check_unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::invalid(field, format!("应在 [0, 1] 之间, 实际为 {}", value)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_documented_values() {
    let config = InspectConfig::default();
    assert_eq!(config.detector.resolution, 640);
    assert_eq!(config.detector.confidence_floor, 0.05);
    assert_eq!(config.consolidate.iou_threshold, 0.3);
    assert_eq!(config.consolidate.score_floor, 0.1);
    assert!(config.consolidate.vocabulary.contains("segmentation"));
    assert_eq!(config.style.dash_length, 6.0);
    assert_eq!(config.style.gap_length, 4.0);
    assert_eq!(config.style.width, 1);
    assert_eq!(config.style.color, [255, 0, 0]);
    config.validate().unwrap();
  }

  #[test]
  fn partial_json_keeps_other_defaults() {
    let config: InspectConfig = serde_json::from_str(
      r#"{ "consolidate": { "iou_threshold": 0.5, "vocabulary": ["Rust", "pitting"] },
           "style": { "color": [0, 255, 0] } }"#,
    )
    .unwrap();
    assert_eq!(config.consolidate.iou_threshold, 0.5);
    assert_eq!(config.consolidate.score_floor, 0.1);
    assert!(config.consolidate.vocabulary.contains("PITTING"));
    assert!(!config.consolidate.vocabulary.contains("corrosion"));
    assert_eq!(config.style.color, [0, 255, 0]);
    assert_eq!(config.style.dash_length, 6.0);
    assert_eq!(config.detector.resolution, 640);
  }

  #[test]
  fn validation_rejects_bad_values() {
    let bad_threshold = InspectConfig::default().with_iou_threshold(1.5);
    assert!(matches!(
      bad_threshold.validate(),
      Err(ConfigError::Invalid { field: "consolidate.iou_threshold", .. })
    ));

    let empty = InspectConfig::default().with_vocabulary(Vocabulary::new(Vec::<String>::new()));
    assert!(empty.validate().is_err());

    let no_dash = InspectConfig::default().with_style(DashStyle {
      dash_length: 0.0,
      ..DashStyle::default()
    });
    assert!(no_dash.validate().is_err());
  }
}
