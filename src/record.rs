// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/record.rs - 检测记录
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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  consolidate::BBox,
  input::SourceImage,
  inspect::{InspectionResult, Label},
};

pub const DEFAULT_PROJECT_ID: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
  pub filename: String,
  pub content_type: String,
  pub width: u32,
  pub height: u32,
}

/// 项目信息，随每条记录保存
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
  pub project_id: String,
  pub project_description: Option<String>,
}

impl Default for ProjectInfo {
  fn default() -> Self {
    Self {
      project_id: DEFAULT_PROJECT_ID.to_string(),
      project_description: None,
    }
  }
}

/// 一次检测的持久化记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionRecord {
  pub id: String,
  pub image_path: String,
  pub annotated_path: Option<String>,
  pub prediction: Label,
  pub confidence: f32,
  pub image_metadata: ImageMetadata,
  pub regions: Vec<BBox>,
  pub uploaded_at: DateTime<Utc>,
  pub is_corrected: bool,
  pub corrected_label: Option<Label>,
  #[serde(flatten)]
  pub project: ProjectInfo,
}

impl InspectionRecord {
  pub fn new(
    id: impl Into<String>,
    source: &SourceImage,
    result: &InspectionResult,
    project: ProjectInfo,
  ) -> Self {
    Self {
      id: id.into(),
      image_path: String::new(),
      annotated_path: None,
      prediction: result.label,
      confidence: result.confidence,
      image_metadata: ImageMetadata {
        filename: source.filename.clone(),
        content_type: source.content_type.clone(),
        width: source.image.width(),
        height: source.image.height(),
      },
      regions: result.regions.iter().map(|region| region.bbox).collect(),
      uploaded_at: Utc::now(),
      is_corrected: false,
      corrected_label: None,
      project,
    }
  }

  pub fn with_paths(mut self, image_path: impl Into<String>, annotated_path: Option<String>) -> Self {
    self.image_path = image_path.into();
    self.annotated_path = annotated_path;
    self
  }

  /// 记录人工复核后的标签
  pub fn correct(&mut self, label: Label) {
    self.is_corrected = true;
    self.corrected_label = Some(label);
  }

  /// 复核后的标签优先于模型判定
  pub fn effective_label(&self) -> Label {
    self.corrected_label.unwrap_or(self.prediction)
  }
}
