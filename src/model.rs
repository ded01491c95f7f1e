// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/model.rs - 检测模型边界
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

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// 推理参数：模型输入长边分辨率与置信度下限
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferParams {
  pub resolution: u32,
  pub confidence_floor: f32,
}

/// 外部检测模型
///
/// 实现方只需给出原始检测列表与类别名称表，
/// 过滤、去重与标注全部由本库完成。
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, image: &RgbImage, params: &InferParams) -> Result<Vec<DetectItem>, Self::Error>;

  /// 类别编号到名称的映射
  fn label_of(&self, class_id: u32) -> Option<&str>;

  /// 模型制品版本
  fn version(&self) -> &str {
    "unversioned"
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，像素坐标
}

#[cfg(feature = "model_replay")]
mod replay;
#[cfg(feature = "model_replay")]
pub use self::replay::{ReplayModel, ReplayModelBuilder, ReplayModelError};
