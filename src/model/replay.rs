// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/model/replay.rs - 回放模型
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectItem, InferParams, Model},
};

/// 回放模型：从 JSON 制品中读取预先记录的检测结果，
/// 用于离线复现、演示与测试。
///
/// 推理不看输入图像，每次调用都返回同一组记录，不适合用于真实检测。
#[derive(Debug, Clone)]
pub struct ReplayModel {
  version: String,
  names: Vec<String>,
  detections: Vec<DetectItem>,
}

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型格式无效: {0}")]
  ModelInvalid(#[from] serde_json::Error),
  #[error("模型类别表为空: {0}")]
  EmptyLabels(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

#[derive(Debug, Deserialize)]
struct ReplayArtifact {
  #[serde(default)]
  version: Option<String>,
  names: Vec<String>,
  #[serde(default)]
  detections: Vec<DetectItem>,
}

pub struct ReplayModelBuilder {
  model_path: PathBuf,
}

impl FromUrlWithScheme for ReplayModelBuilder {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModelBuilder {
  type Error = ReplayModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(ReplayModelBuilder {
      model_path: PathBuf::from(url.path()),
    })
  }
}

impl ReplayModelBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.model_path
  }

  pub fn build(self) -> Result<ReplayModel, ReplayModelError> {
    info!("加载模型文件: {}", self.model_path.display());
    let data = std::fs::read(&self.model_path)?;
    debug!("模型文件大小: {:.2} KB", data.len() as f64 / 1024.0);

    let artifact: ReplayArtifact = serde_json::from_slice(&data)?;
    if artifact.names.is_empty() {
      error!("模型 {} 未提供类别表", self.model_path.display());
      return Err(ReplayModelError::EmptyLabels(
        self.model_path.display().to_string(),
      ));
    }

    let version = artifact.version.unwrap_or_else(|| {
      self
        .model_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unversioned".to_string())
    });

    info!(
      "模型加载完成: 版本 {}, {} 个类别, {} 条记录",
      version,
      artifact.names.len(),
      artifact.detections.len()
    );

    Ok(ReplayModel {
      version,
      names: artifact.names,
      detections: artifact.detections,
    })
  }
}

impl ReplayModel {
  pub fn new(version: impl Into<String>, names: Vec<String>, detections: Vec<DetectItem>) -> Self {
    Self {
      version: version.into(),
      names,
      detections,
    }
  }
}

impl Model for ReplayModel {
  type Error = std::convert::Infallible;

  fn infer(&self, image: &RgbImage, params: &InferParams) -> Result<Vec<DetectItem>, Self::Error> {
    debug!(
      "回放推理: 图像 {}x{}, 分辨率 {}, 置信度下限 {}",
      image.width(),
      image.height(),
      params.resolution,
      params.confidence_floor
    );

    Ok(
      self
        .detections
        .iter()
        .filter(|item| item.score >= params.confidence_floor)
        .cloned()
        .collect(),
    )
  }

  fn label_of(&self, class_id: u32) -> Option<&str> {
    self.names.get(class_id as usize).map(String::as_str)
  }

  fn version(&self) -> &str {
    &self.version
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_artifact(name: &str, body: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tiexiu-replay-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
  }

  #[test]
  fn builds_from_replay_url() {
    let path = write_artifact(
      "corrosion-v1.json",
      r#"{
        "names": ["rust", "scratch"],
        "detections": [
          { "class_id": 0, "score": 0.40, "bbox": [10, 10, 100, 100] },
          { "class_id": 1, "score": 0.02, "bbox": [200, 200, 300, 300] }
        ]
      }"#,
    );
    let url = Url::parse(&format!("replay://{}", path.display())).unwrap();

    let model = ReplayModelBuilder::from_url(&url).unwrap().build().unwrap();
    assert_eq!(model.version(), "corrosion-v1");
    assert_eq!(model.label_of(0), Some("rust"));
    assert_eq!(model.label_of(7), None);

    let params = InferParams {
      resolution: 640,
      confidence_floor: 0.05,
    };
    let items = model.infer(&RgbImage::new(4, 4), &params).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].bbox, [10.0, 10.0, 100.0, 100.0]);
  }

  #[test]
  fn replays_the_same_detections_for_every_image() {
    let model = ReplayModel::new(
      "demo",
      vec!["rust".to_string()],
      vec![DetectItem {
        class_id: 0,
        score: 0.4,
        bbox: [10.0, 10.0, 100.0, 100.0],
      }],
    );
    let params = InferParams {
      resolution: 640,
      confidence_floor: 0.05,
    };
    let dark = model.infer(&RgbImage::new(640, 480), &params).unwrap();
    let bright = model
      .infer(&RgbImage::from_pixel(32, 32, image::Rgb([255, 255, 255])), &params)
      .unwrap();
    assert_eq!(dark, bright);
  }

  #[test]
  fn rejects_wrong_scheme() {
    let url = Url::parse("onnx:///models/corrosion.onnx").unwrap();
    assert!(matches!(
      ReplayModelBuilder::from_url(&url),
      Err(ReplayModelError::ModelPathError(_))
    ));
  }

  #[test]
  fn missing_artifact_is_load_error() {
    let err = ReplayModelBuilder::new("/nonexistent/tiexiu/model.json")
      .build()
      .unwrap_err();
    assert!(matches!(err, ReplayModelError::ModelLoadError(_)));
  }

  #[test]
  fn empty_label_table_is_rejected() {
    let path = write_artifact("empty.json", r#"{ "version": "v0", "names": [] }"#);
    let err = ReplayModelBuilder::new(path).build().unwrap_err();
    assert!(matches!(err, ReplayModelError::EmptyLabels(_)));
  }
}
