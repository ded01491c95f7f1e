// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/detector.rs - 检测适配器
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

use std::sync::{Arc, Mutex, PoisonError};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
  config::DetectorConfig,
  consolidate::BBox,
  inspect::{BoxError, InspectError},
  model::{DetectItem, InferParams, Model},
};

/// 归一化后的单条检测
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
  pub class_id: u32,
  pub class_name: String,
  /// 模型原始置信度，后续流程不使用
  pub confidence: f32,
  pub bbox: BBox,
}

type Loader<M> = Box<dyn Fn() -> Result<M, BoxError> + Send + Sync>;

/// 模型句柄
///
/// 可以直接持有已加载的模型，也可以延迟到第一次使用时加载。
/// 延迟加载在互斥锁内完成：并发调用者等待同一次加载，模型只会被加载一次；
/// 加载失败时句柄保持为空，下次调用会重新尝试。
pub struct ModelHandle<M> {
  slot: Mutex<Option<Arc<M>>>,
  loader: Option<Loader<M>>,
}

impl<M> ModelHandle<M> {
  pub fn loaded(model: M) -> Self {
    Self {
      slot: Mutex::new(Some(Arc::new(model))),
      loader: None,
    }
  }

  pub fn lazy<F, E>(loader: F) -> Self
  where
    F: Fn() -> Result<M, E> + Send + Sync + 'static,
    E: Into<BoxError>,
  {
    Self {
      slot: Mutex::new(None),
      loader: Some(Box::new(move || loader().map_err(Into::into))),
    }
  }

  pub fn is_loaded(&self) -> bool {
    self
      .slot
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .is_some()
  }

  pub fn get(&self) -> Result<Arc<M>, InspectError> {
    let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(model) = slot.as_ref() {
      return Ok(Arc::clone(model));
    }

    let Some(loader) = self.loader.as_ref() else {
      return Err(InspectError::ModelUnavailable("模型句柄为空且没有加载器".into()));
    };

    info!("首次使用, 开始加载模型");
    let now = std::time::Instant::now();
    let model = loader().map_err(|e| {
      error!("模型加载失败: {}", e);
      InspectError::ModelUnavailable(e)
    })?;
    info!("模型加载完成，耗时: {:.2?}", now.elapsed());

    let model = Arc::new(model);
    *slot = Some(Arc::clone(&model));
    Ok(model)
  }
}

/// 检测适配器：调用外部模型并把输出整理为 [`RawDetection`]
pub struct Detector<M> {
  handle: ModelHandle<M>,
  params: InferParams,
}

impl<M: Model> Detector<M> {
  pub fn new(handle: ModelHandle<M>, config: &DetectorConfig) -> Self {
    Self {
      handle,
      params: config.infer_params(),
    }
  }

  pub fn params(&self) -> InferParams {
    self.params
  }

  pub fn handle(&self) -> &ModelHandle<M> {
    &self.handle
  }

  pub fn detect(&self, image: &RgbImage) -> Result<Vec<RawDetection>, InspectError> {
    if image.width() == 0 || image.height() == 0 {
      return Err(InspectError::InvalidInput(format!(
        "图像尺寸为 {}x{}",
        image.width(),
        image.height()
      )));
    }

    let model = self.handle.get()?;

    debug!(
      "执行模型推理: 模型 {}, 图像 {}x{}",
      model.version(),
      image.width(),
      image.height()
    );
    let now = std::time::Instant::now();
    let items = model.infer(image, &self.params).map_err(|e| {
      error!("模型推理失败: {}", e);
      InspectError::Inference(Box::new(e))
    })?;
    debug!("推理完成，耗时: {:.2?}, 检测到 {} 个物体", now.elapsed(), items.len());

    items
      .into_iter()
      .enumerate()
      .map(|(index, item)| normalize(&*model, index, item))
      .collect()
  }
}

fn normalize<M: Model>(model: &M, index: usize, item: DetectItem) -> Result<RawDetection, InspectError> {
  let DetectItem {
    class_id,
    score,
    bbox,
  } = item;

  let class_name = model.label_of(class_id).ok_or_else(|| {
    InspectError::Inference(format!("第 {} 个检测的类别编号 {} 不在类别表中", index, class_id).into())
  })?;

  if !(0.0..=1.0).contains(&score) {
    return Err(InspectError::Inference(
      format!("第 {} 个检测的置信度 {} 超出 [0, 1]", index, score).into(),
    ));
  }

  let bbox = BBox::from(bbox);
  if !bbox.is_finite() || bbox.x1 >= bbox.x2 || bbox.y1 >= bbox.y2 {
    return Err(InspectError::Inference(
      format!("第 {} 个检测的边界框无效: {:?}", index, bbox).into(),
    ));
  }

  Ok(RawDetection {
    class_id,
    class_name: class_name.to_string(),
    confidence: score,
    bbox,
  })
}

#[cfg(all(test, feature = "model_replay"))]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  use super::*;
  use crate::model::ReplayModel;

  fn model(detections: Vec<DetectItem>) -> ReplayModel {
    ReplayModel::new(
      "test",
      vec!["rust".to_string(), "scratch".to_string()],
      detections,
    )
  }

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn resolves_class_names_in_model_order() {
    let detector = Detector::new(
      ModelHandle::loaded(model(vec![
        item(1, 0.9, [200.0, 200.0, 300.0, 300.0]),
        item(0, 0.4, [10.0, 10.0, 100.0, 100.0]),
      ])),
      &DetectorConfig::default(),
    );
    let detections = detector.detect(&RgbImage::new(640, 480)).unwrap();
    let names: Vec<&str> = detections.iter().map(|d| d.class_name.as_str()).collect();
    assert_eq!(names, vec!["scratch", "rust"]);
    assert_eq!(detections[1].bbox, BBox::new(10.0, 10.0, 100.0, 100.0));
  }

  #[test]
  fn zero_area_image_is_invalid_input() {
    let detector = Detector::new(ModelHandle::loaded(model(vec![])), &DetectorConfig::default());
    assert!(matches!(
      detector.detect(&RgbImage::new(0, 10)),
      Err(InspectError::InvalidInput(_))
    ));
  }

  #[test]
  fn inverted_box_is_inference_error() {
    let detector = Detector::new(
      ModelHandle::loaded(model(vec![item(0, 0.5, [100.0, 10.0, 10.0, 100.0])])),
      &DetectorConfig::default(),
    );
    assert!(matches!(
      detector.detect(&RgbImage::new(640, 480)),
      Err(InspectError::Inference(_))
    ));
  }

  #[test]
  fn unknown_class_is_inference_error() {
    let detector = Detector::new(
      ModelHandle::loaded(model(vec![item(9, 0.5, [10.0, 10.0, 20.0, 20.0])])),
      &DetectorConfig::default(),
    );
    assert!(matches!(
      detector.detect(&RgbImage::new(64, 64)),
      Err(InspectError::Inference(_))
    ));
  }

  #[test]
  fn failed_load_is_model_unavailable_and_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let handle = ModelHandle::lazy(move || {
      if counter.fetch_add(1, Ordering::SeqCst) == 0 {
        Err("制品缺失")
      } else {
        Ok(model(vec![]))
      }
    });
    let detector = Detector::new(handle, &DetectorConfig::default());

    assert!(matches!(
      detector.detect(&RgbImage::new(8, 8)),
      Err(InspectError::ModelUnavailable(_))
    ));
    assert!(!detector.handle().is_loaded());

    assert!(detector.detect(&RgbImage::new(8, 8)).unwrap().is_empty());
    assert!(detector.handle().is_loaded());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn lazy_load_is_single_flight() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let handle = Arc::new(ModelHandle::lazy(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      std::thread::sleep(Duration::from_millis(50));
      Ok::<_, BoxError>(model(vec![]))
    }));

    let workers: Vec<_> = (0..8)
      .map(|_| {
        let handle = Arc::clone(&handle);
        std::thread::spawn(move || handle.get().map(|_| ()))
      })
      .collect();
    for worker in workers {
      worker.join().unwrap().unwrap();
    }

    assert_eq!(loads.load(Ordering::SeqCst), 1);
  }
}
