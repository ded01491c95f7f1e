// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/task.rs - 检测任务
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

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
  input::SourceImage,
  inspect::{InspectionResult, Inspector},
  model::Model,
  output::Render,
  pool::{InspectionPool, PendingInspection},
};

/// 每个工作线程允许排队的任务数
const IN_FLIGHT_PER_WORKER: usize = 2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
  pub processed: usize,
  pub corrosion: usize,
  pub failed: usize,
}

impl TaskSummary {
  fn count(&mut self, result: &InspectionResult) {
    self.processed += 1;
    if result.has_corrosion() {
      self.corrosion += 1;
    }
  }
}

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, inspector: Arc<Inspector<M>>, output: O) -> Result<TaskSummary, Self::Error>;
}

/// 只处理输入中的第一张图像
pub struct OneShotTask;

impl<RE, I, M, O> Task<I, M, O> for OneShotTask
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = SourceImage>,
  M: Model,
  O: Render<Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, inspector: Arc<Inspector<M>>, output: O) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let source = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功: {}, 开始推理...", source.filename);

    let now = std::time::Instant::now();
    let result = inspector.inspect(&source.image)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    output.render_result(&source, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    let mut summary = TaskSummary::default();
    summary.count(&result);
    Ok(summary)
  }
}

/// 通过推理线程池处理输入中的全部图像，结果按输入顺序交给输出
#[derive(Debug, Clone)]
pub struct BatchTask {
  workers: usize,
  max_images: Option<usize>,
  keep_going: bool,
}

impl Default for BatchTask {
  fn default() -> Self {
    Self {
      workers: 1,
      max_images: None,
      keep_going: false,
    }
  }
}

impl BatchTask {
  pub fn with_workers(mut self, workers: usize) -> Self {
    self.workers = workers.max(1);
    self
  }

  pub fn with_max_images(mut self, max_images: Option<usize>) -> Self {
    self.max_images = max_images;
    self
  }

  /// 单张图像失败时记录并继续，而不是终止整个批次
  pub fn with_keep_going(mut self, keep_going: bool) -> Self {
    self.keep_going = keep_going;
    self
  }

  fn finish_one<O, RE>(
    &self,
    source: SourceImage,
    pending: PendingInspection,
    output: &O,
    summary: &mut TaskSummary,
  ) -> anyhow::Result<()>
  where
    RE: std::error::Error + Sync + Send + 'static,
    O: Render<Error = RE>,
  {
    match pending.wait() {
      Ok(result) => {
        output.render_result(&source, &result)?;
        summary.count(&result);
        Ok(())
      }
      Err(e) if self.keep_going => {
        warn!("图像 {} 检测失败, 跳过: {}", source.filename, e);
        summary.failed += 1;
        Ok(())
      }
      Err(e) => {
        error!("图像 {} 检测失败: {}", source.filename, e);
        Err(e.into())
      }
    }
  }
}

impl<RE, I, M, O> Task<I, M, O> for BatchTask
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = SourceImage>,
  M: Model + Send + Sync + 'static,
  O: Render<Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, inspector: Arc<Inspector<M>>, output: O) -> Result<TaskSummary, Self::Error> {
    info!("开始批量任务...");
    let pool = InspectionPool::new(inspector, self.workers)?;
    let window = pool.workers() * IN_FLIGHT_PER_WORKER;

    let mut summary = TaskSummary::default();
    let mut in_flight: VecDeque<(SourceImage, PendingInspection)> = VecDeque::with_capacity(window);
    let now = std::time::Instant::now();

    let limit = self.max_images.unwrap_or(usize::MAX);
    for (index, source) in input.take(limit).enumerate() {
      if in_flight.len() >= window
        && let Some((done, pending)) = in_flight.pop_front()
      {
        self.finish_one(done, pending, &output, &mut summary)?;
      }

      info!("提交第 {} 张图像: {}", index + 1, source.filename);
      let pending = pool.submit(source.image.clone());
      in_flight.push_back((source, pending));
    }

    while let Some((done, pending)) = in_flight.pop_front() {
      self.finish_one(done, pending, &output, &mut summary)?;
    }

    info!(
      "批量任务完成: 处理 {} 张, 腐蚀 {} 张, 失败 {} 张, 耗时: {:.2?}",
      summary.processed,
      summary.corrosion,
      summary.failed,
      now.elapsed()
    );
    Ok(summary)
  }
}
