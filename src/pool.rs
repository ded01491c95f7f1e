// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/pool.rs - 推理工作线程池
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

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  inspect::{InspectError, InspectionResult, Inspector},
  model::Model,
};

type Reply = Result<InspectionResult, InspectError>;
type Job = (RgbImage, Sender<Reply>);

/// 推理专用线程池
///
/// 推理可能长时间占用 CPU/GPU，调用方提交后拿到 [`PendingInspection`]，
/// 不必在自己的线程上执行推理。池被丢弃时关闭队列并等待所有线程退出。
pub struct InspectionPool {
  sender: Option<Sender<Job>>,
  workers: Vec<JoinHandle<()>>,
}

impl InspectionPool {
  pub fn new<M>(inspector: Arc<Inspector<M>>, workers: usize) -> std::io::Result<Self>
  where
    M: Model + Send + Sync + 'static,
  {
    let (sender, receiver) = mpsc::channel::<Job>();
    let receiver = Arc::new(Mutex::new(receiver));

    let workers = (0..workers.max(1))
      .map(|index| {
        let receiver = Arc::clone(&receiver);
        let inspector = Arc::clone(&inspector);
        thread::Builder::new()
          .name(format!("tiexiu-infer-{}", index))
          .spawn(move || worker_loop(index, &inspector, &receiver))
      })
      .collect::<std::io::Result<Vec<_>>>()?;

    info!("推理线程池已启动: {} 个工作线程", workers.len());

    Ok(Self {
      sender: Some(sender),
      workers,
    })
  }

  pub fn workers(&self) -> usize {
    self.workers.len()
  }

  pub fn submit(&self, image: RgbImage) -> PendingInspection {
    let (reply, receiver) = mpsc::channel();
    if let Some(sender) = self.sender.as_ref()
      && sender.send((image, reply)).is_err()
    {
      warn!("推理线程池已关闭, 任务被丢弃");
    }
    PendingInspection { receiver }
  }
}

impl Drop for InspectionPool {
  fn drop(&mut self) {
    self.sender.take();
    for worker in self.workers.drain(..) {
      if worker.join().is_err() {
        warn!("推理工作线程异常退出");
      }
    }
    debug!("推理线程池已关闭");
  }
}

fn worker_loop<M: Model>(index: usize, inspector: &Inspector<M>, receiver: &Mutex<Receiver<Job>>) {
  loop {
    let job = {
      let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
      receiver.recv()
    };
    let Ok((image, reply)) = job else {
      break;
    };

    debug!("工作线程 {} 开始处理 {}x{} 图像", index, image.width(), image.height());
    if reply.send(inspector.inspect(&image)).is_err() {
      debug!("工作线程 {}: 调用方已放弃结果", index);
    }
  }
  debug!("工作线程 {} 退出", index);
}

/// 已提交但尚未取回的检测任务
pub struct PendingInspection {
  receiver: Receiver<Reply>,
}

impl PendingInspection {
  /// 阻塞直到结果可用
  pub fn wait(self) -> Result<InspectionResult, InspectError> {
    self.receiver.recv().map_err(|_| InspectError::PoolClosed)?
  }

  /// 不阻塞地查询结果，尚未完成时返回 `None`
  pub fn try_result(&self) -> Option<Result<InspectionResult, InspectError>> {
    match self.receiver.try_recv() {
      Ok(reply) => Some(reply),
      Err(TryRecvError::Empty) => None,
      Err(TryRecvError::Disconnected) => Some(Err(InspectError::PoolClosed)),
    }
  }
}
