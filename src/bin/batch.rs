// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/bin/batch.rs - 批量图像检测
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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use url::Url;

use tiexiu::{
  FromUrl,
  args::InspectArgs,
  detector::ModelHandle,
  inspect::Inspector,
  model::ReplayModelBuilder,
  task::{BatchTask, Task},
};
use tracing::info;

/// Tiexiu 批量腐蚀检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 回放模型制品路径，首次推理时加载。
  /// 回放制品对每张图像都返回同一组记录的检测，仅用于演示与测试
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，如 folder:///data/plates
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，如 folder:///archive?project=bridge-7&description=north+span
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 推理工作线程数
  #[arg(long, default_value = "2", value_name = "COUNT")]
  pub workers: usize,

  /// 最多处理的图像数
  #[arg(long, value_name = "COUNT")]
  pub max_images: Option<usize>,

  /// 单张失败时继续处理
  #[arg(long)]
  pub keep_going: bool,

  #[command(flatten)]
  pub inspect: InspectArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("工作线程数: {}", args.workers);

  let config = args.inspect.to_config()?;
  let input = tiexiu::input::InputWrapper::from_url(&args.input)?;
  let output = tiexiu::output::OutputWrapper::from_url(&args.output)?;

  let model_builder = ReplayModelBuilder::from_url(&args.model)?;
  let handle = ModelHandle::lazy(move || {
    ReplayModelBuilder::new(model_builder.path()).build()
  });
  let inspector = Arc::new(Inspector::new(handle, config));

  let summary = BatchTask::default()
    .with_workers(args.workers)
    .with_max_images(args.max_images)
    .with_keep_going(args.keep_going)
    .run_task(input, inspector, output)?;

  info!(
    "共处理 {} 张图像, 其中 {} 张检测到腐蚀, {} 张失败",
    summary.processed, summary.corrosion, summary.failed
  );

  Ok(())
}
