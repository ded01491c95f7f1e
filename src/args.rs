// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/args.rs - 命令行参数配置
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

use std::path::PathBuf;

use clap::Args;

use crate::{
  config::{ConfigError, InspectConfig},
  consolidate::Vocabulary,
};

/// 检测流水线参数，未指定的项取配置文件或默认值
#[derive(Args, Debug, Clone, Default)]
pub struct InspectArgs {
  /// JSON 配置文件路径
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 推理输入长边分辨率
  #[arg(long, value_name = "PIXELS")]
  pub resolution: Option<u32>,

  /// 模型置信度下限 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence_floor: Option<f32>,

  /// 重叠抑制 IoU 阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub iou_threshold: Option<f32>,

  /// 腐蚀类别词表，逗号分隔
  #[arg(long, value_name = "NAMES", value_delimiter = ',')]
  pub vocabulary: Option<Vec<String>>,

  /// 虚线实段长度（像素）
  #[arg(long, value_name = "PIXELS")]
  pub dash: Option<f32>,

  /// 虚线间隔长度（像素）
  #[arg(long, value_name = "PIXELS")]
  pub gap: Option<f32>,

  /// 线宽（像素）
  #[arg(long, value_name = "PIXELS")]
  pub width: Option<u32>,

  /// 边框颜色，格式 R,G,B
  #[arg(long, value_name = "R,G,B", value_parser = parse_color)]
  pub color: Option<[u8; 3]>,
}

impl InspectArgs {
  pub fn to_config(&self) -> Result<InspectConfig, ConfigError> {
    let mut config = match &self.config {
      Some(path) => InspectConfig::from_json_file(path)?,
      None => InspectConfig::default(),
    };

    if let Some(resolution) = self.resolution {
      config.detector.resolution = resolution;
    }
    if let Some(confidence_floor) = self.confidence_floor {
      config.detector.confidence_floor = confidence_floor;
    }
    if let Some(iou_threshold) = self.iou_threshold {
      config.consolidate.iou_threshold = iou_threshold;
    }
    if let Some(names) = &self.vocabulary {
      config.consolidate.vocabulary = Vocabulary::new(names);
    }
    if let Some(dash) = self.dash {
      config.style.dash_length = dash;
    }
    if let Some(gap) = self.gap {
      config.style.gap_length = gap;
    }
    if let Some(width) = self.width {
      config.style.width = width;
    }
    if let Some(color) = self.color {
      config.style.color = color;
    }

    config.validate()?;
    Ok(config)
  }
}

fn parse_color(s: &str) -> Result<[u8; 3], String> {
  let channels = s
    .split(',')
    .map(|c| c.trim().parse::<u8>().map_err(|e| format!("颜色分量 '{}' 无效: {}", c, e)))
    .collect::<Result<Vec<_>, _>>()?;
  <[u8; 3]>::try_from(channels).map_err(|c| format!("颜色需要 3 个分量, 实际为 {}", c.len()))
}
