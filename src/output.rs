// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/output.rs - 输出定义
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

use std::{
  fs::File,
  io::{BufWriter, Write},
  path::Path,
};

use crate::FromUrl;
#[cfg(any(feature = "save_image_file", feature = "inspection_archive"))]
use crate::FromUrlWithScheme;
use crate::input::SourceImage;
use crate::inspect::InspectionResult;
use image::{ImageFormat, RgbImage, codecs::jpeg::JpegEncoder};
use thiserror::Error;
use url::Url;

const JPEG_QUALITY: u8 = 95;

/// 检测结果的消费者：保存图像、写记录等
pub trait Render: Sized {
  type Error;
  fn render_result(&self, source: &SourceImage, result: &InspectionResult) -> Result<(), Self::Error>;
}

pub mod draw;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "inspection_archive")]
mod inspection_archive;
#[cfg(feature = "inspection_archive")]
pub use self::inspection_archive::{InspectionArchiveError, InspectionArchiveOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "inspection_archive")]
  #[error("检测归档输出错误: {0}")]
  InspectionArchiveError(#[from] InspectionArchiveError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "inspection_archive")]
  InspectionArchiveOutput(InspectionArchiveOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "inspection_archive")]
      InspectionArchiveOutput::SCHEME => {
        let output = InspectionArchiveOutput::from_url(url)?;
        Ok(OutputWrapper::InspectionArchiveOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, source: &SourceImage, result: &InspectionResult) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => Ok(output.render_result(source, result)?),
      #[cfg(feature = "inspection_archive")]
      OutputWrapper::InspectionArchiveOutput(output) => Ok(output.render_result(source, result)?),
    }
  }
}

/// 按扩展名选择格式写出图像，JPEG 使用固定质量 95；父目录不存在时自动创建
pub fn write_image(image: &RgbImage, path: &Path) -> Result<(), image::ImageError> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  let format = ImageFormat::from_path(path)?;
  match format {
    ImageFormat::Jpeg => {
      let mut writer = BufWriter::new(File::create(path)?);
      JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(image)?;
      writer.flush()?;
      Ok(())
    }
    _ => image.save_with_format(path, format),
  }
}
