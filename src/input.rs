// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/input.rs - 图像输入
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

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::{FromUrl, inspect::InspectError};

/// 待检测的图像及其上传元数据
#[derive(Debug, Clone)]
pub struct SourceImage {
  pub filename: String,
  pub content_type: String,
  pub image: RgbImage,
}

/// 解码上传的图像数据，任意颜色模式统一转为 RGB8
pub fn decode_upload(filename: &str, content_type: &str, bytes: &[u8]) -> Result<SourceImage, InspectError> {
  if !content_type.starts_with("image/") {
    return Err(InspectError::InvalidInput(format!(
      "文件 {} 不是图像: {}",
      filename, content_type
    )));
  }

  let image = image::load_from_memory(bytes)
    .map_err(|e| InspectError::InvalidInput(format!("无法解码图像 {}: {}", filename, e)))?
    .to_rgb8();

  if image.width() == 0 || image.height() == 0 {
    return Err(InspectError::InvalidInput(format!(
      "图像 {} 尺寸为 {}x{}",
      filename,
      image.width(),
      image.height()
    )));
  }

  debug!("图像已解码: {} {}x{}", filename, image.width(), image.height());

  Ok(SourceImage {
    filename: filename.to_string(),
    content_type: content_type.to_string(),
    image,
  })
}

/// 根据扩展名推断 MIME 类型，未知扩展名返回 `application/octet-stream`
pub fn content_type_for(path: &Path) -> &'static str {
  let ext = path
    .extension()
    .map(|ext| ext.to_string_lossy().to_lowercase())
    .unwrap_or_default();
  match ext.as_str() {
    "jpg" | "jpeg" => "image/jpeg",
    "png" => "image/png",
    "bmp" => "image/bmp",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "tif" | "tiff" => "image/tiff",
    _ => "application/octet-stream",
  }
}

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "image_directory")]
mod image_directory;
#[cfg(feature = "image_directory")]
pub use self::image_directory::{ImageDirectoryInput, ImageDirectoryInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "image_directory")]
  #[error("Image directory input error: {0}")]
  ImageDirectoryInputError(#[from] ImageDirectoryInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "image_directory")]
  ImageDirectory(ImageDirectoryInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
    }
    #[cfg(feature = "image_directory")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageDirectoryInput::SCHEME {
        let input = ImageDirectoryInput::from_url(url)?;
        return Ok(InputWrapper::ImageDirectory(input));
      }
    }
    Err(InputError::SchemeMismatch)
  }
}

impl Iterator for InputWrapper {
  type Item = SourceImage;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next(),
      #[cfg(feature = "image_directory")]
      InputWrapper::ImageDirectory(input) => input.next(),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use image::{ImageFormat, Rgb};

  use super::*;

  fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
    let mut bytes = Vec::new();
    image
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .unwrap();
    bytes
  }

  #[test]
  fn decodes_png_upload() {
    let source = decode_upload("plate.png", "image/png", &png_bytes(12, 8)).unwrap();
    assert_eq!(source.image.dimensions(), (12, 8));
    assert_eq!(*source.image.get_pixel(0, 0), Rgb([10, 20, 30]));
  }

  #[test]
  fn rejects_non_image_content_type() {
    assert!(matches!(
      decode_upload("notes.txt", "text/plain", b"hello"),
      Err(InspectError::InvalidInput(_))
    ));
  }

  #[test]
  fn rejects_undecodable_bytes() {
    assert!(matches!(
      decode_upload("broken.jpg", "image/jpeg", b"not a jpeg"),
      Err(InspectError::InvalidInput(_))
    ));
  }

  #[test]
  fn guesses_content_type_from_extension() {
    assert_eq!(content_type_for(Path::new("a/B.JPG")), "image/jpeg");
    assert_eq!(content_type_for(Path::new("scan.png")), "image/png");
    assert_eq!(content_type_for(Path::new("README")), "application/octet-stream");
  }
}
