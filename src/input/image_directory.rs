// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/input/image_directory.rs - 图像目录输入
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

use std::{collections::VecDeque, path::PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{SourceImage, content_type_for, decode_upload},
};

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "gif", "webp", "tif", "tiff"];

#[derive(Error, Debug)]
pub enum ImageDirectoryInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Not a directory: {0}")]
  NotADirectory(String),
}

/// 目录中的全部图像，按文件名顺序逐张解码，无法解码的文件跳过
pub struct ImageDirectoryInput {
  pending: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageDirectoryInputError::SchemaMismatch);
    }
    Self::open(url.path())
  }
}

impl ImageDirectoryInput {
  pub fn open(directory: impl Into<PathBuf>) -> Result<Self, ImageDirectoryInputError> {
    let directory = directory.into();
    if !directory.is_dir() {
      return Err(ImageDirectoryInputError::NotADirectory(
        directory.display().to_string(),
      ));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
      if path.is_file() && is_image {
        files.push(path);
      }
    }
    files.sort();

    info!("目录 {} 中找到 {} 张图像", directory.display(), files.len());

    Ok(ImageDirectoryInput {
      pending: files.into(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

impl Iterator for ImageDirectoryInput {
  type Item = SourceImage;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.pending.pop_front() {
      let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

      let decoded = std::fs::read(&path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| {
          decode_upload(&filename, content_type_for(&path), &bytes).map_err(|e| e.to_string())
        });

      match decoded {
        Ok(image) => return Some(image),
        Err(e) => warn!("跳过无法读取的图像 {}: {}", path.display(), e),
      }
    }
    None
  }
}
