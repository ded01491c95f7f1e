// 该文件是 Tiexiu （铁锈） 项目的一部分。
// src/output/inspection_archive.rs - 检测归档输出
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

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  input::SourceImage,
  inspect::InspectionResult,
  output::{Render, write_image},
  record::{InspectionRecord, ProjectInfo},
};

#[derive(Error, Debug)]
pub enum InspectionArchiveError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 检测归档
///
/// 每条结果按日期分目录保存原图、标注图与 JSON 记录：
/// `<root>/YYYY/MM/DD/<id>.jpg`、`<id>-annotated.jpg`、`<id>.json`。
/// 记录中的路径相对于归档根目录。
pub struct InspectionArchiveOutput {
  directory: PathBuf,
  project: ProjectInfo,
  frame_counter: Mutex<u16>,
  corrosion_only: bool,
}

impl FromUrlWithScheme for InspectionArchiveOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for InspectionArchiveOutput {
  type Error = InspectionArchiveError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(InspectionArchiveError::SchemeMismatch);
    }

    let mut project = ProjectInfo::default();
    for (k, v) in uri.query_pairs() {
      match k.as_ref() {
        "project" if !v.is_empty() => project.project_id = v.into_owned(),
        "description" if !v.is_empty() => project.project_description = Some(v.into_owned()),
        _ => {}
      }
    }

    let corrosion_only = uri.query_pairs().any(|(k, _)| k == "corrosion_only");

    Ok(Self::new(uri.path(), project).with_corrosion_only(corrosion_only))
  }
}

impl InspectionArchiveOutput {
  pub fn new(directory: impl Into<PathBuf>, project: ProjectInfo) -> Self {
    Self {
      directory: directory.into(),
      project,
      frame_counter: Mutex::new(0),
      corrosion_only: false,
    }
  }

  /// 只归档判定为腐蚀的结果
  pub fn with_corrosion_only(mut self, corrosion_only: bool) -> Self {
    self.corrosion_only = corrosion_only;
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self.frame_counter.lock().unwrap_or_else(PoisonError::into_inner);
    *counter = counter.wrapping_add(1);
    *counter
  }

  /// 以独占方式创建记录文件来占用一个编号，已被占用时顺延计数器
  fn reserve(&self, now: &DateTime<Utc>) -> Result<(PathBuf, String, File), InspectionArchiveError> {
    let day = PathBuf::from(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(self.directory.join(&day))?;

    for _ in 0..=u16::MAX {
      let id = format!("{}-{:04X}", now.format("%H-%M-%S"), self.frame_id());
      let record_file = self.directory.join(&day).join(format!("{}.json", id));
      match File::options().write(true).create_new(true).open(&record_file) {
        Ok(file) => return Ok((day, id, file)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
          debug!("记录编号 {} 已被占用, 顺延", id);
        }
        Err(e) => return Err(e.into()),
      }
    }

    Err(std::io::Error::new(ErrorKind::AlreadyExists, format!("{} 内的记录编号已用尽", now.format("%H-%M-%S"))).into())
  }

  /// 保存一条结果并返回写入的记录
  pub fn archive(
    &self,
    source: &SourceImage,
    result: &InspectionResult,
  ) -> Result<InspectionRecord, InspectionArchiveError> {
    self.archive_at(Utc::now(), source, result)
  }

  fn archive_at(
    &self,
    now: DateTime<Utc>,
    source: &SourceImage,
    result: &InspectionResult,
  ) -> Result<InspectionRecord, InspectionArchiveError> {
    let (day, id, file) = self.reserve(&now)?;

    let original = day.join(format!("{}.jpg", id));
    let annotated = day.join(format!("{}-annotated.jpg", id));
    let record_file = self.directory.join(&day).join(format!("{}.json", id));

    let mut record = InspectionRecord::new(id, source, result, self.project.clone()).with_paths(
      original.to_string_lossy(),
      Some(annotated.to_string_lossy().into_owned()),
    );
    record.uploaded_at = now;

    let written = self.write_entry(file, &original, &annotated, source, result, &record);
    if let Err(e) = written {
      // 任何一步失败都不留下半条记录
      for path in [self.directory.join(&original), self.directory.join(&annotated), record_file] {
        if let Err(remove) = std::fs::remove_file(&path)
          && remove.kind() != ErrorKind::NotFound
        {
          warn!("清理未完成的归档文件 {} 失败: {}", path.display(), remove);
        }
      }
      return Err(e);
    }

    info!(
      "检测记录已归档: {} ({}, 项目 {})",
      record.id, record.prediction, record.project.project_id
    );
    Ok(record)
  }

  fn write_entry(
    &self,
    record_file: File,
    original: &Path,
    annotated: &Path,
    source: &SourceImage,
    result: &InspectionResult,
    record: &InspectionRecord,
  ) -> Result<(), InspectionArchiveError> {
    write_image(&source.image, &self.directory.join(original))?;
    debug!("原图已保存: {}", original.display());
    write_image(&result.annotated_image, &self.directory.join(annotated))?;
    debug!("标注图已保存: {}", annotated.display());

    let mut writer = BufWriter::new(record_file);
    serde_json::to_writer_pretty(&mut writer, record)?;
    writer.flush()?;
    Ok(())
  }

  /// 按原图路径读取归档中的记录
  pub fn load_record(&self, image_path: impl AsRef<Path>) -> Result<InspectionRecord, InspectionArchiveError> {
    let path = self.directory.join(image_path).with_extension("json");
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
  }
}

impl Render for InspectionArchiveOutput {
  type Error = InspectionArchiveError;

  fn render_result(&self, source: &SourceImage, result: &InspectionResult) -> Result<(), Self::Error> {
    if self.corrosion_only && !result.has_corrosion() {
      debug!("{} 未检测到腐蚀, 跳过归档", source.filename);
      return Ok(());
    }
    self.archive(source, result).map(|_| ())
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use image::{Rgb, RgbImage};

  use super::*;
  use crate::inspect::Label;

  fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tiexiu-archive-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  fn upload(filename: &str) -> SourceImage {
    SourceImage {
      filename: filename.to_string(),
      content_type: "image/png".to_string(),
      image: RgbImage::from_pixel(32, 24, Rgb([70, 70, 70])),
    }
  }

  fn result_for(source: &SourceImage, label: Label) -> InspectionResult {
    InspectionResult {
      label,
      confidence: label.confidence(),
      regions: Vec::new(),
      annotated_image: source.image.clone(),
    }
  }

  fn count_files(root: &Path) -> usize {
    let mut count = 0;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          count += 1;
        }
      }
    }
    count
  }

  #[test]
  fn separate_outputs_in_the_same_second_keep_both_records() {
    let dir = scratch_dir("same-second");
    let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();

    let first = upload("first.png");
    let second = upload("second.png");
    let a = InspectionArchiveOutput::new(&dir, ProjectInfo::default())
      .archive_at(at, &first, &result_for(&first, Label::Corrosion))
      .unwrap();
    let b = InspectionArchiveOutput::new(&dir, ProjectInfo::default())
      .archive_at(at, &second, &result_for(&second, Label::NoCorrosion))
      .unwrap();

    assert_eq!(a.id, "09-30-00-0001");
    assert_eq!(b.id, "09-30-00-0002");
    assert_eq!(a.image_path, Path::new("2026/10/18/09-30-00-0001.jpg").to_string_lossy());

    let reader = InspectionArchiveOutput::new(&dir, ProjectInfo::default());
    let first_back = reader.load_record(&a.image_path).unwrap();
    assert_eq!(first_back.image_metadata.filename, "first.png");
    assert_eq!(first_back.prediction, Label::Corrosion);
    let second_back = reader.load_record(&b.image_path).unwrap();
    assert_eq!(second_back.image_metadata.filename, "second.png");
    assert_eq!(count_files(&dir), 6);

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn failed_write_leaves_nothing_behind() {
    let dir = scratch_dir("failed-write");
    let source = upload("wide.png");
    // JPEG 宽度上限为 65535
    let mut result = result_for(&source, Label::Corrosion);
    result.annotated_image = RgbImage::new(70_000, 1);

    let output = InspectionArchiveOutput::new(&dir, ProjectInfo::default());
    assert!(output.archive(&source, &result).is_err());
    assert_eq!(count_files(&dir), 0);

    std::fs::remove_dir_all(&dir).unwrap();
  }
}
