// 该文件是 Leafcheck （叶检） 项目的一部分。
// src/input/directory.rs - 目录图像输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::read_image_file::{ImageFileInputError, decode_image_file},
  url_path,
};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum DirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("{path}: {source}")]
  DecodeError {
    path: PathBuf,
    source: ImageFileInputError,
  },
}

/// 按文件名顺序逐个读取目录中的图像
pub struct DirectoryInput {
  files: std::vec::IntoIter<PathBuf>,
}

fn is_image_file(path: &Path) -> bool {
  path.is_file()
    && path
      .extension()
      .and_then(|e| e.to_str())
      .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
      .unwrap_or(false)
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = DirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DirectoryInputError::SchemeMismatch);
    }

    Self::open(url_path(url))
  }
}

impl DirectoryInput {
  pub fn open(directory: impl AsRef<Path>) -> Result<Self, DirectoryInputError> {
    let directory = directory.as_ref();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      if is_image_file(&path) {
        files.push(path);
      }
    }
    files.sort();
    info!("目录 {} 中共有 {} 张图像", directory.display(), files.len());

    Ok(DirectoryInput {
      files: files.into_iter(),
    })
  }
}

impl Iterator for DirectoryInput {
  type Item = Result<Frame, DirectoryInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.next()?;
    let frame = match decode_image_file(&path) {
      Ok(image) => Ok(Frame::new(path.to_string_lossy(), image)),
      Err(source) => {
        warn!("无法解码图像 {}: {}", path.display(), source);
        Err(DirectoryInputError::DecodeError { path, source })
      }
    };
    Some(frame)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn lists_images_sorted_and_skips_other_files() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::new(4, 4).save(dir.path().join("b.png")).unwrap();
    RgbImage::new(2, 2).save(dir.path().join("a.PNG")).unwrap();
    std::fs::write(dir.path().join("labels.txt"), "x\n").unwrap();
    std::fs::create_dir(dir.path().join("nested.png")).unwrap();

    let frames: Vec<_> = DirectoryInput::open(dir.path())
      .unwrap()
      .map(|f| f.unwrap())
      .collect();
    assert_eq!(frames.len(), 2);
    assert!(frames[0].source.ends_with("a.PNG"));
    assert_eq!(frames[0].image.dimensions(), (2, 2));
    assert!(frames[1].source.ends_with("b.png"));
  }

  #[test]
  fn broken_file_yields_error_and_iteration_continues() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.jpg"), b"garbage").unwrap();
    RgbImage::new(3, 3).save(dir.path().join("b.png")).unwrap();

    let mut input = DirectoryInput::open(dir.path()).unwrap();
    assert!(matches!(
      input.next(),
      Some(Err(DirectoryInputError::DecodeError { .. }))
    ));
    assert!(input.next().unwrap().is_ok());
    assert!(input.next().is_none());
  }

  #[test]
  fn missing_directory_is_io_error() {
    assert!(matches!(
      DirectoryInput::open("/nonexistent/leafcheck/dir"),
      Err(DirectoryInputError::IoError(_))
    ));
  }
}
