// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/input/read_image_folder.rs - 图像目录输入
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

use std::path::{Path, PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Error, Debug)]
pub enum ImageFolderInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像 {0} 加载错误: {1}")]
  ImageLoadError(PathBuf, image::ImageError),
}

/// 按文件名顺序读取目录中的图像，`?loop` 时循环播放
pub struct ImageFolderInput {
  files: Vec<PathBuf>,
  position: usize,
  looping: bool,
  index: u64,
}

impl ImageFolderInput {
  pub fn open(dir: &Path) -> Result<Self, ImageFolderInputError> {
    let mut files = std::fs::read_dir(dir)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| {
        path
          .extension()
          .and_then(|ext| ext.to_str())
          .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
      })
      .collect::<Vec<_>>();
    files.sort();

    info!("目录 {} 中共 {} 张图像", dir.display(), files.len());
    Ok(Self {
      files,
      position: 0,
      looping: false,
      index: 0,
    })
  }

  pub fn with_loop(mut self, looping: bool) -> Self {
    self.looping = looping;
    self
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }
}

impl FromUrlWithScheme for ImageFolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageFolderInput {
  type Error = ImageFolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageFolderInputError::SchemaMismatch);
    }

    let looping = url
      .query_pairs()
      .any(|(k, v)| k == "loop" && v != "false" && v != "0");
    Ok(ImageFolderInput::open(Path::new(url.path()))?.with_loop(looping))
  }
}

impl Iterator for ImageFolderInput {
  type Item = Result<Frame, ImageFolderInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.position >= self.files.len() {
      if !self.looping || self.files.is_empty() {
        return None;
      }
      debug!("图像目录播放完毕，从头开始");
      self.position = 0;
    }

    let path = &self.files[self.position];
    self.position += 1;

    let image = ImageReader::open(path)
      .map_err(ImageFolderInputError::from)
      .and_then(|reader| {
        reader
          .decode()
          .map_err(|e| ImageFolderInputError::ImageLoadError(path.clone(), e))
      });

    Some(image.map(|image| {
      let frame = Frame::new(image.to_rgb8(), self.index);
      self.index += 1;
      frame
    }))
  }
}

#[cfg(test)]
mod tests {
  use image::RgbImage;

  use super::*;

  fn folder_with_images(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
      RgbImage::new(4, 4).save(dir.path().join(name)).unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();
    dir
  }

  #[test]
  fn reads_images_in_name_order() {
    let dir = folder_with_images(&["b.png", "a.png", "c.jpg"]);
    let input = ImageFolderInput::open(dir.path()).unwrap();
    assert_eq!(input.len(), 3);
    let frames: Vec<_> = input.map(|f| f.unwrap().index).collect();
    assert_eq!(frames, vec![0, 1, 2]);
  }

  #[test]
  fn loop_restarts_from_first_image() {
    let dir = folder_with_images(&["a.png", "b.png"]);
    let url = Url::parse(&format!("folder://{}?loop", dir.path().display())).unwrap();
    let input = ImageFolderInput::from_url(&url).unwrap();
    let frames: Vec<_> = input.take(5).map(|f| f.unwrap().index).collect();
    assert_eq!(frames, vec![0, 1, 2, 3, 4]);
  }

  #[test]
  fn empty_folder_ends_even_when_looping() {
    let dir = tempfile::tempdir().unwrap();
    let mut input = ImageFolderInput::open(dir.path()).unwrap().with_loop(true);
    assert!(input.is_empty());
    assert!(input.next().is_none());
  }

  #[test]
  fn corrupt_image_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.png"), b"garbage").unwrap();
    let mut input = ImageFolderInput::open(dir.path()).unwrap();
    assert!(matches!(
      input.next(),
      Some(Err(ImageFolderInputError::ImageLoadError(_, _)))
    ));
  }
}
