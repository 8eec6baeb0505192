// 该文件是 Chepai （车牌识别） 项目的一部分。
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

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Pixel, PixelWithColorType};
use thiserror::Error;
use url::Url;

use crate::frame::FrameId;
use crate::{FromUrl, FromUrlWithScheme};

pub mod draw;

mod debug_dump;
pub use self::debug_dump::{DebugDump, DebugRotation};

mod directory_record;
pub use self::directory_record::DirectoryRecord;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体加载错误: {0}")]
  FontError(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 保存图像，必要时创建父目录
pub fn save_image<P>(path: &Path, image: &ImageBuffer<P, Vec<u8>>) -> Result<(), OutputError>
where
  P: Pixel<Subpixel = u8> + PixelWithColorType,
{
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  image.save(path)?;
  Ok(())
}

/// 模型检测路径的标注图像保存位置
pub enum AnnotationTarget {
  /// 保存到指定文件（每次覆盖）
  File(PathBuf),
  /// 在目录中自动命名
  Directory(DirectoryRecord),
  /// 在目录中按帧编号命名：`anpr_model_{frame_id}.jpg`
  PerFrame(PathBuf),
}

impl AnnotationTarget {
  /// 以 `/` 结尾或已存在的目录视为目录，否则视为文件路径
  pub fn from_path(path: &str) -> Self {
    let as_path = Path::new(path);
    if path.ends_with(std::path::MAIN_SEPARATOR) || path.ends_with('/') || as_path.is_dir() {
      AnnotationTarget::Directory(DirectoryRecord::new(as_path))
    } else {
      AnnotationTarget::File(as_path.to_path_buf())
    }
  }

  pub fn per_frame(root: impl Into<PathBuf>) -> Self {
    AnnotationTarget::PerFrame(root.into())
  }

  /// 本帧标注图像的保存路径
  pub fn resolve(&self, frame_id: FrameId) -> PathBuf {
    match self {
      AnnotationTarget::File(path) => path.clone(),
      AnnotationTarget::Directory(record) => record.next_path(),
      AnnotationTarget::PerFrame(root) => root.join(format!("anpr_model_{}.jpg", frame_id)),
    }
  }
}

impl FromUrlWithScheme for AnnotationTarget {
  const SCHEME: &'static str = "image";
}

impl FromUrl for AnnotationTarget {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      Self::SCHEME => Ok(AnnotationTarget::File(PathBuf::from(url.path()))),
      DirectoryRecord::SCHEME => Ok(AnnotationTarget::Directory(DirectoryRecord::from_url(url)?)),
      other => Err(OutputError::SchemeMismatch(format!(
        "期望保存方式 '{}' 或 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        DirectoryRecord::SCHEME,
        other
      ))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{GrayImage, RgbImage};

  #[test]
  fn annotation_target_from_url() {
    let file = AnnotationTarget::from_url(&Url::parse("image:///tmp/out/a.jpg").unwrap()).unwrap();
    assert_eq!(file.resolve(3), PathBuf::from("/tmp/out/a.jpg"));

    let dir = AnnotationTarget::from_url(&Url::parse("folder:///tmp/out").unwrap()).unwrap();
    assert!(matches!(dir, AnnotationTarget::Directory(_)));

    assert!(matches!(
      AnnotationTarget::from_url(&Url::parse("gst://x").unwrap()),
      Err(OutputError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn annotation_target_from_path() {
    assert!(matches!(
      AnnotationTarget::from_path("out/"),
      AnnotationTarget::Directory(_)
    ));
    assert!(matches!(
      AnnotationTarget::from_path("out/frame.jpg"),
      AnnotationTarget::File(_)
    ));

    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      AnnotationTarget::from_path(dir.path().to_str().unwrap()),
      AnnotationTarget::Directory(_)
    ));
  }

  #[test]
  fn per_frame_target_names_by_frame_id() {
    let target = AnnotationTarget::per_frame("output");
    assert_eq!(target.resolve(4), PathBuf::from("output/anpr_model_4.jpg"));
  }

  #[test]
  fn save_image_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a/b/c.png");
    save_image(&path, &RgbImage::new(4, 4)).unwrap();
    assert!(path.exists());

    let path = dir.path().join("gray.png");
    save_image(&path, &GrayImage::new(4, 4)).unwrap();
    assert!(path.exists());
  }
}
