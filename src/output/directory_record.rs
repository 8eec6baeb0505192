// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::Local;

use crate::{FromUrl, FromUrlWithScheme, output::OutputError};

/// 在目录中为每张图像生成不重复的文件名
pub struct DirectoryRecord {
  directory: PathBuf,
  prefix: String,
  frame_counter: AtomicU16,
}

impl FromUrlWithScheme for DirectoryRecord {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecord {
  type Error = OutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(uri.scheme().to_string()));
    }

    let mut record = DirectoryRecord::new(Path::new(uri.path()));
    if let Some((_, prefix)) = uri.query_pairs().find(|(k, _)| k == "prefix") {
      record.prefix = prefix.into_owned();
    }
    Ok(record)
  }
}

impl DirectoryRecord {
  pub fn new(directory: &Path) -> Self {
    Self {
      directory: directory.to_path_buf(),
      prefix: "anpr".to_string(),
      frame_counter: AtomicU16::new(0),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  /// 形如 `anpr_20260101-08-30-00-0001.jpg`
  pub fn next_path(&self) -> PathBuf {
    let now = Local::now();
    self.directory.join(format!(
      "{}_{}-{:04X}.jpg",
      self.prefix,
      now.format("%Y%m%d-%H-%M-%S"),
      self.frame_id()
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn paths_are_unique_and_inside_directory() {
    let record = DirectoryRecord::new(Path::new("/tmp/anpr"));
    let a = record.next_path();
    let b = record.next_path();
    assert_ne!(a, b);
    assert!(a.starts_with("/tmp/anpr"));
    let name = a.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("anpr_"));
    assert!(name.ends_with("-0001.jpg"));
  }

  #[test]
  fn prefix_from_url() {
    let url = url::Url::parse("folder:///tmp/anpr?prefix=gate").unwrap();
    let record = DirectoryRecord::from_url(&url).unwrap();
    assert_eq!(record.directory(), Path::new("/tmp/anpr"));
    let name = record.next_path();
    assert!(name.file_name().unwrap().to_str().unwrap().starts_with("gate_"));
  }
}
