// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/output/debug_dump.rs - 中间结果保存
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
use tracing::warn;

use crate::output::save_image;

/// 在 `ip0 .. ip{slots-1}` 之间轮换的调试目录
#[derive(Debug)]
pub struct DebugRotation {
  root: PathBuf,
  slots: u32,
  counter: u32,
}

impl DebugRotation {
  pub fn new(root: impl Into<PathBuf>, slots: u32) -> Self {
    Self {
      root: root.into(),
      slots: slots.max(1),
      counter: 0,
    }
  }

  /// 取得下一个调试目录，旧内容会被覆盖
  pub fn next_dump(&mut self) -> DebugDump {
    self.counter = (self.counter + 1) % self.slots;
    DebugDump {
      dir: self.root.join(format!("ip{}", self.counter)),
    }
  }
}

/// 一次检测的中间结果目录；保存失败只记录警告
#[derive(Debug, Clone)]
pub struct DebugDump {
  dir: PathBuf,
}

impl DebugDump {
  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn save<P>(&self, name: &str, image: &ImageBuffer<P, Vec<u8>>)
  where
    P: Pixel<Subpixel = u8> + PixelWithColorType,
  {
    let path = self.dir.join(format!("{}.png", name));
    if let Err(e) = save_image(&path, image) {
      warn!("保存中间结果 {} 失败: {}", path.display(), e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::GrayImage;

  #[test]
  fn rotation_wraps_over_slots() {
    let mut rotation = DebugRotation::new("output", 3);
    let dirs: Vec<_> = (0..4).map(|_| rotation.next_dump().dir().to_path_buf()).collect();
    assert_eq!(
      dirs,
      vec![
        PathBuf::from("output/ip1"),
        PathBuf::from("output/ip2"),
        PathBuf::from("output/ip0"),
        PathBuf::from("output/ip1"),
      ]
    );
  }

  #[test]
  fn save_writes_png_into_dump_dir() {
    let root = tempfile::tempdir().unwrap();
    let mut rotation = DebugRotation::new(root.path(), 2);
    let dump = rotation.next_dump();
    dump.save("02_gray", &GrayImage::new(4, 4));
    assert!(root.path().join("ip1/02_gray.png").exists());
  }

  #[test]
  fn save_failure_is_not_fatal() {
    let root = tempfile::tempdir().unwrap();
    let blocker = root.path().join("ip1");
    std::fs::write(&blocker, b"file in the way").unwrap();

    let mut rotation = DebugRotation::new(root.path(), 2);
    rotation.next_dump().save("01_blur", &GrayImage::new(4, 4));
    assert!(blocker.is_file());
  }
}
