// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/ocr.rs - OCR 引擎接口
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

use std::sync::{Arc, Mutex, PoisonError};

use image::DynamicImage;
use thiserror::Error;

use crate::utils::{TimeBounded, call_with_deadline};

/// 外部 OCR 引擎。`Ok(None)` 表示未识别到任何文本。
pub trait OcrEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn read(&self, image: &DynamicImage) -> Result<Option<String>, Self::Error>;
}

impl<E: OcrEngine + ?Sized> OcrEngine for Arc<E> {
  type Error = E::Error;

  fn read(&self, image: &DynamicImage) -> Result<Option<String>, Self::Error> {
    (**self).read(image)
  }
}

/// 两个检测器共用的车牌读取接口，返回通过校验的车牌文本
pub trait PlateReader: Send + Sync {
  fn read_plate(&self, image: &DynamicImage) -> Result<Option<String>, OcrError>;
}

impl<R: PlateReader + ?Sized> PlateReader for Arc<R> {
  fn read_plate(&self, image: &DynamicImage) -> Result<Option<String>, OcrError> {
    (**self).read_plate(image)
  }
}

#[derive(Error, Debug)]
pub enum OcrError {
  #[error("主 OCR 引擎错误: {0}")]
  PrimaryEngine(Box<dyn std::error::Error + Send + Sync>),
}

impl OcrError {
  pub fn primary<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    OcrError::PrimaryEngine(Box::new(e))
  }
}

/// 用互斥锁串行化对非线程安全引擎的访问
pub struct Exclusive<E> {
  inner: Mutex<E>,
}

impl<E> Exclusive<E> {
  pub fn new(engine: E) -> Self {
    Self {
      inner: Mutex::new(engine),
    }
  }
}

impl<E: OcrEngine> OcrEngine for Exclusive<E> {
  type Error = E::Error;

  fn read(&self, image: &DynamicImage) -> Result<Option<String>, Self::Error> {
    let engine = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    engine.read(image)
  }
}

impl<E> OcrEngine for TimeBounded<E>
where
  E: OcrEngine + Send + Sync + 'static,
{
  type Error = E::Error;

  fn read(&self, image: &DynamicImage) -> Result<Option<String>, Self::Error> {
    let Some(timeout) = self.timeout else {
      return self.inner.read(image);
    };
    let engine = Arc::clone(&self.inner);
    let image = image.clone();
    call_with_deadline(&self.name, timeout, move || engine.read(&image)).unwrap_or(Ok(None))
  }
}

mod command;
mod consensus;

pub use self::command::{CommandOcr, CommandOcrError, LineMode};
pub use self::consensus::OcrConsensus;
