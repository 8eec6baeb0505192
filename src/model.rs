// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/model.rs - 车牌检测模型
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

use std::sync::Arc;

use image::RgbImage;

use crate::utils::{TimeBounded, call_with_deadline};

/// 外部目标检测模型
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 返回置信度不低于 `confidence` 的检测框
  fn infer(&self, image: &RgbImage, confidence: f32) -> Result<DetectResult, Self::Error>;
}

impl<M: Model + ?Sized> Model for Arc<M> {
  type Error = M::Error;

  fn infer(&self, image: &RgbImage, confidence: f32) -> Result<DetectResult, Self::Error> {
    (**self).infer(image, confidence)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub score: f32,
  pub bbox: [f32; 4], // 像素坐标 [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl<M> Model for TimeBounded<M>
where
  M: Model + Send + Sync + 'static,
{
  type Error = M::Error;

  fn infer(&self, image: &RgbImage, confidence: f32) -> Result<DetectResult, Self::Error> {
    let Some(timeout) = self.timeout else {
      return self.inner.infer(image, confidence);
    };
    let model = Arc::clone(&self.inner);
    let image = image.clone();
    call_with_deadline(&self.name, timeout, move || {
      model.infer(&image, confidence)
    })
    .unwrap_or_else(|| Ok(DetectResult::default()))
  }
}

mod command;
pub use self::command::{CommandModel, CommandModelError};
