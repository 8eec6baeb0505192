// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/detector.rs - 车牌检测器
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

use thiserror::Error;

use crate::frame::DetectionTask;
use crate::ocr::OcrError;
use crate::worker::DetectionResult;

mod classical;
mod model;

pub use self::classical::ClassicalDetector;
pub use self::model::ModelDetector;

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("OCR 错误: {0}")]
  OcrError(#[from] OcrError),
  #[error("模型推理错误: {0}")]
  ModelError(Box<dyn std::error::Error + Send + Sync>),
}

impl DetectError {
  pub fn model<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    DetectError::ModelError(Box::new(e))
  }
}

/// 检测工作线程使用的检测器接口
pub trait Detector {
  /// 工作线程名称，同时作为日志标签
  const NAME: &'static str;

  fn detect(&mut self, task: &DetectionTask) -> Result<DetectionResult, DetectError>;
}
