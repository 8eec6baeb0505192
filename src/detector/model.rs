// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/detector/model.rs - 基于检测模型的车牌识别
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

use image::{DynamicImage, RgbImage};
use tracing::{debug, info, warn};

use crate::config::DEFAULT_MODEL_CONFIDENCE;
use crate::detector::{DetectError, Detector};
use crate::frame::{BoundingBox, DetectionTask, FrameId};
use crate::model::Model;
use crate::ocr::PlateReader;
use crate::output::draw::Draw;
use crate::output::{AnnotationTarget, save_image};
use crate::worker::DetectionResult;

pub struct ModelDetector<M, R> {
  model: M,
  reader: R,
  confidence: f32,
  annotation: Option<AnnotationTarget>,
  draw: Draw,
}

impl<M: Model, R: PlateReader> ModelDetector<M, R> {
  pub fn new(model: M, reader: R) -> Self {
    Self {
      model,
      reader,
      confidence: DEFAULT_MODEL_CONFIDENCE,
      annotation: None,
      draw: Draw::default(),
    }
  }

  pub fn with_confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  /// 至少检测到一个车牌框时保存标注图像
  pub fn with_annotation(mut self, target: AnnotationTarget) -> Self {
    self.annotation = Some(target);
    self
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  /// 返回本帧中所有识别成功的车牌文本，顺序与检测框一致
  pub fn detect_plates(
    &self,
    frame: &RgbImage,
    frame_id: FrameId,
  ) -> Result<Vec<String>, DetectError> {
    let result = self
      .model
      .infer(frame, self.confidence)
      .map_err(DetectError::model)?;
    debug!("帧 {} 检测到 {} 个车牌框", frame_id, result.len());

    let mut plates = Vec::new();
    let mut boxes = Vec::with_capacity(result.len());

    for item in result.items.iter() {
      let Some(bbox) = BoundingBox::from_xyxy(item.bbox, frame.width(), frame.height()) else {
        debug!("忽略空检测框 {:?}", item.bbox);
        continue;
      };

      let crop = DynamicImage::ImageRgb8(bbox.crop(frame));
      let text = self.reader.read_plate(&crop)?.filter(|t| !t.is_empty());
      if let Some(text) = &text {
        debug!("检测框 {:?}（置信度 {:.2}）识别为 {}", bbox, item.score, text);
        plates.push(text.clone());
      }
      boxes.push((bbox, text));
    }

    if !boxes.is_empty()
      && let Some(target) = &self.annotation
    {
      let mut annotated = frame.clone();
      for (bbox, text) in &boxes {
        self.draw.draw_plate(&mut annotated, bbox, text.as_deref());
      }

      let path = target.resolve(frame_id);
      match save_image(&path, &annotated) {
        Ok(()) => info!("标注图像已保存至 {}", path.display()),
        Err(e) => warn!("保存标注图像 {} 失败: {}", path.display(), e),
      }
    }

    Ok(plates)
  }
}

impl<M: Model, R: PlateReader> Detector for ModelDetector<M, R> {
  const NAME: &'static str = "MODEL";

  fn detect(&mut self, task: &DetectionTask) -> Result<DetectionResult, DetectError> {
    let plates = self.detect_plates(&task.frame, task.frame_id)?;
    Ok(DetectionResult::Model {
      frame_id: task.frame_id,
      plates,
    })
  }
}
