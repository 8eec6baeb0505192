// 该文件是 Chepai （车牌识别） 项目的一部分。
// tests/pipeline.rs - 流水线端到端测试
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

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{DynamicImage, RgbImage};

use chepai::config::PipelineConfig;
use chepai::dispatch::DispatchOutcome;
use chepai::model::{DetectItem, DetectResult, Model};
use chepai::ocr::{OcrConsensus, OcrEngine};
use chepai::pipeline::Pipeline;
use chepai::worker::DetectionResult;

/// 每帧返回同一个检测框
struct OneBox;

impl Model for OneBox {
  type Error = Infallible;

  fn infer(&self, _image: &RgbImage, confidence: f32) -> Result<DetectResult, Self::Error> {
    let item = DetectItem {
      score: 0.9,
      bbox: [10.0, 10.0, 90.0, 30.0],
    };
    Ok(if item.score >= confidence {
      vec![item].into()
    } else {
      DetectResult::default()
    })
  }
}

struct FixedText {
  text: &'static str,
  calls: AtomicUsize,
}

impl FixedText {
  fn new(text: &'static str) -> Arc<Self> {
    Arc::new(Self {
      text,
      calls: AtomicUsize::new(0),
    })
  }

  fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl OcrEngine for FixedText {
  type Error = Infallible;

  fn read(&self, _image: &DynamicImage) -> Result<Option<String>, Self::Error> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(Some(self.text.to_string()))
  }
}

fn run_one_frame(primary: &Arc<FixedText>, fallback: &Arc<FixedText>) -> Vec<DetectionResult> {
  let config = PipelineConfig::default().with_detection_interval(Duration::ZERO);
  let reader = OcrConsensus::new(Arc::clone(primary), Arc::clone(fallback));
  let pipeline = Pipeline::start(&config, OneBox, reader, Vec::new()).unwrap();

  assert!(matches!(
    pipeline.dispatch(&RgbImage::new(160, 80)),
    DispatchOutcome::Dispatched { frame_id: 0, .. }
  ));
  pipeline.shutdown().unwrap().report
}

#[test]
fn lowercase_primary_text_is_reported_without_fallback() {
  let primary = FixedText::new("mh12ab1234");
  let fallback = FixedText::new("KA01AB1234");

  let report = run_one_frame(&primary, &fallback);
  assert_eq!(
    report,
    vec![DetectionResult::Model {
      frame_id: 0,
      plates: vec!["MH12AB1234".to_string()],
    }]
  );
  assert_eq!(primary.calls(), 1);
  assert_eq!(fallback.calls(), 0);
}

#[test]
fn misread_digit_is_corrected() {
  let primary = FixedText::new("MHI2AB1234");
  let fallback = FixedText::new("");

  let report = run_one_frame(&primary, &fallback);
  assert_eq!(report[0].plates(), vec!["MH12AB1234"]);
  assert_eq!(fallback.calls(), 0);
}

#[test]
fn ambiguous_primary_defers_to_fallback() {
  let primary = FixedText::new("MH12");
  let fallback = FixedText::new("ka 01 ab 1234");

  let report = run_one_frame(&primary, &fallback);
  assert_eq!(report[0].plates(), vec!["KA01AB1234"]);
  assert_eq!(fallback.calls(), 1);
}

#[cfg(feature = "read_image_file")]
#[test]
fn folder_input_feeds_the_pipeline() {
  use chepai::input::ImageFolderInput;
  use chepai::task::CaptureTask;

  let dir = tempfile::tempdir().unwrap();
  for i in 0..3 {
    RgbImage::new(160, 80)
      .save(dir.path().join(format!("frame_{}.png", i)))
      .unwrap();
  }

  let config = PipelineConfig::default().with_detection_interval(Duration::ZERO);
  let reader = OcrConsensus::new(FixedText::new("MH12AB1234"), FixedText::new(""));
  let pipeline = Pipeline::start(&config, OneBox, reader, Vec::new()).unwrap();

  let input = ImageFolderInput::open(dir.path()).unwrap();
  let summary = CaptureTask::default()
    .run(input, pipeline.dispatcher())
    .unwrap();
  assert_eq!(summary.frames, 3);
  assert!(summary.dispatched >= 1);

  let aggregated = pipeline.shutdown().unwrap();
  // 检测器繁忙时帧会被丢弃，至少第一帧一定被处理
  assert!(aggregated.reported >= 1);
  assert!(
    aggregated
      .report
      .iter()
      .all(|r| r.plates() == vec!["MH12AB1234"])
  );
}
