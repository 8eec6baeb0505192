// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/pipeline.rs - 识别流水线
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

//! 一个分发器、两个检测线程和一个汇总线程组成的流水线。

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::unbounded;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info};

use crate::aggregate::{Aggregated, Aggregator, Report};
use crate::config::PipelineConfig;
use crate::detector::{ClassicalDetector, Detector, ModelDetector};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::model::Model;
use crate::ocr::PlateReader;
use crate::output::{AnnotationTarget, DebugRotation};
use crate::worker::spawn_worker;

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("线程创建失败: {0}")]
  SpawnError(#[from] std::io::Error),
  #[error("{0} 线程异常退出")]
  ThreadPanicked(&'static str),
}

pub struct Pipeline<R> {
  dispatcher: Dispatcher,
  workers: Vec<(&'static str, JoinHandle<usize>)>,
  aggregator: JoinHandle<Aggregated<R>>,
}

impl<R: Report + Send + 'static> Pipeline<R> {
  /// 按配置构建两个检测器，二者共用同一个车牌读取器
  pub fn start<M, P>(
    config: &PipelineConfig,
    model: M,
    reader: P,
    report: R,
  ) -> Result<Self, PipelineError>
  where
    M: Model + Send + 'static,
    P: PlateReader + 'static,
  {
    let reader = Arc::new(reader);

    let mut model_detector = ModelDetector::new(model, Arc::clone(&reader))
      .with_confidence(config.model_confidence);
    let mut classical_detector = ClassicalDetector::new(reader, config.classical.clone());

    if config.save_output {
      let root = &config.output_root;
      model_detector = model_detector.with_annotation(AnnotationTarget::per_frame(root));
      classical_detector = classical_detector
        .with_output(root)
        .with_debug(DebugRotation::new(root, config.debug_slots));
    }

    Self::with_detectors(config, model_detector, classical_detector, report)
  }

  /// 使用已构建好的检测器
  pub fn with_detectors<A, B>(
    config: &PipelineConfig,
    model_detector: A,
    classical_detector: B,
    report: R,
  ) -> Result<Self, PipelineError>
  where
    A: Detector + Send + 'static,
    B: Detector + Send + 'static,
  {
    let (dispatcher, queues) = Dispatcher::new(config);
    let (result_tx, result_rx) = unbounded();

    let aggregator = Aggregator::new(report).spawn(result_rx)?;
    let workers = vec![
      (
        A::NAME,
        spawn_worker(model_detector, queues.model, result_tx.clone())?,
      ),
      (
        B::NAME,
        spawn_worker(classical_detector, queues.classical, result_tx)?,
      ),
    ];

    info!(
      "流水线已启动，检测间隔 {:.2?}，帧编号窗口 {}，队列策略 {:?}",
      config.detection_interval, config.frame_window, config.queue_policy
    );

    Ok(Self {
      dispatcher,
      workers,
      aggregator,
    })
  }

  pub fn dispatch(&self, frame: &RgbImage) -> DispatchOutcome {
    self.dispatcher.dispatch(frame)
  }

  pub fn dispatcher(&self) -> &Dispatcher {
    &self.dispatcher
  }

  /// 停止接收新帧，等待已排队的任务处理完毕
  pub fn shutdown(self) -> Result<Aggregated<R>, PipelineError> {
    info!("正在关闭流水线...");
    drop(self.dispatcher);

    for (name, handle) in self.workers {
      match handle.join() {
        Ok(processed) => info!("[{}] 线程已结束，处理 {} 帧", name, processed),
        Err(_) => {
          error!("[{}] 线程异常退出", name);
          return Err(PipelineError::ThreadPanicked(name));
        }
      }
    }

    self
      .aggregator
      .join()
      .map_err(|_| PipelineError::ThreadPanicked("AGGREGATOR"))
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::detector::mock::{CountingReader, FixedModel};
  use crate::model::DetectItem;
  use crate::worker::DetectionResult;

  #[test]
  fn frame_flows_through_both_detectors() {
    let config = PipelineConfig::default().with_detection_interval(Duration::ZERO);
    let model = FixedModel {
      items: vec![DetectItem {
        score: 0.8,
        bbox: [4.0, 4.0, 60.0, 20.0],
      }],
    };
    let pipeline = Pipeline::start(
      &config,
      model,
      CountingReader::new(Some("MH12AB1234")),
      Vec::new(),
    )
    .unwrap();

    assert!(matches!(
      pipeline.dispatch(&RgbImage::new(120, 60)),
      DispatchOutcome::Dispatched { frame_id: 0, .. }
    ));

    let aggregated = pipeline.shutdown().unwrap();
    // 空白帧上传统路径没有结果，只有模型路径的结果被输出
    assert_eq!(aggregated.received, 2);
    assert_eq!(
      aggregated.report,
      vec![DetectionResult::Model {
        frame_id: 0,
        plates: vec!["MH12AB1234".to_string()],
      }]
    );
  }

  #[test]
  fn output_enabled_writes_annotations() {
    let root = tempfile::tempdir().unwrap();
    let config = PipelineConfig::default()
      .with_detection_interval(Duration::ZERO)
      .with_output(Some(root.path().to_path_buf()));
    let model = FixedModel {
      items: vec![DetectItem {
        score: 0.8,
        bbox: [4.0, 4.0, 60.0, 20.0],
      }],
    };
    let pipeline = Pipeline::start(&config, model, CountingReader::new(None), Vec::new()).unwrap();

    pipeline.dispatch(&RgbImage::new(120, 60));
    let aggregated = pipeline.shutdown().unwrap();
    assert!(aggregated.report.is_empty());
    assert!(root.path().join("anpr_model_0.jpg").exists());
    assert!(root.path().join("ip1").join("05_morph.png").exists());
  }
}
