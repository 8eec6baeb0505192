// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/worker.rs - 检测工作线程
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

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::detector::Detector;
use crate::frame::{DetectionTask, FrameId};

/// 一次检测的输出。模型路径可识别多块车牌，传统路径至多一块。
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
  Model {
    frame_id: FrameId,
    plates: Vec<String>,
  },
  Classical {
    frame_id: FrameId,
    plate: Option<String>,
  },
}

impl DetectionResult {
  /// 来源标签
  pub fn source(&self) -> &'static str {
    match self {
      DetectionResult::Model { .. } => "MODEL",
      DetectionResult::Classical { .. } => "CLASSICAL",
    }
  }

  pub fn frame_id(&self) -> FrameId {
    match self {
      DetectionResult::Model { frame_id, .. } | DetectionResult::Classical { frame_id, .. } => {
        *frame_id
      }
    }
  }

  pub fn plates(&self) -> Vec<&str> {
    match self {
      DetectionResult::Model { plates, .. } => plates.iter().map(String::as_str).collect(),
      DetectionResult::Classical { plate, .. } => plate.iter().map(String::as_str).collect(),
    }
  }

  pub fn is_empty(&self) -> bool {
    match self {
      DetectionResult::Model { plates, .. } => plates.is_empty(),
      DetectionResult::Classical { plate, .. } => plate.is_none(),
    }
  }
}

/// 依次处理队列中的任务，直到任务通道关闭。返回成功处理的任务数。
///
/// 单个任务的错误（包括 panic）只记录日志，不会终止循环。
pub fn run_worker<D: Detector>(
  mut detector: D,
  tasks: Receiver<DetectionTask>,
  results: Sender<DetectionResult>,
) -> usize {
  info!("[{}] 检测线程启动", D::NAME);
  let mut processed = 0;

  for task in tasks.iter() {
    let start = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| detector.detect(&task)));

    match outcome {
      Ok(Ok(result)) => {
        processed += 1;
        info!(
          "[{}] 帧 {} 检测完成，耗时: {:.2?}",
          D::NAME,
          task.frame_id,
          start.elapsed()
        );
        if results.send(result).is_err() {
          warn!("[{}] 结果通道已关闭，退出检测线程", D::NAME);
          break;
        }
      }
      Ok(Err(e)) => error!("[{}] 帧 {} 检测失败: {}", D::NAME, task.frame_id, e),
      Err(_) => error!("[{}] 帧 {} 检测过程发生 panic", D::NAME, task.frame_id),
    }
  }

  debug!("[{}] 任务通道已关闭", D::NAME);
  info!("[{}] 检测线程退出，共处理 {} 帧", D::NAME, processed);
  processed
}

/// 在独立线程中运行检测循环
pub fn spawn_worker<D>(
  detector: D,
  tasks: Receiver<DetectionTask>,
  results: Sender<DetectionResult>,
) -> std::io::Result<JoinHandle<usize>>
where
  D: Detector + Send + 'static,
{
  thread::Builder::new()
    .name(format!("anpr-{}", D::NAME.to_lowercase()))
    .spawn(move || run_worker(detector, tasks, results))
}

#[cfg(test)]
mod tests {
  use crossbeam_channel::unbounded;
  use image::RgbImage;

  use super::*;
  use crate::detector::DetectError;
  use crate::ocr::OcrError;

  /// 奇数帧返回错误，帧 4 触发 panic
  struct FlakyDetector;

  impl Detector for FlakyDetector {
    const NAME: &'static str = "FLAKY";

    fn detect(&mut self, task: &DetectionTask) -> Result<DetectionResult, DetectError> {
      if task.frame_id == 4 {
        panic!("detector blew up");
      }
      if task.frame_id % 2 == 1 {
        return Err(DetectError::OcrError(OcrError::primary(std::io::Error::other(
          "engine crashed",
        ))));
      }
      Ok(DetectionResult::Classical {
        frame_id: task.frame_id,
        plate: Some("MH12AB1234".to_string()),
      })
    }
  }

  #[test]
  fn failures_do_not_stop_the_worker() {
    let (task_tx, task_rx) = unbounded();
    let (result_tx, result_rx) = unbounded();

    for frame_id in 0..6 {
      task_tx
        .send(DetectionTask::new(RgbImage::new(2, 2), frame_id))
        .unwrap();
    }
    drop(task_tx);

    let handle = spawn_worker(FlakyDetector, task_rx, result_tx).unwrap();
    assert_eq!(handle.join().unwrap(), 2);

    let ids: Vec<_> = result_rx.iter().map(|r| r.frame_id()).collect();
    assert_eq!(ids, vec![0, 2]);
  }

  #[test]
  fn result_accessors() {
    let model = DetectionResult::Model {
      frame_id: 1,
      plates: vec!["MH12AB1234".to_string(), "KA01AB1234".to_string()],
    };
    assert_eq!(model.source(), "MODEL");
    assert_eq!(model.plates(), vec!["MH12AB1234", "KA01AB1234"]);
    assert!(!model.is_empty());

    let classical = DetectionResult::Classical {
      frame_id: 2,
      plate: None,
    };
    assert_eq!(classical.source(), "CLASSICAL");
    assert_eq!(classical.frame_id(), 2);
    assert!(classical.is_empty());
    assert!(classical.plates().is_empty());

    let empty_model = DetectionResult::Model {
      frame_id: 0,
      plates: vec![],
    };
    assert!(empty_model.is_empty());
  }
}
