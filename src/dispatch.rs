// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/dispatch.rs - 帧分发
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

//! 限速并把帧副本分发给两个检测器。每个检测器只有一个任务槽，
//! 槽被占用时按 [`QueuePolicy`] 丢弃新帧或替换旧任务，分发本身从不阻塞。

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use image::RgbImage;
use tracing::{debug, warn};

use crate::config::{PipelineConfig, QueuePolicy};
use crate::frame::{DetectionTask, FrameId};

/// 单个检测队列的入队结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueStatus {
  Enqueued,
  /// 队列已满，新帧被丢弃
  Dropped,
  /// 新帧替换了尚未取走的旧任务
  Replaced,
  /// 检测线程已退出
  Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
  /// 距上次分发不足检测间隔
  Throttled,
  Dispatched {
    frame_id: FrameId,
    model: EnqueueStatus,
    classical: EnqueueStatus,
  },
}

/// 检测线程一侧的任务接收端
pub struct DetectorQueues {
  pub model: Receiver<DetectionTask>,
  pub classical: Receiver<DetectionTask>,
}

struct SlotQueue {
  tx: Sender<DetectionTask>,
  // 仅 KeepLatest 持有，用于取走旧任务
  rx: Option<Receiver<DetectionTask>>,
}

impl SlotQueue {
  fn new(policy: QueuePolicy) -> (Self, Receiver<DetectionTask>) {
    let (tx, rx) = bounded(1);
    let stale = match policy {
      QueuePolicy::KeepPending => None,
      QueuePolicy::KeepLatest => Some(rx.clone()),
    };
    (Self { tx, rx: stale }, rx)
  }

  fn offer(&self, frame: &RgbImage, frame_id: FrameId) -> EnqueueStatus {
    if self.rx.is_none() && self.tx.is_full() {
      return EnqueueStatus::Dropped;
    }

    let task = DetectionTask::new(frame.clone(), frame_id);
    match self.tx.try_send(task) {
      Ok(()) => EnqueueStatus::Enqueued,
      Err(TrySendError::Disconnected(_)) => EnqueueStatus::Disconnected,
      Err(TrySendError::Full(task)) => {
        let Some(rx) = &self.rx else {
          return EnqueueStatus::Dropped;
        };
        // 检测线程可能恰好取走了旧任务，此时 try_recv 为空也无妨
        if let Ok(stale) = rx.try_recv() {
          debug!("帧 {} 被帧 {} 替换", stale.frame_id, frame_id);
        }
        match self.tx.try_send(task) {
          Ok(()) => EnqueueStatus::Replaced,
          Err(TrySendError::Full(_)) => EnqueueStatus::Dropped,
          Err(TrySendError::Disconnected(_)) => EnqueueStatus::Disconnected,
        }
      }
    }
  }
}

struct DispatchState {
  last_dispatch: Option<Instant>,
  frame_counter: FrameId,
}

pub struct Dispatcher {
  interval: Duration,
  window: FrameId,
  model: SlotQueue,
  classical: SlotQueue,
  state: Mutex<DispatchState>,
}

impl Dispatcher {
  pub fn new(config: &PipelineConfig) -> (Self, DetectorQueues) {
    let (model, model_rx) = SlotQueue::new(config.queue_policy);
    let (classical, classical_rx) = SlotQueue::new(config.queue_policy);

    let dispatcher = Self {
      interval: config.detection_interval,
      window: config.frame_window.max(1),
      model,
      classical,
      state: Mutex::new(DispatchState {
        last_dispatch: None,
        frame_counter: 0,
      }),
    };

    (
      dispatcher,
      DetectorQueues {
        model: model_rx,
        classical: classical_rx,
      },
    )
  }

  /// 非阻塞，可在采集循环中按相机帧率调用
  pub fn dispatch(&self, frame: &RgbImage) -> DispatchOutcome {
    self.dispatch_at(frame, Instant::now())
  }

  /// 以给定时刻作为当前时间分发
  pub fn dispatch_at(&self, frame: &RgbImage, now: Instant) -> DispatchOutcome {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(last) = state.last_dispatch
      && now.saturating_duration_since(last) < self.interval
    {
      return DispatchOutcome::Throttled;
    }

    state.last_dispatch = Some(now);
    let frame_id = state.frame_counter;
    state.frame_counter = (state.frame_counter + 1) % self.window;

    let model = self.model.offer(frame, frame_id);
    let classical = self.classical.offer(frame, frame_id);
    drop(state);

    for (name, status) in [("MODEL", model), ("CLASSICAL", classical)] {
      match status {
        EnqueueStatus::Enqueued => {}
        EnqueueStatus::Dropped => debug!("[{}] 检测队列已满，丢弃帧 {}", name, frame_id),
        EnqueueStatus::Replaced => debug!("[{}] 帧 {} 替换了待处理任务", name, frame_id),
        EnqueueStatus::Disconnected => warn!("[{}] 检测线程已退出，丢弃帧 {}", name, frame_id),
      }
    }

    DispatchOutcome::Dispatched {
      frame_id,
      model,
      classical,
    }
  }
}
