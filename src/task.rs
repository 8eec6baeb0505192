// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/task.rs - 采集任务
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

use std::{thread, time::Duration, time::Instant};

use crossbeam_channel::{Receiver, bounded};
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::frame::Frame;

/// 安装 Ctrl-C 处理函数，返回中断信号接收端。
/// 收到信号 30 秒后仍未退出则强制结束进程。
pub fn install_interrupt_handler() -> Result<Receiver<()>, ctrlc::Error> {
  let (tx, rx) = bounded(1);

  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.try_send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  Ok(rx)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSummary {
  /// 读取的帧数
  pub frames: usize,
  /// 实际分发的帧数
  pub dispatched: usize,
}

/// 持续从输入源取帧并交给分发器，直到输入结束、出错、达到帧数上限或收到中断信号
#[derive(Default, Debug)]
pub struct CaptureTask {
  frame_number: Option<usize>,
  frame_interval: Option<Duration>,
  interrupt: Option<Receiver<()>>,
}

impl CaptureTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 按固定间隔取帧，模拟相机帧率
  pub fn with_frame_interval(mut self, interval: Option<Duration>) -> Self {
    self.frame_interval = interval;
    self
  }

  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  pub fn run<I, E>(self, input: I, dispatcher: &Dispatcher) -> Result<CaptureSummary, E>
  where
    I: IntoIterator<Item = Result<Frame, E>>,
    E: std::error::Error,
  {
    info!("开始采集...");
    let mut summary = CaptureSummary::default();

    for frame in input {
      let started = Instant::now();
      let frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
          warn!("读取第 {} 帧失败，退出采集循环: {}", summary.frames + 1, e);
          return Err(e);
        }
      };

      summary.frames += 1;
      match dispatcher.dispatch(&frame.image) {
        DispatchOutcome::Dispatched { frame_id, .. } => {
          summary.dispatched += 1;
          debug!("第 {} 帧分发为帧 {}", frame.index, frame_id);
        }
        DispatchOutcome::Throttled => {}
      }

      if self.frame_number.is_some_and(|n| summary.frames >= n) {
        info!("达到指定帧数 {}, 退出采集循环", summary.frames);
        break;
      }
      if self
        .interrupt
        .as_ref()
        .is_some_and(|rx| rx.try_recv().is_ok())
      {
        warn!("中断信号接收，退出采集循环");
        break;
      }
      if let Some(interval) = self.frame_interval {
        thread::sleep(interval.saturating_sub(started.elapsed()));
      }
    }

    info!(
      "采集结束，共读取 {} 帧，分发 {} 帧",
      summary.frames, summary.dispatched
    );
    Ok(summary)
  }
}
