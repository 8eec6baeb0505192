// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/aggregate.rs - 识别结果汇总
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

use std::io::Write;
use std::thread::{self, JoinHandle};

use chrono::Local;
use crossbeam_channel::Receiver;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::worker::DetectionResult;

#[derive(Error, Debug)]
pub enum ReportError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 识别结果的去处
pub trait Report {
  fn report(&mut self, result: &DetectionResult) -> Result<(), ReportError>;
}

impl<R: Report + ?Sized> Report for Box<R> {
  fn report(&mut self, result: &DetectionResult) -> Result<(), ReportError> {
    (**self).report(result)
  }
}

impl<R: Report> Report for Option<R> {
  fn report(&mut self, result: &DetectionResult) -> Result<(), ReportError> {
    match self {
      Some(report) => report.report(result),
      None => Ok(()),
    }
  }
}

impl<A: Report, B: Report> Report for (A, B) {
  fn report(&mut self, result: &DetectionResult) -> Result<(), ReportError> {
    let first = self.0.report(result);
    self.1.report(result)?;
    first
  }
}

/// 收集到内存中
impl Report for Vec<DetectionResult> {
  fn report(&mut self, result: &DetectionResult) -> Result<(), ReportError> {
    self.push(result.clone());
    Ok(())
  }
}

/// 以日志形式输出
#[derive(Debug, Default)]
pub struct LogReport;

impl Report for LogReport {
  fn report(&mut self, result: &DetectionResult) -> Result<(), ReportError> {
    info!(
      "[{}] 帧 {} 识别结果: {}",
      result.source(),
      result.frame_id(),
      result.plates().join(", ")
    );
    Ok(())
  }
}

/// 每条结果一行 JSON
pub struct JsonLinesReport<W> {
  writer: W,
}

impl<W: Write> JsonLinesReport<W> {
  pub fn new(writer: W) -> Self {
    Self { writer }
  }

  pub fn into_inner(self) -> W {
    self.writer
  }
}

impl<W: Write> Report for JsonLinesReport<W> {
  fn report(&mut self, result: &DetectionResult) -> Result<(), ReportError> {
    let line = json!({
      "time": Local::now().to_rfc3339(),
      "source": result.source(),
      "frame_id": result.frame_id(),
      "plates": result.plates(),
    });
    serde_json::to_writer(&mut self.writer, &line)?;
    self.writer.write_all(b"\n")?;
    self.writer.flush()?;
    Ok(())
  }
}

/// 汇总线程结束时的统计
#[derive(Debug)]
pub struct Aggregated<R> {
  pub report: R,
  /// 收到的结果数
  pub received: usize,
  /// 非空并已输出的结果数
  pub reported: usize,
}

/// 按到达顺序串行处理两个检测器的结果，只输出非空结果
pub struct Aggregator<R> {
  report: R,
}

impl<R: Report> Aggregator<R> {
  pub fn new(report: R) -> Self {
    Self { report }
  }

  /// 阻塞直到所有发送端关闭
  pub fn run(mut self, results: Receiver<DetectionResult>) -> Aggregated<R> {
    let mut received = 0;
    let mut reported = 0;

    for result in results.iter() {
      received += 1;
      if result.is_empty() {
        debug!("[{}] 帧 {} 无识别结果", result.source(), result.frame_id());
        continue;
      }

      match self.report.report(&result) {
        Ok(()) => reported += 1,
        Err(e) => warn!(
          "[{}] 帧 {} 结果输出失败: {}",
          result.source(),
          result.frame_id(),
          e
        ),
      }
    }

    info!("汇总结束，共收到 {} 条结果，输出 {} 条", received, reported);
    Aggregated {
      report: self.report,
      received,
      reported,
    }
  }
}

impl<R: Report + Send + 'static> Aggregator<R> {
  pub fn spawn(self, results: Receiver<DetectionResult>) -> std::io::Result<JoinHandle<Aggregated<R>>> {
    thread::Builder::new()
      .name("anpr-aggregator".to_string())
      .spawn(move || self.run(results))
  }
}
