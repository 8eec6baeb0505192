// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/ocr/command.rs - 外部程序 OCR 引擎
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

//! 通过外部程序调用 OCR 引擎。
//!
//! 裁剪出的车牌图像以 PNG 格式写入程序的标准输入，程序在标准输出中
//! 每行输出一个文本块。
//!
//! ```text
//! cmd:///usr/local/bin/easyocr-plate?arg=--lang&arg=en
//! cmd:///usr/local/bin/paddle-plate?lines=join&timeout_ms=2000
//! ```

use std::time::Duration;

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  ocr::OcrEngine,
  utils::{ExternalCommandError, run_with_image, timeout_from_query},
};

#[derive(Error, Debug)]
pub enum CommandOcrError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("未知的行模式: {0}")]
  UnknownLineMode(String),
  #[error("外部 OCR 程序错误: {0}")]
  CommandError(#[from] ExternalCommandError),
}

/// 多行输出的合并方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineMode {
  /// 只取第一行非空文本
  #[default]
  First,
  /// 拼接全部非空行
  Join,
}

impl LineMode {
  pub fn collect(self, stdout: &str) -> Option<String> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    match self {
      LineMode::First => lines.next().map(str::to_string),
      LineMode::Join => {
        let joined: String = lines.collect();
        (!joined.is_empty()).then_some(joined)
      }
    }
  }
}

#[derive(Debug, Clone)]
pub struct CommandOcr {
  program: String,
  args: Vec<String>,
  lines: LineMode,
  timeout: Option<Duration>,
}

impl CommandOcr {
  pub fn new(program: &str) -> Self {
    Self {
      program: program.to_string(),
      args: Vec::new(),
      lines: LineMode::default(),
      timeout: None,
    }
  }

  pub fn with_args(mut self, args: Vec<String>) -> Self {
    self.args = args;
    self
  }

  pub fn with_line_mode(mut self, lines: LineMode) -> Self {
    self.lines = lines;
    self
  }

  /// 单次识别的时限，超时的程序会被终止，结果视为未识别到文本
  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout
  }
}

impl FromUrlWithScheme for CommandOcr {
  const SCHEME: &'static str = "cmd";
}

impl FromUrl for CommandOcr {
  type Error = CommandOcrError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CommandOcrError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut args = Vec::new();
    let mut lines = LineMode::default();
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "arg" => args.push(v.into_owned()),
        "lines" => {
          lines = match v.as_ref() {
            "first" => LineMode::First,
            "join" => LineMode::Join,
            other => return Err(CommandOcrError::UnknownLineMode(other.to_string())),
          }
        }
        _ => {}
      }
    }

    Ok(
      CommandOcr::new(url.path())
        .with_args(args)
        .with_line_mode(lines)
        .with_timeout(timeout_from_query(url)),
    )
  }
}

impl OcrEngine for CommandOcr {
  type Error = CommandOcrError;

  fn read(&self, image: &DynamicImage) -> Result<Option<String>, Self::Error> {
    let output = match run_with_image(&self.program, &self.args, image, self.timeout) {
      Ok(output) => output,
      Err(ExternalCommandError::Timeout { .. }) => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    let text = self.lines.collect(&stdout);
    debug!("{} 识别结果: {:?}", self.program, text);
    Ok(text)
  }
}
