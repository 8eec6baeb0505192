// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/model/command.rs - 外部程序检测模型
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

//! 通过外部程序运行目标检测模型。
//!
//! 整帧图像以 PNG 格式写入标准输入，置信度阈值以 `--conf <值>` 追加在参数末尾。
//! 程序在标准输出中打印 JSON 数组：
//!
//! ```json
//! [{"bbox": [x_min, y_min, x_max, y_max], "score": 0.87}]
//! ```

use std::time::Duration;

use image::{DynamicImage, RgbImage};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectItem, DetectResult, Model},
  utils::{ExternalCommandError, run_with_image, timeout_from_query},
};

#[derive(Error, Debug)]
pub enum CommandModelError {
  #[error("模型路径必须使用 {0} 方案")]
  SchemeMismatch(&'static str),
  #[error("外部模型程序错误: {0}")]
  CommandError(#[from] ExternalCommandError),
  #[error("模型输出解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("模型输出格式错误: {0}")]
  InvalidOutput(String),
}

#[derive(Debug, Clone)]
pub struct CommandModel {
  program: String,
  args: Vec<String>,
  conf_flag: String,
  timeout: Option<Duration>,
}

impl CommandModel {
  pub fn new(program: &str) -> Self {
    Self {
      program: program.to_string(),
      args: Vec::new(),
      conf_flag: "--conf".to_string(),
      timeout: None,
    }
  }

  pub fn with_args(mut self, args: Vec<String>) -> Self {
    self.args = args;
    self
  }

  pub fn with_conf_flag(mut self, flag: &str) -> Self {
    self.conf_flag = flag.to_string();
    self
  }

  /// 单帧推理时限，超时的程序会被终止，结果视为没有检测框
  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout
  }
}

impl FromUrlWithScheme for CommandModel {
  const SCHEME: &'static str = "cmd";
}

impl FromUrl for CommandModel {
  type Error = CommandModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CommandModelError::SchemeMismatch(Self::SCHEME));
    }

    let mut model = CommandModel::new(url.path()).with_timeout(timeout_from_query(url));
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "arg" => model.args.push(v.into_owned()),
        "conf_flag" => model.conf_flag = v.into_owned(),
        _ => {}
      }
    }

    Ok(model)
  }
}

fn parse_item(value: &Value) -> Result<DetectItem, CommandModelError> {
  let bbox = value
    .get("bbox")
    .and_then(Value::as_array)
    .filter(|b| b.len() == 4)
    .ok_or_else(|| CommandModelError::InvalidOutput(format!("缺少 bbox: {}", value)))?;

  let mut xyxy = [0f32; 4];
  for (slot, v) in xyxy.iter_mut().zip(bbox) {
    *slot = v
      .as_f64()
      .ok_or_else(|| CommandModelError::InvalidOutput(format!("bbox 非数值: {}", value)))?
      as f32;
  }

  let score = value.get("score").and_then(Value::as_f64).unwrap_or(1.0) as f32;
  Ok(DetectItem { score, bbox: xyxy })
}

/// 解析模型输出，并丢弃低于阈值的检测框
pub fn parse_detections(stdout: &str, confidence: f32) -> Result<DetectResult, CommandModelError> {
  let stdout = stdout.trim();
  if stdout.is_empty() {
    return Ok(DetectResult::default());
  }

  let value: Value = serde_json::from_str(stdout)?;
  let array = value
    .as_array()
    .ok_or_else(|| CommandModelError::InvalidOutput("输出不是 JSON 数组".to_string()))?;

  let items = array
    .iter()
    .map(parse_item)
    .filter(|item| item.as_ref().map_or(true, |i| i.score >= confidence))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(DetectResult::from(items))
}

impl Model for CommandModel {
  type Error = CommandModelError;

  fn infer(&self, image: &RgbImage, confidence: f32) -> Result<DetectResult, Self::Error> {
    let mut args = self.args.clone();
    args.push(self.conf_flag.clone());
    args.push(confidence.to_string());

    let frame = DynamicImage::ImageRgb8(image.clone());
    let output = match run_with_image(&self.program, &args, &frame, self.timeout) {
      Ok(output) => output,
      Err(ExternalCommandError::Timeout { .. }) => return Ok(DetectResult::default()),
      Err(e) => return Err(e.into()),
    };
    let result = parse_detections(&String::from_utf8_lossy(&output.stdout), confidence)?;
    debug!("检测到 {} 个车牌候选框", result.len());
    Ok(result)
  }
}
