// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/bin/plate_oneshot.rs - 单张图像的传统方法车牌识别
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

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use chepai::{
  FromUrl,
  config::ClassicalConfig,
  detector::ClassicalDetector,
  input::ImageFileInput,
  ocr::{CommandOcr, LineMode, OcrConsensus},
  output::DebugRotation,
};

/// 单张图像车牌识别参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像（image:///path.jpg）
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 主 OCR 引擎
  #[arg(long, value_name = "OCR")]
  pub primary_ocr: Url,
  /// 备用 OCR 引擎
  #[arg(long, value_name = "OCR")]
  pub fallback_ocr: Url,
  /// 输出目录，保存车牌图像与中间结果
  #[arg(long, value_name = "DIR")]
  pub output: Option<PathBuf>,
  /// OCR 调用时限（毫秒）
  #[arg(long, value_name = "MS")]
  pub timeout_ms: Option<u64>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("主 OCR 引擎: {}", args.primary_ocr);
  info!("备用 OCR 引擎: {}", args.fallback_ocr);

  let timeout = args.timeout_ms.map(Duration::from_millis);
  let primary = CommandOcr::from_url(&args.primary_ocr)?;
  let mut fallback = CommandOcr::from_url(&args.fallback_ocr)?;
  if !args.fallback_ocr.query_pairs().any(|(k, _)| k == "lines") {
    fallback = fallback.with_line_mode(LineMode::Join);
  }

  let primary_timeout = primary.timeout().or(timeout);
  let fallback_timeout = fallback.timeout().or(timeout);
  let reader = OcrConsensus::new(
    primary.with_timeout(primary_timeout),
    fallback.with_timeout(fallback_timeout),
  );

  let mut detector = ClassicalDetector::new(reader, ClassicalConfig::default());
  if let Some(output) = &args.output {
    detector = detector
      .with_output(output)
      .with_debug(DebugRotation::new(output, 1));
  }

  let input = ImageFileInput::from_url(&args.input)?;
  for frame in input {
    let frame = frame?;
    info!("开始识别...");
    let now = std::time::Instant::now();
    let plate = detector.detect_plate(&frame.image, 0)?;
    info!("识别完成，耗时: {:.2?}", now.elapsed());

    match plate {
      Some(plate) => println!("{}", plate),
      None => info!("未识别到车牌"),
    }
  }

  Ok(())
}
