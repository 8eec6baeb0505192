// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/main.rs - 项目主程序
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

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use chepai::{
  FromUrl,
  aggregate::{JsonLinesReport, LogReport},
  config::{
    DEFAULT_DEBUG_SLOTS, DEFAULT_FRAME_WINDOW, DEFAULT_MODEL_CONFIDENCE, PipelineConfig,
    QueuePolicy,
  },
  detector::{ClassicalDetector, ModelDetector},
  input::InputWrapper,
  model::CommandModel,
  ocr::{CommandOcr, LineMode, OcrConsensus},
  output::{AnnotationTarget, DebugRotation, draw::Draw},
  pipeline::Pipeline,
  task::{CaptureTask, install_interrupt_handler},
};

/// Chepai 车牌识别参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 车牌检测模型（如 cmd:///opt/anpr/detect?arg=--weights&arg=best.pt）
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 主 OCR 引擎
  #[arg(long, value_name = "OCR")]
  pub primary_ocr: Url,
  /// 备用 OCR 引擎
  #[arg(long, value_name = "OCR")]
  pub fallback_ocr: Url,
  /// 输入来源（image:///path.jpg 或 folder:///dir?loop）
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出根目录；指定后保存标注图像、车牌图像与中间结果
  #[arg(long, value_name = "DIR")]
  pub output: Option<PathBuf>,
  /// 标注图像保存位置（image:///out.jpg 或 folder:///dir），默认按帧编号保存在输出根目录
  #[arg(long, value_name = "TARGET")]
  pub annotation: Option<Url>,
  /// 标注文字所用的 TTF 字体
  #[cfg(feature = "label_font")]
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 识别结果以 JSON 行格式追加写入该文件
  #[arg(long, value_name = "FILE")]
  pub report: Option<PathBuf>,

  /// 两次检测之间的最小间隔（毫秒）
  #[arg(long, default_value = "500", value_name = "MS")]
  pub interval_ms: u64,
  /// 帧编号循环窗口
  #[arg(long, default_value_t = DEFAULT_FRAME_WINDOW, value_name = "N")]
  pub frame_window: u32,
  /// 检测模型置信度下限
  #[arg(long, default_value_t = DEFAULT_MODEL_CONFIDENCE, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// 检测器繁忙时用新帧替换待处理的旧帧
  #[arg(long)]
  pub keep_latest: bool,
  /// 外部模型/OCR 调用时限（毫秒），可被 URL 中的 timeout_ms 覆盖
  #[arg(long, value_name = "MS")]
  pub timeout_ms: Option<u64>,
  /// 中间结果目录轮换数量
  #[arg(long, default_value_t = DEFAULT_DEBUG_SLOTS, value_name = "N")]
  pub debug_slots: u32,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// 读取输入的间隔（毫秒），用于模拟相机帧率
  #[arg(long, value_name = "MS")]
  pub frame_interval_ms: Option<u64>,
}

impl Args {
  fn config(&self) -> PipelineConfig {
    let policy = if self.keep_latest {
      QueuePolicy::KeepLatest
    } else {
      QueuePolicy::KeepPending
    };

    PipelineConfig::default()
      .with_detection_interval(Duration::from_millis(self.interval_ms))
      .with_frame_window(self.frame_window)
      .with_queue_policy(policy)
      .with_model_confidence(self.confidence)
      .with_call_timeout(self.timeout_ms.map(Duration::from_millis))
      .with_output(self.output.clone())
      .with_debug_slots(self.debug_slots)
  }

  fn draw(&self) -> Result<Draw> {
    #[cfg(feature = "label_font")]
    {
      if let Some(font) = &self.font {
        return Ok(Draw::default().with_font_file(font)?);
      }
    }
    Ok(Draw::default())
  }
}

fn ocr_engine(url: &Url, default_lines: LineMode, config: &PipelineConfig) -> Result<CommandOcr> {
  let mut engine =
    CommandOcr::from_url(url).with_context(|| format!("无法创建 OCR 引擎: {}", url))?;
  if !url.query_pairs().any(|(k, _)| k == "lines") {
    engine = engine.with_line_mode(default_lines);
  }
  let timeout = engine.timeout().or(config.call_timeout);
  Ok(engine.with_timeout(timeout))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let config = args.config();

  info!("检测模型: {}", args.model);
  info!("主 OCR 引擎: {}", args.primary_ocr);
  info!("备用 OCR 引擎: {}", args.fallback_ocr);
  info!("输入来源: {}", args.input);
  if config.save_output {
    info!("输出目录: {}", config.output_root.display());
  }

  let model = CommandModel::from_url(&args.model).context("无法创建检测模型")?;
  let timeout = model.timeout().or(config.call_timeout);
  let model = model.with_timeout(timeout);

  let reader = Arc::new(OcrConsensus::new(
    ocr_engine(&args.primary_ocr, LineMode::First, &config)?,
    ocr_engine(&args.fallback_ocr, LineMode::Join, &config)?,
  ));

  let mut model_detector = ModelDetector::new(model, Arc::clone(&reader))
    .with_confidence(config.model_confidence)
    .with_draw(args.draw()?);
  let mut classical_detector = ClassicalDetector::new(reader, config.classical.clone());

  if let Some(target) = &args.annotation {
    model_detector = model_detector.with_annotation(AnnotationTarget::from_url(target)?);
  } else if config.save_output {
    model_detector =
      model_detector.with_annotation(AnnotationTarget::per_frame(&config.output_root));
  }
  if config.save_output {
    classical_detector = classical_detector
      .with_output(&config.output_root)
      .with_debug(DebugRotation::new(&config.output_root, config.debug_slots));
  }

  let json = match &args.report {
    Some(path) => {
      let file = File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("无法打开结果文件: {}", path.display()))?;
      Some(JsonLinesReport::new(BufWriter::new(file)))
    }
    None => None,
  };

  let input = InputWrapper::from_url(&args.input)?;
  let pipeline = Pipeline::with_detectors(
    &config,
    model_detector,
    classical_detector,
    (LogReport, json),
  )?;

  let captured = CaptureTask::default()
    .with_frame_number(args.frame_number)
    .with_frame_interval(args.frame_interval_ms.map(Duration::from_millis))
    .with_interrupt(install_interrupt_handler()?)
    .run(input, pipeline.dispatcher());

  let aggregated = pipeline.shutdown()?;
  let summary = captured?;

  info!(
    "任务完成：读取 {} 帧，分发 {} 帧，识别结果 {} 条",
    summary.frames, summary.dispatched, aggregated.reported
  );

  Ok(())
}
