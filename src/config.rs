// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/config.rs - 流水线配置
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

pub const DEFAULT_DETECTION_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_FRAME_WINDOW: u32 = 5;
pub const DEFAULT_MODEL_CONFIDENCE: f32 = 0.10;
pub const DEFAULT_DEBUG_SLOTS: u32 = 5;

/// 检测队列已满时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
  /// 保留尚未取走的旧任务，丢弃新帧
  #[default]
  KeepPending,
  /// 用新帧替换尚未取走的旧任务
  KeepLatest,
}

/// 传统图像处理检测器的调参项
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicalConfig {
  /// 高斯模糊 sigma（约等于 5x5 核）
  pub blur_sigma: f32,
  /// 闭运算矩形核（宽, 高）
  pub close_kernel: (u32, u32),
  /// 候选区域面积范围（像素²）
  pub min_area: f32,
  pub max_area: f32,
  /// 长边/短边 比例范围
  pub min_aspect: f32,
  pub max_aspect: f32,
  /// 与水平方向的最大偏转角（度）
  pub max_rotation: f32,
  /// 候选区域平均亮度下限
  pub min_mean_intensity: f32,
  /// 车牌二值化阈值
  pub plate_threshold: u8,
}

impl Default for ClassicalConfig {
  fn default() -> Self {
    Self {
      blur_sigma: 1.1,
      close_kernel: (17, 3),
      min_area: 1063.62,
      max_area: 73862.5,
      min_aspect: 3.0,
      max_aspect: 6.0,
      max_rotation: 15.0,
      min_mean_intensity: 115.0,
      plate_threshold: 110,
    }
  }
}

impl ClassicalConfig {
  /// 面积与长宽比检查
  pub fn check_ratio(&self, area: f32, width: f32, height: f32) -> bool {
    if width <= 0.0 || height <= 0.0 {
      return false;
    }
    let ratio = if width >= height {
      width / height
    } else {
      height / width
    };
    (self.min_area..=self.max_area).contains(&area)
      && (self.min_aspect..=self.max_aspect).contains(&ratio)
  }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  /// 两次派发之间的最小间隔
  pub detection_interval: Duration,
  /// 帧编号循环窗口
  pub frame_window: u32,
  pub queue_policy: QueuePolicy,
  /// 模型检测的置信度下限
  pub model_confidence: f32,
  /// 外部模型/OCR 调用时限，`None` 表示不限时
  pub call_timeout: Option<Duration>,
  /// 输出根目录
  pub output_root: PathBuf,
  /// 是否保存中间结果与标注图像
  pub save_output: bool,
  /// 调试目录轮换数量
  pub debug_slots: u32,
  pub classical: ClassicalConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      detection_interval: DEFAULT_DETECTION_INTERVAL,
      frame_window: DEFAULT_FRAME_WINDOW,
      queue_policy: QueuePolicy::default(),
      model_confidence: DEFAULT_MODEL_CONFIDENCE,
      call_timeout: None,
      output_root: PathBuf::from("output"),
      save_output: false,
      debug_slots: DEFAULT_DEBUG_SLOTS,
      classical: ClassicalConfig::default(),
    }
  }
}

impl PipelineConfig {
  pub fn with_detection_interval(mut self, interval: Duration) -> Self {
    self.detection_interval = interval;
    self
  }

  pub fn with_frame_window(mut self, window: u32) -> Self {
    self.frame_window = window.max(1);
    self
  }

  pub fn with_queue_policy(mut self, policy: QueuePolicy) -> Self {
    self.queue_policy = policy;
    self
  }

  pub fn with_model_confidence(mut self, confidence: f32) -> Self {
    self.model_confidence = confidence;
    self
  }

  pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.call_timeout = timeout;
    self
  }

  pub fn with_output(mut self, root: Option<PathBuf>) -> Self {
    match root {
      Some(root) => {
        self.output_root = root;
        self.save_output = true;
      }
      None => self.save_output = false,
    }
    self
  }

  pub fn with_debug_slots(mut self, slots: u32) -> Self {
    self.debug_slots = slots.max(1);
    self
  }

  pub fn with_classical(mut self, classical: ClassicalConfig) -> Self {
    self.classical = classical;
    self
  }
}
