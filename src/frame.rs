// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/frame.rs - 帧、检测任务与边界框定义
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

use image::{GenericImageView, ImageBuffer, Pixel, RgbImage};

/// 帧编号，在 `[0, frame_window)` 内循环，不保证整个会话唯一
pub type FrameId = u32;

/// 一次相机采集
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 采集序号（来自输入源，单调递增）
  pub index: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64) -> Self {
    Self { image, index }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 排队等待某一检测器处理的帧副本
#[derive(Debug, Clone)]
pub struct DetectionTask {
  pub frame: RgbImage,
  pub frame_id: FrameId,
}

impl DetectionTask {
  pub fn new(frame: RgbImage, frame_id: FrameId) -> Self {
    Self { frame, frame_id }
  }
}

/// 像素坐标下的轴对齐矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl BoundingBox {
  pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 由 `[x_min, y_min, x_max, y_max]` 浮点坐标构建，并裁剪到图像范围内。
  /// 裁剪后面积为零时返回 `None`。
  pub fn from_xyxy(xyxy: [f32; 4], image_width: u32, image_height: u32) -> Option<Self> {
    let w = image_width as f32;
    let h = image_height as f32;
    let x_min = xyxy[0].floor().clamp(0.0, w);
    let y_min = xyxy[1].floor().clamp(0.0, h);
    let x_max = xyxy[2].ceil().clamp(0.0, w);
    let y_max = xyxy[3].ceil().clamp(0.0, h);

    if x_max <= x_min || y_max <= y_min {
      return None;
    }

    Some(Self {
      x: x_min as u32,
      y: y_min as u32,
      width: (x_max - x_min) as u32,
      height: (y_max - y_min) as u32,
    })
  }

  pub fn area(&self) -> u64 {
    self.width as u64 * self.height as u64
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  /// 与图像范围求交
  pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Self {
    let x = self.x.min(image_width);
    let y = self.y.min(image_height);
    let width = self.width.min(image_width - x);
    let height = self.height.min(image_height - y);
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 从图像中裁剪出该区域的独立副本
  pub fn crop<I, P>(&self, image: &I) -> ImageBuffer<P, Vec<P::Subpixel>>
  where
    I: GenericImageView<Pixel = P> + 'static,
    P: Pixel,
  {
    let (w, h) = image.dimensions();
    let rect = self.clamp_to(w, h);
    image::imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
  }
}
