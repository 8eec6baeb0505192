// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/output/draw.rs - 车牌检测结果可视化
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

#[cfg(feature = "label_font")]
use std::path::Path;

#[cfg(feature = "label_font")]
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
#[cfg(feature = "label_font")]
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::frame::BoundingBox;
#[cfg(feature = "label_font")]
use crate::output::OutputError;

// 文本渲染常量
#[cfg(feature = "label_font")]
const LABEL_FONT_SIZE: f32 = 20.0;
#[cfg(feature = "label_font")]
const LABEL_TEXT_HEIGHT: i32 = 24;
#[cfg(feature = "label_font")]
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const BOX_THICKNESS: i32 = 2;

/// 在整帧图像上标出车牌位置与识别文本
pub struct Draw {
  #[cfg(feature = "label_font")]
  font: Option<FontArc>,
  box_color: Rgb<u8>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      #[cfg(feature = "label_font")]
      font: None,
      box_color: Rgb(BOX_COLOR),
    }
  }
}

impl Draw {
  /// 运行时加载字体；未加载字体时只绘制边框
  #[cfg(feature = "label_font")]
  pub fn with_font_file(mut self, path: &Path) -> Result<Self, OutputError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data).map_err(|e| OutputError::FontError(e.to_string()))?;
    self.font = Some(font);
    Ok(self)
  }

  pub fn with_box_color(mut self, color: [u8; 3]) -> Self {
    self.box_color = Rgb(color);
    self
  }

  fn draw_box(&self, image: &mut RgbImage, bbox: &BoundingBox) {
    let rect = bbox.clamp_to(image.width(), image.height());
    if rect.is_empty() {
      return;
    }

    // 加粗为两像素
    for thickness in 0..BOX_THICKNESS {
      let width = rect.width as i32 - 2 * thickness;
      let height = rect.height as i32 - 2 * thickness;
      if width <= 0 || height <= 0 {
        break;
      }
      let r = Rect::at(rect.x as i32 + thickness, rect.y as i32 + thickness)
        .of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, r, self.box_color);
    }
  }

  #[cfg(feature = "label_font")]
  fn draw_label(&self, image: &mut RgbImage, bbox: &BoundingBox, text: &str) {
    let Some(font) = &self.font else {
      return;
    };

    // 标签放在边框上方，空间不足时贴着图像顶部
    let text_width = (text.chars().count() as f32 * LABEL_CHAR_WIDTH) as i32;
    let label_x = bbox.x as i32;
    let label_y = (bbox.y as i32 - LABEL_TEXT_HEIGHT).max(0);
    let label_width = text_width.min(image.width() as i32 - label_x).max(0) as u32;

    if label_width == 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width, LABEL_TEXT_HEIGHT as u32);
    draw_filled_rect_mut(image, rect, self.box_color);
    draw_text_mut(
      image,
      Rgb([0u8, 0u8, 0u8]),
      label_x,
      label_y + 2,
      PxScale::from(LABEL_FONT_SIZE),
      font,
      text,
    );
  }

  /// 绘制一个车牌框，`text` 为空时不绘制标签
  pub fn draw_plate(&self, image: &mut RgbImage, bbox: &BoundingBox, text: Option<&str>) {
    self.draw_box(image, bbox);

    #[cfg(feature = "label_font")]
    {
      if let Some(text) = text {
        self.draw_label(image, bbox, text);
      }
    }
    #[cfg(not(feature = "label_font"))]
    let _ = text;
  }
}
