// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/detector/classical.rs - 传统图像处理车牌检测
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

//! 不依赖模型的车牌搜索：
//!
//! 模糊 → 灰度 → 水平 Sobel → Otsu 二值化 → 宽矩形核闭运算 → 外轮廓 →
//! 最小外接矩形的角度/面积/比例筛选 → 亮度筛选 → 车牌二值化与裁边 → OCR。
//! 按轮廓发现顺序处理，第一个识别成功的候选即为结果。

use std::path::PathBuf;

use image::{DynamicImage, GrayImage, Luma, RgbImage, imageops};
use imageproc::contours::{Contour, find_contours};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::min_area_rect;
use imageproc::gradients::horizontal_sobel;
use imageproc::point::Point;
use tracing::{debug, info, warn};

use crate::config::ClassicalConfig;
use crate::detector::{DetectError, Detector};
use crate::frame::{BoundingBox, DetectionTask, FrameId};
use crate::ocr::PlateReader;
use crate::output::{DebugDump, DebugRotation, save_image};
use crate::worker::DetectionResult;

pub struct ClassicalDetector<R> {
  reader: R,
  config: ClassicalConfig,
  output_root: Option<PathBuf>,
  debug: Option<DebugRotation>,
}

impl<R: PlateReader> ClassicalDetector<R> {
  pub fn new(reader: R, config: ClassicalConfig) -> Self {
    Self {
      reader,
      config,
      output_root: None,
      debug: None,
    }
  }

  /// 识别成功时将车牌图像保存为 `{root}/anpr_ip_{frame_id}_plate.jpg`
  pub fn with_output(mut self, root: impl Into<PathBuf>) -> Self {
    self.output_root = Some(root.into());
    self
  }

  /// 保存各阶段中间结果
  pub fn with_debug(mut self, rotation: DebugRotation) -> Self {
    self.debug = Some(rotation);
    self
  }

  pub fn config(&self) -> &ClassicalConfig {
    &self.config
  }

  /// 在整帧中搜索车牌，返回第一个识别成功的文本
  pub fn detect_plate(
    &mut self,
    frame: &RgbImage,
    frame_id: FrameId,
  ) -> Result<Option<String>, DetectError> {
    let dump = self.debug.as_mut().map(DebugRotation::next_dump);
    let dump = dump.as_ref();

    let morph = preprocess(frame, &self.config, dump);
    let contours = find_contours::<i32>(&morph);
    debug!("闭运算后共 {} 个轮廓", contours.len());

    for contour in contours.iter().filter(|c| c.parent.is_none()) {
      let Some(bbox) = candidate_box(contour, &self.config) else {
        continue;
      };

      let candidate = bbox.crop(frame);
      let brightness = mean_intensity(candidate.as_raw());
      if brightness < self.config.min_mean_intensity {
        debug!("候选区域 {:?} 亮度 {:.1} 过低", bbox, brightness);
        continue;
      }

      let Some(plate) = clean_plate(&candidate, &self.config, dump) else {
        debug!("候选区域 {:?} 裁边后不符合车牌比例", bbox);
        continue;
      };

      let text = self
        .reader
        .read_plate(&DynamicImage::ImageLuma8(plate.clone()))?;
      let Some(text) = text.filter(|t| !t.is_empty()) else {
        continue;
      };

      info!("候选区域 {:?} 识别为 {}", bbox, text);
      if let Some(root) = &self.output_root {
        let path = root.join(format!("anpr_ip_{}_plate.jpg", frame_id));
        if let Err(e) = save_image(&path, &plate) {
          warn!("保存车牌图像 {} 失败: {}", path.display(), e);
        }
      }
      return Ok(Some(text));
    }

    Ok(None)
  }
}

impl<R: PlateReader> Detector for ClassicalDetector<R> {
  const NAME: &'static str = "CLASSICAL";

  fn detect(&mut self, task: &DetectionTask) -> Result<DetectionResult, DetectError> {
    let plate = self.detect_plate(&task.frame, task.frame_id)?;
    Ok(DetectionResult::Classical {
      frame_id: task.frame_id,
      plate,
    })
  }
}

/// 第一阶段：得到闭运算后的二值边缘图
fn preprocess(frame: &RgbImage, config: &ClassicalConfig, dump: Option<&DebugDump>) -> GrayImage {
  let blur = gaussian_blur_f32(frame, config.blur_sigma);
  let gray = imageops::grayscale(&blur);

  // 负梯度截断为 0，只保留由暗到亮的竖直边缘
  let gradient = horizontal_sobel(&gray);
  let sobel = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
    Luma([gradient.get_pixel(x, y)[0].clamp(0, 255) as u8])
  });

  let binary = if sobel.as_raw().iter().any(|&v| v > 0) {
    threshold(&sobel, otsu_level(&sobel), ThresholdType::Binary)
  } else {
    GrayImage::new(sobel.width(), sobel.height())
  };

  let (kernel_w, kernel_h) = config.close_kernel;
  let morph = close_rect(&binary, kernel_w, kernel_h);

  if let Some(dump) = dump {
    dump.save("01_blur", &blur);
    dump.save("02_gray", &gray);
    dump.save("03_sobel", &sobel);
    dump.save("04_binary", &binary);
    dump.save("05_morph", &morph);
  }

  morph
}

/// 外轮廓的最小外接矩形通过角度与比例检查时，返回其轴对齐包围盒
fn candidate_box(contour: &Contour<i32>, config: &ClassicalConfig) -> Option<BoundingBox> {
  let bbox = bounding_rect(&contour.points)?;

  // 最小外接矩形面积不会超过包围盒面积
  if contour.points.len() < 3
    || bbox.width < 2
    || bbox.height < 2
    || (bbox.area() as f32) < config.min_area
  {
    return None;
  }

  let corners = min_area_rect(&contour.points);
  let (width, height, rotation) = rect_geometry(&corners);
  if rotation > config.max_rotation {
    debug!("候选区域 {:?} 偏转 {:.1}° 过大", bbox, rotation);
    return None;
  }

  if !config.check_ratio(width * height, width, height) {
    return None;
  }

  Some(bbox)
}

/// 第二阶段：车牌区域二值化，并以最大轮廓裁去边缘
fn clean_plate(
  candidate: &RgbImage,
  config: &ClassicalConfig,
  dump: Option<&DebugDump>,
) -> Option<GrayImage> {
  let gray = imageops::grayscale(candidate);
  let thresh = threshold(&gray, config.plate_threshold, ThresholdType::Binary);
  if let Some(dump) = dump {
    dump.save("06_plate_thresh", &thresh);
  }

  let contours = find_contours::<i32>(&thresh);
  let largest = contours
    .iter()
    .filter(|c| c.parent.is_none())
    .map(|c| (contour_area(&c.points), c))
    .max_by(|a, b| a.0.total_cmp(&b.0))?;

  let (area, contour) = largest;
  let bbox = bounding_rect(&contour.points)?;
  if !config.check_ratio(area, bbox.width as f32, bbox.height as f32) {
    return None;
  }

  Some(bbox.crop(&thresh))
}

/// 矩形结构元素的闭运算（先膨胀后腐蚀），锚点位于核中心，越界像素不参与计算
pub(crate) fn close_rect(image: &GrayImage, kernel_w: u32, kernel_h: u32) -> GrayImage {
  let dilated = rect_filter(image, kernel_w, kernel_h, u8::max);
  rect_filter(&dilated, kernel_w, kernel_h, u8::min)
}

fn rect_filter(image: &GrayImage, kernel_w: u32, kernel_h: u32, pick: fn(u8, u8) -> u8) -> GrayImage {
  // 矩形核可分离：先水平再竖直
  let (w, h) = image.dimensions();
  let horizontal = line_filter(image, kernel_w, pick, |x, y| (x, y), (w, h));
  line_filter(&horizontal, kernel_h, pick, |y, x| (x, y), (h, w))
}

/// 沿一个方向做一维窗口运算；`at(i, j)` 把沿线坐标 `i` 与垂直坐标 `j` 映射为像素坐标，
/// `extent` 为 (沿线长度, 垂直长度)
fn line_filter(
  image: &GrayImage,
  kernel: u32,
  pick: fn(u8, u8) -> u8,
  at: impl Fn(u32, u32) -> (u32, u32),
  extent: (u32, u32),
) -> GrayImage {
  let kernel = kernel.max(1) as i64;
  let anchor = kernel / 2;
  let mut out = image.clone();
  let (length, across) = extent;

  for j in 0..across {
    for i in 0..length {
      let start = (i as i64 - anchor).max(0);
      let end = (i as i64 - anchor + kernel - 1).min(length as i64 - 1);
      let (x, y) = at(start as u32, j);
      let mut value = image.get_pixel(x, y)[0];
      for k in start + 1..=end {
        let (x, y) = at(k as u32, j);
        value = pick(value, image.get_pixel(x, y)[0]);
      }
      let (x, y) = at(i, j);
      out.put_pixel(x, y, Luma([value]));
    }
  }

  out
}

fn bounding_rect(points: &[Point<i32>]) -> Option<BoundingBox> {
  let min_x = points.iter().map(|p| p.x).min()?;
  let max_x = points.iter().map(|p| p.x).max()?;
  let min_y = points.iter().map(|p| p.y).min()?;
  let max_y = points.iter().map(|p| p.y).max()?;

  Some(BoundingBox::new(
    min_x.max(0) as u32,
    min_y.max(0) as u32,
    (max_x - min_x + 1) as u32,
    (max_y - min_y + 1) as u32,
  ))
}

/// 鞋带公式求轮廓围成的面积
pub(crate) fn contour_area(points: &[Point<i32>]) -> f32 {
  if points.len() < 3 {
    return 0.0;
  }
  let twice: i64 = points
    .iter()
    .zip(points.iter().cycle().skip(1))
    .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
    .sum();
  (twice.abs() as f32) / 2.0
}

/// 返回旋转矩形的 (宽, 高, 长边与水平方向夹角)，夹角范围 [0°, 90°]
pub(crate) fn rect_geometry(corners: &[Point<i32>; 4]) -> (f32, f32, f32) {
  let edge = |a: &Point<i32>, b: &Point<i32>| ((b.x - a.x) as f32, (b.y - a.y) as f32);
  let (ax, ay) = edge(&corners[0], &corners[1]);
  let (bx, by) = edge(&corners[1], &corners[2]);
  let len_a = ax.hypot(ay);
  let len_b = bx.hypot(by);

  let (lx, ly) = if len_a >= len_b { (ax, ay) } else { (bx, by) };
  let mut angle = ly.atan2(lx).to_degrees().abs();
  if angle > 90.0 {
    angle = 180.0 - angle;
  }

  (len_a.max(len_b), len_a.min(len_b), angle)
}

fn mean_intensity(raw: &[u8]) -> f32 {
  if raw.is_empty() {
    return 0.0;
  }
  let sum: u64 = raw.iter().map(|&v| v as u64).sum();
  sum as f32 / raw.len() as f32
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use image::Rgb;

  use super::*;
  use crate::detector::mock::{CountingReader, ScriptedReader};

  /// 在 `top` 行处画一块浅色车牌，内有等间距的深色竖条充当字符笔画
  fn draw_plate(frame: &mut RgbImage, top: u32) {
    for y in top..top + 40 {
      for x in 100..260 {
        frame.put_pixel(x, y, Rgb([200, 200, 200]));
      }
    }
    for bar in (108..=248).step_by(12) {
      for y in top + 4..top + 36 {
        for x in bar..bar + 4 {
          frame.put_pixel(x, y, Rgb([20, 20, 20]));
        }
      }
    }
  }

  /// 暗背景上的一块车牌
  fn synthetic_plate_frame() -> RgbImage {
    let mut frame = RgbImage::from_pixel(400, 300, Rgb([30, 30, 30]));
    draw_plate(&mut frame, 100);
    frame
  }

  /// 上下两块互不相连的车牌
  fn two_plate_frame() -> RgbImage {
    let mut frame = RgbImage::from_pixel(400, 300, Rgb([30, 30, 30]));
    draw_plate(&mut frame, 60);
    draw_plate(&mut frame, 200);
    frame
  }

  #[test]
  fn single_plate_region_yields_one_ocr_call() {
    let reader = Arc::new(CountingReader::new(Some("MH12AB1234")));
    let mut detector = ClassicalDetector::new(Arc::clone(&reader), ClassicalConfig::default());

    let text = detector.detect_plate(&synthetic_plate_frame(), 0).unwrap();
    assert_eq!(text.as_deref(), Some("MH12AB1234"));
    assert_eq!(reader.calls(), 1);
  }

  #[test]
  fn uniform_frame_yields_no_ocr_call() {
    let reader = Arc::new(CountingReader::new(Some("MH12AB1234")));
    let mut detector = ClassicalDetector::new(Arc::clone(&reader), ClassicalConfig::default());

    let frame = RgbImage::from_pixel(400, 300, Rgb([128, 128, 128]));
    assert!(detector.detect_plate(&frame, 0).unwrap().is_none());
    assert_eq!(reader.calls(), 0);
  }

  #[test]
  fn unread_candidate_gives_none() {
    let reader = Arc::new(CountingReader::new(None));
    let mut detector = ClassicalDetector::new(Arc::clone(&reader), ClassicalConfig::default());

    assert!(detector.detect_plate(&synthetic_plate_frame(), 0).unwrap().is_none());
    assert_eq!(reader.calls(), 1);
  }

  #[test]
  fn unread_candidate_is_skipped_until_a_later_one_reads() {
    let reader = Arc::new(ScriptedReader::new(&[None, Some("KA01AB1234")]));
    let mut detector = ClassicalDetector::new(Arc::clone(&reader), ClassicalConfig::default());

    let text = detector.detect_plate(&two_plate_frame(), 0).unwrap();
    assert_eq!(text.as_deref(), Some("KA01AB1234"));
    assert_eq!(reader.calls(), 2);
  }

  #[test]
  fn search_stops_at_first_read_plate() {
    let reader = Arc::new(ScriptedReader::new(&[
      Some("MH12AB1234"),
      Some("KA01AB1234"),
    ]));
    let mut detector = ClassicalDetector::new(Arc::clone(&reader), ClassicalConfig::default());

    let text = detector.detect_plate(&two_plate_frame(), 0).unwrap();
    assert_eq!(text.as_deref(), Some("MH12AB1234"));
    assert_eq!(reader.calls(), 1);
  }

  #[test]
  fn two_unread_candidates_give_none() {
    let reader = Arc::new(ScriptedReader::new(&[None, None]));
    let mut detector = ClassicalDetector::new(Arc::clone(&reader), ClassicalConfig::default());

    assert!(detector.detect_plate(&two_plate_frame(), 0).unwrap().is_none());
    assert_eq!(reader.calls(), 2);
  }

  #[test]
  fn dark_candidate_is_rejected_before_ocr() {
    let reader = Arc::new(CountingReader::new(Some("MH12AB1234")));
    let config = ClassicalConfig {
      min_mean_intensity: 250.0,
      ..ClassicalConfig::default()
    };
    let mut detector = ClassicalDetector::new(Arc::clone(&reader), config);

    assert!(detector.detect_plate(&synthetic_plate_frame(), 0).unwrap().is_none());
    assert_eq!(reader.calls(), 0);
  }

  #[test]
  fn writes_plate_and_debug_images() {
    let root = tempfile::tempdir().unwrap();
    let reader = CountingReader::new(Some("MH12AB1234"));
    let mut detector = ClassicalDetector::new(reader, ClassicalConfig::default())
      .with_output(root.path())
      .with_debug(DebugRotation::new(root.path(), 5));

    let task = DetectionTask::new(synthetic_plate_frame(), 3);
    let result = detector.detect(&task).unwrap();
    assert!(matches!(
      result,
      DetectionResult::Classical { frame_id: 3, plate: Some(ref p) } if p == "MH12AB1234"
    ));

    assert!(root.path().join("anpr_ip_3_plate.jpg").exists());
    for stage in ["01_blur", "02_gray", "03_sobel", "04_binary", "05_morph", "06_plate_thresh"] {
      assert!(root.path().join("ip1").join(format!("{}.png", stage)).exists());
    }
  }

  #[test]
  fn close_bridges_horizontal_gaps_only() {
    let mut image = GrayImage::new(40, 9);
    for x in [10u32, 22] {
      for y in 2..7 {
        image.put_pixel(x, y, Luma([255]));
      }
    }
    let closed = close_rect(&image, 17, 3);
    // 12 像素的水平间隙被连通
    assert!((10..=22).all(|x| closed.get_pixel(x, 4)[0] == 255));
    // 两端不向外扩张
    assert_eq!(closed.get_pixel(9, 4)[0], 0);
    assert_eq!(closed.get_pixel(23, 4)[0], 0);
    assert_eq!(closed.get_pixel(16, 0)[0], 0);
  }

  #[test]
  fn geometry_of_axis_aligned_and_rotated_rects() {
    let flat = [
      Point::new(0, 0),
      Point::new(100, 0),
      Point::new(100, 25),
      Point::new(0, 25),
    ];
    let (w, h, angle) = rect_geometry(&flat);
    assert_eq!((w, h), (100.0, 25.0));
    assert!(angle.abs() < 1e-3);

    let upright = [
      Point::new(0, 0),
      Point::new(25, 0),
      Point::new(25, 100),
      Point::new(0, 100),
    ];
    let (_, _, angle) = rect_geometry(&upright);
    assert!((angle - 90.0).abs() < 1e-3);

    assert_eq!(contour_area(&flat), 2500.0);
  }
}
