// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/ocr/consensus.rs - 主/备 OCR 引擎仲裁
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

use image::DynamicImage;
use tracing::{debug, warn};

use crate::ocr::{OcrEngine, OcrError, PlateReader};
use crate::plate::{is_ambiguous, is_valid_format, normalize};

/// 主引擎优先；仅当主引擎结果有歧义时才调用备用引擎。
///
/// 1. 主引擎返回 `None` 时直接返回 `None`，不调用备用引擎；空白文本仍按有歧义处理
/// 2. 主引擎结果纠正后无歧义则直接采用
/// 3. 备用引擎结果纠正后符合版式则采用备用结果
/// 4. 主引擎结果符合版式则作为最后选择
/// 5. 否则返回 `None`
pub struct OcrConsensus<P, F> {
  primary: P,
  fallback: F,
}

impl<P, F> OcrConsensus<P, F> {
  pub fn new(primary: P, fallback: F) -> Self {
    Self { primary, fallback }
  }

  pub fn primary(&self) -> &P {
    &self.primary
  }

  pub fn fallback(&self) -> &F {
    &self.fallback
  }
}

impl<P: OcrEngine, F: OcrEngine> OcrConsensus<P, F> {
  pub fn read(&self, image: &DynamicImage) -> Result<Option<String>, OcrError> {
    let Some(raw) = self.primary.read(image).map_err(OcrError::primary)? else {
      debug!("主 OCR 引擎未识别到文本");
      return Ok(None);
    };

    let primary_text = normalize(&raw);
    if !is_ambiguous(Some(&primary_text)) {
      debug!("主 OCR 引擎结果: {}", primary_text);
      return Ok(Some(primary_text));
    }

    debug!("主 OCR 引擎结果有歧义: {}, 调用备用引擎", primary_text);
    let fallback_raw = match self.fallback.read(image) {
      Ok(text) => text,
      Err(e) => {
        warn!("备用 OCR 引擎错误: {}", e);
        None
      }
    };

    if let Some(raw) = fallback_raw {
      let fallback_text = normalize(&raw);
      if is_valid_format(&fallback_text) {
        debug!("采用备用 OCR 引擎结果: {}", fallback_text);
        return Ok(Some(fallback_text));
      }
      debug!("备用 OCR 引擎结果不符合版式: {}", fallback_text);
    }

    if is_valid_format(&primary_text) {
      return Ok(Some(primary_text));
    }

    Ok(None)
  }
}

impl<P, F> PlateReader for OcrConsensus<P, F>
where
  P: OcrEngine + Send + Sync,
  F: OcrEngine + Send + Sync,
{
  fn read_plate(&self, image: &DynamicImage) -> Result<Option<String>, OcrError> {
    self.read(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ocr::mock::MockEngine;

  fn crop() -> DynamicImage {
    DynamicImage::new_luma8(120, 30)
  }

  #[test]
  fn no_primary_text_skips_fallback() {
    let consensus = OcrConsensus::new(
      MockEngine::replying(None),
      MockEngine::replying(Some("MH12AB1234")),
    );
    assert_eq!(consensus.read(&crop()).unwrap(), None);
    assert_eq!(consensus.primary().calls(), 1);
    assert_eq!(consensus.fallback().calls(), 0);
  }

  #[test]
  fn blank_primary_text_consults_fallback() {
    // 空白文本不同于未识别到文本，按有歧义处理
    let consensus = OcrConsensus::new(
      MockEngine::replying(Some("  ")),
      MockEngine::replying(Some("MH12AB1234")),
    );
    assert_eq!(consensus.read(&crop()).unwrap().as_deref(), Some("MH12AB1234"));
    assert_eq!(consensus.fallback().calls(), 1);

    let consensus = OcrConsensus::new(MockEngine::replying(Some("")), MockEngine::replying(None));
    assert_eq!(consensus.read(&crop()).unwrap(), None);
    assert_eq!(consensus.fallback().calls(), 1);
  }

  #[test]
  fn valid_primary_text_is_accepted_without_fallback() {
    let consensus = OcrConsensus::new(
      MockEngine::replying(Some("mh12ab1234")),
      MockEngine::replying(Some("KA1A1234")),
    );
    assert_eq!(consensus.read(&crop()).unwrap().as_deref(), Some("MH12AB1234"));
    assert_eq!(consensus.fallback().calls(), 0);
  }

  #[test]
  fn corrected_primary_text_is_accepted() {
    let consensus = OcrConsensus::new(
      MockEngine::replying(Some("MHI2AB1234")),
      MockEngine::replying(None),
    );
    assert_eq!(consensus.read(&crop()).unwrap().as_deref(), Some("MH12AB1234"));
    assert_eq!(consensus.fallback().calls(), 0);
  }

  #[test]
  fn valid_fallback_text_wins_over_ambiguous_primary() {
    let consensus = OcrConsensus::new(
      MockEngine::replying(Some("MH12")),
      MockEngine::replying(Some("ka 01 ab 1234")),
    );
    assert_eq!(consensus.read(&crop()).unwrap().as_deref(), Some("KA01AB1234"));
    assert_eq!(consensus.fallback().calls(), 1);
  }

  #[test]
  fn fallback_text_must_match_format() {
    // 长度在 [8, 11] 内但不符合版式
    let consensus = OcrConsensus::new(
      MockEngine::replying(Some("MH12")),
      MockEngine::replying(Some("MH12ABC12345")),
    );
    assert_eq!(consensus.read(&crop()).unwrap(), None);
    assert_eq!(consensus.fallback().calls(), 1);

    let consensus = OcrConsensus::new(
      MockEngine::replying(Some("MH12")),
      MockEngine::replying(Some("ABCDEFGHI")),
    );
    assert_eq!(consensus.read(&crop()).unwrap(), None);
  }

  #[test]
  fn ambiguous_primary_and_no_fallback_yields_none() {
    let consensus = OcrConsensus::new(
      MockEngine::replying(Some("XYZ")),
      MockEngine::replying(None),
    );
    assert_eq!(consensus.read(&crop()).unwrap(), None);
    assert_eq!(consensus.fallback().calls(), 1);
  }

  #[test]
  fn fallback_failure_is_contained() {
    let consensus = OcrConsensus::new(MockEngine::replying(Some("XYZ")), MockEngine::failing());
    assert_eq!(consensus.read(&crop()).unwrap(), None);
  }

  #[test]
  fn primary_failure_propagates() {
    let consensus = OcrConsensus::new(MockEngine::failing(), MockEngine::replying(None));
    assert!(matches!(
      consensus.read(&crop()),
      Err(OcrError::PrimaryEngine(_))
    ));
    assert_eq!(consensus.fallback().calls(), 0);
  }
}
