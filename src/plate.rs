// 该文件是 Chepai （车牌识别） 项目的一部分。
// src/plate.rs - 车牌格式校验与文本纠正
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

//! # 车牌文本
//!
//! 目标车牌版式为 `2 位字母 + 1~2 位数字 + 1~2 位字母 + 4 位数字`，
//! 例如 `MH12AB1234`。
//!
//! - [`is_valid_format`]：结构校验
//! - [`is_ambiguous`]：是否需要备用 OCR 引擎复核
//! - [`normalize`]：大写、去除非字母数字字符，并按位置纠正易混字符

use tracing::debug;

/// 歧义判断使用的长度范围（含两端）
pub const PLATE_MIN_LEN: usize = 8;
pub const PLATE_MAX_LEN: usize = 11;

/// 应为数字的位置（从 0 开始）
const DIGIT_POSITIONS: [usize; 6] = [2, 3, 6, 7, 8, 9];

/// 字母 -> 数字 易混表
const LETTER_TO_DIGIT: [(char, char); 9] = [
  ('O', '0'),
  ('Q', '0'),
  ('D', '0'),
  ('G', '6'),
  ('I', '1'),
  ('L', '1'),
  ('Z', '2'),
  ('S', '5'),
  ('B', '8'),
];

/// 数字 -> 字母 易混表，每个数字只对应一个字母
const DIGIT_TO_LETTER: [(char, char); 6] = [
  ('0', 'O'),
  ('1', 'I'),
  ('2', 'Z'),
  ('5', 'S'),
  ('6', 'G'),
  ('8', 'B'),
];

fn lookup(table: &[(char, char)], ch: char) -> Option<char> {
  table
    .iter()
    .find_map(|&(from, to)| (from == ch).then_some(to))
}

#[derive(Clone, Copy)]
enum Class {
  Letter,
  Digit,
}

impl Class {
  fn matches(self, ch: char) -> bool {
    match self {
      Class::Letter => ch.is_ascii_uppercase(),
      Class::Digit => ch.is_ascii_digit(),
    }
  }
}

/// 版式：(字符类别, 最少个数, 最多个数)
const PLATE_LAYOUT: [(Class, usize, usize); 4] = [
  (Class::Letter, 2, 2),
  (Class::Digit, 1, 2),
  (Class::Letter, 1, 2),
  (Class::Digit, 4, 4),
];

fn match_layout(chars: &[char], layout: &[(Class, usize, usize)]) -> bool {
  let Some(&(class, min, max)) = layout.first() else {
    return chars.is_empty();
  };

  let run = chars.iter().take_while(|&&ch| class.matches(ch)).count();
  (min..=max.min(run))
    .rev()
    .any(|taken| match_layout(&chars[taken..], &layout[1..]))
}

/// 结构校验：`^[A-Z]{2}[0-9]{1,2}[A-Z]{1,2}[0-9]{4}$`
pub fn is_valid_format(text: &str) -> bool {
  let chars: Vec<char> = text.chars().collect();
  match_layout(&chars, &PLATE_LAYOUT)
}

/// 文本缺失、长度不在 `[8, 11]` 内，或结构校验失败时视为有歧义
pub fn is_ambiguous(text: Option<&str>) -> bool {
  let Some(text) = text else {
    return true;
  };

  let len = text.chars().count();
  if !(PLATE_MIN_LEN..=PLATE_MAX_LEN).contains(&len) {
    return true;
  }

  !is_valid_format(text)
}

/// 大写并去除 `[A-Z0-9]` 以外的所有字符
pub fn strip(text: &str) -> String {
  text
    .chars()
    .flat_map(char::to_uppercase)
    .filter(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())
    .collect()
}

/// 纠正 OCR 原始文本。
///
/// 去除无关字符后若已符合版式则原样返回；否则数字位置上的易混字母替换为数字，
/// 其余位置上的易混数字替换为字母。
pub fn normalize(text: &str) -> String {
  let stripped = strip(text);
  if is_valid_format(&stripped) {
    debug!("文本已符合版式: {}", stripped);
    return stripped;
  }

  let corrected: String = stripped
    .chars()
    .enumerate()
    .map(|(i, ch)| {
      let table: &[(char, char)] = if DIGIT_POSITIONS.contains(&i) {
        &LETTER_TO_DIGIT
      } else {
        &DIGIT_TO_LETTER
      };
      lookup(table, ch).unwrap_or(ch)
    })
    .collect();

  debug!("纠正前: {}, 纠正后: {}", stripped, corrected);
  corrected
}
