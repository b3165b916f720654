// 该文件是 Tanzhen （探针） 项目的一部分。
// src/verify/tolerance.rs - 误差容限
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

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
  /// 像素
  pub pixel: f64,
  /// 米
  pub translation: f64,
  /// 四元数各分量
  pub quaternion: f64,
}

impl Default for Tolerance {
  fn default() -> Self {
    Tolerance {
      pixel: 2.0,
      translation: 0.01,
      quaternion: 0.01,
    }
  }
}

/// `|actual - expected| <= delta`，任一值为 NaN 时不成立
pub fn within(actual: f64, expected: f64, delta: f64) -> bool {
  (actual - expected).abs() <= delta
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn check_is_symmetric_and_inclusive() {
    assert!(within(928.0, 926.0, 2.0));
    assert!(within(924.0, 926.0, 2.0));
    assert!(!within(928.5, 926.0, 2.0));
    assert!(!within(923.5, 926.0, 2.0));
    assert_eq!(within(0.3, 0.29, 0.01), within(0.29, 0.3, 0.01));
  }

  #[test]
  fn nan_never_passes() {
    assert!(!within(f64::NAN, 0.0, 1.0));
    assert!(!within(0.0, 0.0, f64::NAN));
  }
}
