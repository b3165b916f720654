// 该文件是 Tanzhen （探针） 项目的一部分。
// src/verify/report.rs - 校验失败汇总
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

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
  Identity,
  Center,
  Corners,
  Translation,
  Orientation,
}

impl Category {
  pub fn describe(&self) -> &'static str {
    match self {
      Category::Identity => "标签身份不一致",
      Category::Center => "中心点检测不准确",
      Category::Corners => "角点检测不准确",
      Category::Translation => "平移不一致",
      Category::Orientation => "旋转不一致",
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.describe())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mismatch {
  pub topic: String,
  /// 检测结果在消息中的下标
  pub index: usize,
  pub id: i32,
  pub category: Category,
  pub field: String,
  pub actual: String,
  pub expected: String,
  /// 身份比较没有容限
  pub delta: Option<f64>,
}

impl fmt::Display for Mismatch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}[{}] id={} {}: {} 实际 {}, 期望 {}",
      self.topic, self.index, self.id, self.category, self.field, self.actual, self.expected
    )?;
    if let Some(delta) = self.delta {
      write!(f, " (容限 {})", delta)?;
    }
    Ok(())
  }
}

/// 一次校验中收集到的全部不一致项
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
  pub mismatches: Vec<Mismatch>,
}

impl Report {
  pub fn is_empty(&self) -> bool {
    self.mismatches.is_empty()
  }

  pub fn len(&self) -> usize {
    self.mismatches.len()
  }

  pub fn push(&mut self, mismatch: Mismatch) {
    self.mismatches.push(mismatch);
  }

  pub fn count(&self, category: Category) -> usize {
    self
      .mismatches
      .iter()
      .filter(|mismatch| mismatch.category == category)
      .count()
  }
}

impl fmt::Display for Report {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} 项不一致", self.mismatches.len())?;
    for mismatch in &self.mismatches {
      write!(f, "\n  {}", mismatch)?;
    }
    Ok(())
  }
}
