// 该文件是 Tanzhen （探针） 项目的一部分。
// src/output.rs - 测试结果输出
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

use thiserror::Error;

mod record;
pub use self::record::record_ground_truth;

#[cfg(feature = "directory_report")]
mod report;
#[cfg(feature = "directory_report")]
pub use self::report::{ReportDirectory, ScenarioReport};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("话题 {0} 没有可记录的消息")]
  NothingToRecord(String),
  #[error("I/O 错误 {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("JSON 序列化错误: {0}")]
  Json(#[from] serde_json::Error),
}
