// 该文件是 Tanzhen （探针） 项目的一部分。
// src/output/record.rs - 记录真值
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

use std::path::Path;

use tracing::info;

use crate::{output::OutputError, task::Received, verify::GroundTruth};

/// 把话题上第一条消息写成 `expected.json`
pub fn record_ground_truth(
  received: &Received,
  topic: &str,
  path: &Path,
) -> Result<GroundTruth, OutputError> {
  let message = received
    .first(topic)
    .filter(|message| !message.is_empty())
    .ok_or_else(|| OutputError::NothingToRecord(topic.to_string()))?;
  let truth = GroundTruth::from_message(message);

  let text = serde_json::to_string_pretty(&truth)?;
  std::fs::write(path, text).map_err(|source| OutputError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  info!(
    "记录 {} 个检测结果到 {}",
    truth.detections.len(),
    path.display()
  );
  Ok(truth)
}
