// 该文件是 Tanzhen （探针） 项目的一部分。
// src/verify.rs - 检测结果校验
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

use thiserror::Error;

use crate::task::Received;

pub trait Verify {
  type Error;
  fn verify(&self, received: &Received) -> Result<(), Self::Error>;
}

/// 依次执行两个校验
impl<A, B, E> Verify for (A, B)
where
  A: Verify<Error = E>,
  B: Verify<Error = E>,
{
  type Error = E;

  fn verify(&self, received: &Received) -> Result<(), Self::Error> {
    self.0.verify(received)?;
    self.1.verify(received)
  }
}

mod compare;
mod ground_truth;
mod report;
mod tolerance;

pub use self::compare::{BackendsCompareCheck, DetectionCountCheck, GroundTruthCheck};
pub use self::ground_truth::{ExpectedDetection, GroundTruth};
pub use self::report::{Category, Mismatch, Report};
pub use self::tolerance::{Tolerance, within};

#[derive(Error, Debug)]
pub enum VerifyError {
  #[error("话题 {0} 没有收到消息")]
  MissingTopic(String),
  #[error("话题 {topic} 的检测结果少于 {min} 个")]
  NoDetections { topic: String, min: usize },
  #[error("话题 {topic} 的检测数量为 {actual}, 期望 {expected}")]
  CountMismatch {
    topic: String,
    expected: usize,
    actual: usize,
  },
  #[error("检测结果与期望不一致: {0}")]
  Mismatches(Report),
}
