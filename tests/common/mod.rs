// 该文件是 Tanzhen （探针） 项目的一部分。
// tests/common/mod.rs - 集成测试公共部分
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

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use tanzhen::{
  input::Fixture,
  task::RetryPublishTask,
  transport::{Bus, Namespace},
};

pub fn init_logging() {
  let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn test_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn apriltag0() -> Fixture {
  Fixture::load(test_root().join("test_cases").join("apriltag0")).unwrap()
}

pub fn namespace(token: &str) -> Namespace {
  Namespace::unique(&[token]).unwrap()
}

/// 测试中缩短超时，避免失败时等满 20 秒
pub fn task(namespace: &Namespace) -> RetryPublishTask {
  RetryPublishTask::default()
    .with_namespace(namespace.clone())
    .with_timeout(Duration::from_secs(10))
}

pub fn topics_under(bus: &Bus, namespace: &Namespace) -> Vec<String> {
  bus
    .topic_names()
    .into_iter()
    .filter(|topic| topic.starts_with(namespace.as_str()))
    .collect()
}
