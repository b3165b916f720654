// 该文件是 Tanzhen （探针） 项目的一部分。
// src/bin/apriltag_record.rs - 记录测试用例的期望输出
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
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use tanzhen::{
  FromUrl,
  container::launch_apriltag,
  input::{Fixture, GROUND_TRUTH_FILE},
  model::DetectorConfig,
  output::record_ground_truth,
  task::{RetryPublishTask, Task},
  transport::{Bus, Namespace},
  verify::DetectionCountCheck,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 测试用例目录，包含 image.json 与 camera_info.json
  #[arg(long, value_name = "DIR")]
  pub case: PathBuf,

  #[arg(long, value_name = "DETECTOR", default_value = "apriltag://?size=0.22&backends=CPU")]
  pub detector: Url,

  #[arg(long, value_name = "SECONDS", default_value_t = 20.0)]
  pub timeout: f64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  // 只用第一个后端记录
  let mut config = DetectorConfig::from_url(&args.detector)?;
  config.backends.truncate(1);
  let fixture = Fixture::load(&args.case)?;

  let bus = Bus::new();
  let driver = bus.create_node("tanzhen_recorder")?;
  let namespace = Namespace::unique(&["record"])?;
  let (_container, topics) = launch_apriltag(&bus, &namespace, &config)?;

  let outcome = RetryPublishTask::default()
    .with_namespace(namespace)
    .with_timeout(Duration::try_from_secs_f64(args.timeout)?)
    .with_output_topics(&topics)
    .run_task(&fixture, &driver, &DetectionCountCheck::new(&topics, 1))?;

  let path = args.case.join(GROUND_TRUTH_FILE);
  let truth = record_ground_truth(&outcome.received, &topics[0], &path)?;
  info!(
    "用例 {} 的期望输出已记录: {} 个检测结果",
    fixture.name,
    truth.detections.len()
  );
  Ok(())
}

