// 该文件是 Tanzhen （探针） 项目的一部分。
// src/bin/apriltag_check.rs - 运行全部 AprilTag 测试用例
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
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

use tanzhen::{
  FromUrl,
  container::launch_apriltag,
  input::TestCases,
  model::DetectorConfig,
  task::{Outcome, RetryPublishTask, Task, TaskError},
  transport::{Bus, Namespace},
  verify::{BackendsCompareCheck, GroundTruthCheck},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 测试数据目录，用例位于其下的 test_cases/
  #[arg(long, value_name = "DIR")]
  pub test_dir: PathBuf,

  /// 检测器参数，例如 apriltag://?size=0.22&backends=CPU,CUDA
  #[arg(long, value_name = "DETECTOR", default_value = "apriltag://?size=0.22&max_tags=64&tile_size=4")]
  pub detector: Url,

  /// 等待输出的最长时间（秒）
  #[arg(long, value_name = "SECONDS", default_value_t = 20.0)]
  pub timeout: f64,

  /// 每轮发布后的等待时间（毫秒）
  #[arg(long, value_name = "MILLIS", default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
  pub poll_interval: u64,

  /// 发布前把图像转换为 mono8
  #[arg(long)]
  pub mono8: bool,

  /// 测试报告目录
  #[arg(long, value_name = "DIR")]
  pub report: Option<PathBuf>,
}

#[cfg(feature = "directory_report")]
struct Reporter(Option<tanzhen::output::ReportDirectory>);

#[cfg(feature = "directory_report")]
impl Reporter {
  fn new(directory: Option<&PathBuf>) -> Self {
    Reporter(directory.map(tanzhen::output::ReportDirectory::new))
  }

  fn write(&self, case: &str, result: &Result<Outcome, TaskError>) {
    let Some(reports) = &self.0 else {
      return;
    };
    let report = tanzhen::output::ScenarioReport::from_result(case, result);
    if let Err(e) = reports.write(&report) {
      error!("写入测试报告失败: {}", e);
    }
  }
}

#[cfg(not(feature = "directory_report"))]
struct Reporter;

#[cfg(not(feature = "directory_report"))]
impl Reporter {
  fn new(directory: Option<&PathBuf>) -> Self {
    if directory.is_some() {
      warn!("未启用 directory_report 功能，忽略 --report");
    }
    Reporter
  }

  fn write(&self, _case: &str, _result: &Result<Outcome, TaskError>) {}
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("测试数据目录: {}", args.test_dir.display());
  info!("检测器参数: {}", args.detector);

  let config = DetectorConfig::from_url(&args.detector)?;
  let cases = TestCases::discover(&args.test_dir)?;
  if cases.is_empty() {
    bail!("{} 下没有测试用例", args.test_dir.display());
  }
  let timeout = Duration::try_from_secs_f64(args.timeout)?;

  let reporter = Reporter::new(args.report.as_ref());

  let interrupted = Arc::new(AtomicBool::new(false));
  {
    let interrupted = interrupted.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，当前用例结束后退出...");
      interrupted.store(true, Ordering::SeqCst);
    })?;
  }

  let bus = Bus::new();
  let driver = bus.create_node("tanzhen_driver")?;
  let mut failed = Vec::new();

  for fixture in cases.fixtures() {
    if interrupted.load(Ordering::SeqCst) {
      warn!("中断信号接收，停止启动新的用例");
      break;
    }
    let fixture = fixture?;
    let namespace = Namespace::unique(&["apriltag"])?;
    let (container, topics) = launch_apriltag(&bus, &namespace, &config)?;

    let verifier = (
      BackendsCompareCheck::new(&topics),
      GroundTruthCheck::new(&topics[0], fixture.ground_truth_or_default()),
    );
    let task = RetryPublishTask::default()
      .with_namespace(namespace)
      .with_timeout(timeout)
      .with_poll_interval(Duration::from_millis(args.poll_interval))
      .with_output_topics(&topics)
      .accept_multiple_messages(topics.len() > 1)
      .with_mono8(args.mono8);

    let result = task.run_task(&fixture, &driver, &verifier);
    drop(container);

    reporter.write(&fixture.name, &result);

    match result {
      Ok(outcome) => info!(
        "用例 {} 通过: {} 轮, 耗时 {:.2?}",
        fixture.name, outcome.iterations, outcome.elapsed
      ),
      Err(e) => {
        error!("用例 {} 失败: {}", fixture.name, e);
        failed.push(fixture.name.clone());
      }
    }
  }

  if !failed.is_empty() {
    bail!("{} 个测试用例失败: {}", failed.len(), failed.join(", "));
  }
  info!("全部测试用例通过");
  Ok(())
}
