// 该文件是 Tanzhen （探针） 项目的一部分。
// src/output/report.rs - 按日期归档的测试报告
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

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Utc};
use serde::Serialize;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::OutputError,
  task::{Outcome, TaskError},
  verify::{Mismatch, VerifyError},
};

/// 单个测试用例的结果摘要
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
  pub case: String,
  pub passed: bool,
  pub iterations: Option<usize>,
  pub elapsed_ms: Option<u128>,
  pub delivered: Option<usize>,
  pub dropped: Option<usize>,
  pub ignored: Option<usize>,
  pub error: Option<String>,
  pub mismatches: Vec<Mismatch>,
}

fn mismatches_of(error: &TaskError) -> Vec<Mismatch> {
  match error {
    TaskError::Verify(VerifyError::Mismatches(report)) => report.mismatches.clone(),
    TaskError::Teardown {
      body: Some(body), ..
    } => mismatches_of(body),
    _ => Vec::new(),
  }
}

impl ScenarioReport {
  pub fn from_result(case: &str, result: &Result<Outcome, TaskError>) -> Self {
    match result {
      Ok(outcome) => ScenarioReport {
        case: case.to_string(),
        passed: true,
        iterations: Some(outcome.iterations),
        elapsed_ms: Some(outcome.elapsed.as_millis()),
        delivered: Some(outcome.delivery.delivered),
        dropped: Some(outcome.delivery.dropped),
        ignored: Some(outcome.received.ignored()),
        error: None,
        mismatches: Vec::new(),
      },
      Err(e) => ScenarioReport {
        case: case.to_string(),
        passed: false,
        iterations: match e {
          TaskError::Timeout { iterations, .. } => Some(*iterations),
          _ => None,
        },
        elapsed_ms: None,
        delivered: None,
        dropped: None,
        ignored: None,
        error: Some(e.to_string()),
        mismatches: mismatches_of(e),
      },
    }
  }
}

pub struct ReportDirectory {
  directory: PathBuf,
  counter: AtomicU16,
}

impl FromUrlWithScheme for ReportDirectory {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ReportDirectory {
  type Error = OutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: uri.scheme().to_string(),
      });
    }
    Ok(ReportDirectory::new(crate::url_file_path(uri)))
  }
}

impl ReportDirectory {
  pub fn new(directory: impl AsRef<Path>) -> Self {
    ReportDirectory {
      directory: directory.as_ref().to_path_buf(),
      counter: AtomicU16::new(0),
    }
  }

  fn report_id(&self) -> u16 {
    self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn report_path(&self) -> Result<PathBuf, OutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory).map_err(|source| OutputError::Io {
      path: directory.clone(),
      source,
    })?;

    Ok(directory.join(format!(
      "{}-{:04X}.json",
      now.format("%H-%M-%S"),
      self.report_id()
    )))
  }

  pub fn write(&self, report: &ScenarioReport) -> Result<PathBuf, OutputError> {
    let path = self.report_path()?;
    let text = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, text).map_err(|source| OutputError::Io {
      path: path.clone(),
      source,
    })?;
    info!("测试报告写入 {}", path.display());
    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[test]
  fn reports_land_in_dated_directories() {
    let dir = tempfile::tempdir().unwrap();
    let reports = ReportDirectory::new(dir.path());
    let failure: Result<Outcome, TaskError> = Err(TaskError::Timeout {
      missing: vec!["tag_detections".into()],
      timeout: Duration::from_secs(1),
      iterations: 10,
    });
    let report = ScenarioReport::from_result("apriltag0", &failure);
    assert!(!report.passed);
    assert_eq!(report.iterations, Some(10));

    let first = reports.write(&report).unwrap();
    let second = reports.write(&report).unwrap();
    assert_ne!(first, second);
    assert!(first.to_string_lossy().ends_with("-0001.json"));

    let today = Utc::now();
    let relative = first.strip_prefix(dir.path()).unwrap();
    assert!(relative.starts_with(today.year().to_string()));

    let json: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(&second).unwrap()).unwrap();
    assert_eq!(json["case"], "apriltag0");
    assert_eq!(json["passed"], false);
  }

  #[test]
  fn from_url_requires_folder_scheme() {
    let url = url::Url::parse("file:///tmp/reports").unwrap();
    assert!(ReportDirectory::from_url(&url).is_err());
    let url = url::Url::parse("folder:///tmp/reports").unwrap();
    assert!(ReportDirectory::from_url(&url).is_ok());
  }

  #[test]
  fn from_url_decodes_escaped_directory() {
    let url = url::Url::parse("folder:///tmp/daily%20reports").unwrap();
    let reports = ReportDirectory::from_url(&url).unwrap();
    assert_eq!(reports.directory, PathBuf::from("/tmp/daily reports"));
  }
}
