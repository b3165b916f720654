// 该文件是 Tanzhen （探针） 项目的一部分。
// src/input/test_cases.rs - 测试用例目录发现
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

use tracing::debug;

use crate::input::{Fixture, FixtureError, IMAGE_FILE};

const TEST_CASES_DIR: &str = "test_cases";

/// `root/test_cases` 下按名称排序的测试用例目录
#[derive(Debug, Clone, Default)]
pub struct TestCases {
  cases: Vec<PathBuf>,
}

impl TestCases {
  /// `root` 下没有 `test_cases` 目录时，直接把 `root` 当作用例集合
  ///
  /// 只收录包含 `image.json` 的子目录。
  pub fn discover(root: impl AsRef<Path>) -> Result<Self, FixtureError> {
    let root = root.as_ref();
    let nested = root.join(TEST_CASES_DIR);
    let dir = if nested.is_dir() { nested } else { root.to_path_buf() };
    if !dir.is_dir() {
      return Err(FixtureError::MissingDirectory(dir));
    }

    let io_error = |source| FixtureError::Io {
      path: dir.clone(),
      source,
    };
    let mut cases = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(io_error)? {
      let path = entry.map_err(io_error)?.path();
      if path.is_dir() && path.join(IMAGE_FILE).is_file() {
        cases.push(path);
      } else {
        debug!("跳过非测试用例路径 {}", path.display());
      }
    }
    cases.sort();
    Ok(TestCases { cases })
  }

  pub fn len(&self) -> usize {
    self.cases.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cases.is_empty()
  }

  pub fn paths(&self) -> &[PathBuf] {
    &self.cases
  }

  /// 逐个加载，遇到错误的用例同样交给调用方处理
  pub fn fixtures(&self) -> impl Iterator<Item = Result<Fixture, FixtureError>> + '_ {
    self.cases.iter().map(Fixture::load)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn discovers_sorted_cases_with_image_json() {
    let root = tempfile::tempdir().unwrap();
    let cases = root.path().join(TEST_CASES_DIR);
    for name in ["b_case", "a_case", "no_image"] {
      std::fs::create_dir_all(cases.join(name)).unwrap();
    }
    std::fs::write(cases.join("a_case").join(IMAGE_FILE), "{}").unwrap();
    std::fs::write(cases.join("b_case").join(IMAGE_FILE), "{}").unwrap();
    std::fs::write(cases.join("README"), "").unwrap();

    let found = TestCases::discover(root.path()).unwrap();
    let names = found
      .paths()
      .iter()
      .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
      .collect::<Vec<_>>();
    assert_eq!(names, ["a_case", "b_case"]);
  }

  #[test]
  fn falls_back_to_root_itself() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("only")).unwrap();
    std::fs::write(root.path().join("only").join(IMAGE_FILE), "{}").unwrap();
    assert_eq!(TestCases::discover(root.path()).unwrap().len(), 1);
  }

  #[test]
  fn missing_root_is_an_error() {
    assert!(TestCases::discover("/definitely/not/here").is_err());
  }
}
