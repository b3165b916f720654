// 该文件是 Tanzhen （探针） 项目的一部分。
// src/transport/namespace.rs - 命名空间与话题名称
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

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::transport::TransportError;

pub const DEFAULT_NAMESPACE: &str = "tanzhen_test";

static UNIQUE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// 检查话题名称，允许相对名称与绝对名称
pub fn validate_topic_name(name: &str) -> Result<(), TransportError> {
  let invalid = |reason: &'static str| -> Result<(), TransportError> {
    Err(TransportError::InvalidTopicName(name.to_string(), reason))
  };

  if name.is_empty() || name == "/" {
    return invalid("名称为空");
  }
  if name.ends_with('/') {
    return invalid("不能以 '/' 结尾");
  }
  if name.contains("//") {
    return invalid("包含连续的 '/'");
  }
  if name
    .chars()
    .any(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '/'))
  {
    return invalid("只允许字母、数字、'_' 与 '/'");
  }
  let leading_digit = name
    .split('/')
    .filter(|token| !token.is_empty())
    .any(|token| token.starts_with(|c: char| c.is_ascii_digit()));
  if leading_digit {
    return invalid("名称段不能以数字开头");
  }
  Ok(())
}

/// 测试用例共享的命名空间，保证不同测试场景的话题互不冲突
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
  path: String,
}

impl Default for Namespace {
  fn default() -> Self {
    Namespace {
      path: format!("/{}", DEFAULT_NAMESPACE),
    }
  }
}

impl fmt::Display for Namespace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.path)
  }
}

impl Namespace {
  pub fn root() -> Self {
    Namespace {
      path: "/".to_string(),
    }
  }

  pub fn new(path: &str) -> Result<Self, TransportError> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
      return Ok(Namespace::root());
    }
    validate_topic_name(trimmed)?;
    let path = if trimmed.starts_with('/') {
      trimmed.to_string()
    } else {
      format!("/{}", trimmed)
    };
    Ok(Namespace { path })
  }

  /// `/tanzhen_test/<token>/<token>...`
  pub fn generate(tokens: &[&str]) -> Result<Self, TransportError> {
    let mut path = format!("/{}", DEFAULT_NAMESPACE);
    for token in tokens {
      validate_topic_name(token)?;
      path.push('/');
      path.push_str(token.trim_matches('/'));
    }
    Ok(Namespace { path })
  }

  /// 在 `generate` 的基础上追加进程号与计数器，用于同一进程内并行的场景
  pub fn unique(tokens: &[&str]) -> Result<Self, TransportError> {
    let mut namespace = Namespace::generate(tokens)?;
    let counter = UNIQUE_COUNTER.fetch_add(1, Ordering::Relaxed);
    namespace.path = format!(
      "{}/run_{}_{}",
      namespace.path,
      std::process::id(),
      counter
    );
    Ok(namespace)
  }

  pub fn as_str(&self) -> &str {
    &self.path
  }

  /// 绝对名称原样返回，相对名称拼接到命名空间之后
  pub fn resolve(&self, name: &str) -> Result<String, TransportError> {
    validate_topic_name(name)?;
    if name.starts_with('/') {
      return Ok(name.to_string());
    }
    if self.path == "/" {
      Ok(format!("/{}", name))
    } else {
      Ok(format!("{}/{}", self.path, name))
    }
  }

  /// 名称到完整话题名的映射
  pub fn lookup(&self, names: &[&str]) -> Result<BTreeMap<String, String>, TransportError> {
    names
      .iter()
      .map(|name| Ok((name.to_string(), self.resolve(name)?)))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn generate_and_resolve() {
    let ns = Namespace::generate(&["apriltag"]).unwrap();
    assert_eq!(ns.as_str(), "/tanzhen_test/apriltag");
    assert_eq!(ns.resolve("image").unwrap(), "/tanzhen_test/apriltag/image");
    assert_eq!(ns.resolve("/tf").unwrap(), "/tf");
    assert_eq!(Namespace::root().resolve("image").unwrap(), "/image");
  }

  #[test]
  fn lookup_covers_every_name() {
    let ns = Namespace::default();
    let lookup = ns.lookup(&["image", "camera_info", "tag_detections"]).unwrap();
    assert_eq!(lookup.len(), 3);
    assert_eq!(lookup["camera_info"], "/tanzhen_test/camera_info");
  }

  #[test]
  fn unique_namespaces_differ() {
    let a = Namespace::unique(&["case"]).unwrap();
    let b = Namespace::unique(&["case"]).unwrap();
    assert_ne!(a, b);
    assert!(a.as_str().starts_with("/tanzhen_test/case/run_"));
  }

  #[test]
  fn rejects_malformed_names() {
    for name in ["", "/", "a//b", "image/", "bad-name", "0image", "ns/1x"] {
      assert!(validate_topic_name(name).is_err(), "{name} 应当被拒绝");
    }
    for name in ["image", "/ns/image", "tag_detections_CPU", "ns/x1"] {
      assert!(validate_topic_name(name).is_ok(), "{name} 应当被接受");
    }
  }

  #[test]
  fn new_normalizes_to_absolute() {
    assert_eq!(Namespace::new("robot/").unwrap().as_str(), "/robot");
    assert_eq!(Namespace::new("").unwrap(), Namespace::root());
  }
}
