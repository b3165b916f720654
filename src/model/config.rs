// 该文件是 Tanzhen （探针） 项目的一部分。
// src/model/config.rs - 检测器参数
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
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

const DEFAULT_SIZE: f64 = 0.22;
const DEFAULT_MAX_TAGS: usize = 64;
const DEFAULT_TILE_SIZE: u32 = 4;

#[derive(Error, Debug, PartialEq)]
pub enum DetectorConfigError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("参数 {key} 的值无效: {value}")]
  InvalidValue { key: String, value: String },
  #[error("未知的标签族: {0}")]
  UnknownFamily(String),
  #[error("未知的后端: {0}")]
  UnknownBackend(String),
  #[error("标签尺寸必须为正数: {0}")]
  InvalidSize(f64),
  #[error("max_tags 至少为 1")]
  InvalidMaxTags,
  #[error("tile_size 至少为 1")]
  InvalidTileSize,
  #[error("至少需要指定一个后端")]
  NoBackend,
  #[error("Tag family not supported by specified backend: {family} ({backend})")]
  UnsupportedFamily { family: TagFamily, backend: Backend },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Backend {
  Cpu,
  Cuda,
  Pva,
}

impl Backend {
  pub fn as_str(&self) -> &'static str {
    match self {
      Backend::Cpu => "CPU",
      Backend::Cuda => "CUDA",
      Backend::Pva => "PVA",
    }
  }

  /// CUDA 与 PVA 只实现了 tag36h11
  pub fn supports(&self, family: TagFamily) -> bool {
    match self {
      Backend::Cpu => true,
      Backend::Cuda | Backend::Pva => family == TagFamily::Tag36h11,
    }
  }
}

impl fmt::Display for Backend {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Backend {
  type Err = DetectorConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "CPU" => Ok(Backend::Cpu),
      "CUDA" => Ok(Backend::Cuda),
      "PVA" => Ok(Backend::Pva),
      _ => Err(DetectorConfigError::UnknownBackend(s.to_string())),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagFamily {
  Tag36h11,
  Tag36h10,
  Tag25h9,
  Tag16h5,
  Circle21h7,
  Circle49h12,
  Custom48h12,
  Standard41h12,
  Standard52h13,
}

impl TagFamily {
  pub const ALL: [TagFamily; 9] = [
    TagFamily::Tag36h11,
    TagFamily::Tag36h10,
    TagFamily::Tag25h9,
    TagFamily::Tag16h5,
    TagFamily::Circle21h7,
    TagFamily::Circle49h12,
    TagFamily::Custom48h12,
    TagFamily::Standard41h12,
    TagFamily::Standard52h13,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      TagFamily::Tag36h11 => "tag36h11",
      TagFamily::Tag36h10 => "tag36h10",
      TagFamily::Tag25h9 => "tag25h9",
      TagFamily::Tag16h5 => "tag16h5",
      TagFamily::Circle21h7 => "tagCircle21h7",
      TagFamily::Circle49h12 => "tagCircle49h12",
      TagFamily::Custom48h12 => "tagCustom48h12",
      TagFamily::Standard41h12 => "tagStandard41h12",
      TagFamily::Standard52h13 => "tagStandard52h13",
    }
  }
}

impl fmt::Display for TagFamily {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TagFamily {
  type Err = DetectorConfigError;

  /// 大小写不敏感，`tag` 前缀可省略
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim().to_ascii_lowercase();
    let wanted = wanted.strip_prefix("tag").unwrap_or(wanted.as_str());
    TagFamily::ALL
      .into_iter()
      .find(|family| family.as_str().to_ascii_lowercase().strip_prefix("tag") == Some(wanted))
      .ok_or_else(|| DetectorConfigError::UnknownFamily(s.to_string()))
  }
}

/// 检测节点的参数
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
  /// 标签边长，单位米
  pub size: f64,
  pub max_tags: usize,
  pub tile_size: u32,
  pub tag_family: TagFamily,
  pub backends: Vec<Backend>,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    DetectorConfig {
      size: DEFAULT_SIZE,
      max_tags: DEFAULT_MAX_TAGS,
      tile_size: DEFAULT_TILE_SIZE,
      tag_family: TagFamily::Tag36h11,
      backends: vec![Backend::Cuda],
    }
  }
}

impl DetectorConfig {
  pub fn with_backends(mut self, backends: &[Backend]) -> Self {
    self.backends = backends.to_vec();
    self
  }

  pub fn with_family(mut self, family: TagFamily) -> Self {
    self.tag_family = family;
    self
  }

  pub fn with_size(mut self, size: f64) -> Self {
    self.size = size;
    self
  }

  pub fn with_max_tags(mut self, max_tags: usize) -> Self {
    self.max_tags = max_tags;
    self
  }

  pub fn validate(&self) -> Result<(), DetectorConfigError> {
    if !(self.size.is_finite() && self.size > 0.0) {
      return Err(DetectorConfigError::InvalidSize(self.size));
    }
    if self.max_tags == 0 {
      return Err(DetectorConfigError::InvalidMaxTags);
    }
    if self.tile_size == 0 {
      return Err(DetectorConfigError::InvalidTileSize);
    }
    if self.backends.is_empty() {
      return Err(DetectorConfigError::NoBackend);
    }
    if let Some(backend) = self
      .backends
      .iter()
      .find(|backend| !backend.supports(self.tag_family))
    {
      return Err(DetectorConfigError::UnsupportedFamily {
        family: self.tag_family,
        backend: *backend,
      });
    }
    Ok(())
  }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, DetectorConfigError> {
  value.parse().map_err(|_| DetectorConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
  })
}

impl FromUrlWithScheme for DetectorConfig {
  const SCHEME: &'static str = "apriltag";
}

impl FromUrl for DetectorConfig {
  type Error = DetectorConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectorConfigError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let mut config = DetectorConfig::default();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "size" => config.size = parse_value(&key, &value)?,
        "max_tags" => config.max_tags = parse_value(&key, &value)?,
        "tile_size" => config.tile_size = parse_value(&key, &value)?,
        "family" | "tag_family" => config.tag_family = value.parse()?,
        "backends" => {
          config.backends = value
            .split(',')
            .filter(|name| !name.trim().is_empty())
            .map(str::parse)
            .collect::<Result<_, _>>()?;
        }
        other => warn!("忽略未知的检测器参数: {}={}", other, value),
      }
    }

    config.validate()?;
    debug!("检测器参数: {:?}", config);
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    let config = DetectorConfig::default();
    assert_eq!(config.size, 0.22);
    assert_eq!(config.max_tags, 64);
    assert_eq!(config.tile_size, 4);
    assert_eq!(config.backends, [Backend::Cuda]);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn parses_query_parameters() {
    let url = Url::parse("apriltag://?size=0.3&max_tags=8&tile_size=2&backends=CPU,cuda").unwrap();
    let config = DetectorConfig::from_url(&url).unwrap();
    assert_eq!(config.size, 0.3);
    assert_eq!(config.max_tags, 8);
    assert_eq!(config.tile_size, 2);
    assert_eq!(config.backends, [Backend::Cpu, Backend::Cuda]);
  }

  #[test]
  fn cuda_rejects_other_families() {
    let url = Url::parse("apriltag://?family=tag25h9&backends=CUDA").unwrap();
    let err = DetectorConfig::from_url(&url).unwrap_err();
    assert!(
      err
        .to_string()
        .starts_with("Tag family not supported by specified backend")
    );

    let url = Url::parse("apriltag://?family=tag25h9&backends=CPU").unwrap();
    assert_eq!(
      DetectorConfig::from_url(&url).unwrap().tag_family,
      TagFamily::Tag25h9
    );
  }

  #[test]
  fn family_names_are_forgiving() {
    assert_eq!("36h11".parse::<TagFamily>().unwrap(), TagFamily::Tag36h11);
    assert_eq!(
      "tagcircle21h7".parse::<TagFamily>().unwrap(),
      TagFamily::Circle21h7
    );
    assert!("tag99h1".parse::<TagFamily>().is_err());
  }

  #[test]
  fn rejects_bad_values() {
    for query in ["size=-1", "size=abc", "max_tags=0", "tile_size=0", "backends=GPU"] {
      let url = Url::parse(&format!("apriltag://?{query}")).unwrap();
      assert!(DetectorConfig::from_url(&url).is_err(), "{query}");
    }
    let url = Url::parse("fixture:///test_cases/apriltag0").unwrap();
    assert!(matches!(
      DetectorConfig::from_url(&url),
      Err(DetectorConfigError::SchemeMismatch { .. })
    ));
  }
}
