// 该文件是 Tanzhen （探针） 项目的一部分。
// src/input/json_fixture.rs - JSON 描述的测试激励
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

use image::ImageReader;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::FixtureError,
  message::{CameraInfo, Encoding, Image},
  verify::GroundTruth,
};

pub const IMAGE_FILE: &str = "image.json";
pub const CAMERA_INFO_FILE: &str = "camera_info.json";
pub const GROUND_TRUTH_FILE: &str = "expected.json";

#[derive(Debug, Deserialize)]
struct ImageDescriptor {
  /// 相对于 JSON 文件所在目录的图片路径
  image: String,
  encoding: String,
  #[serde(default)]
  gray_scale: bool,
  #[serde(default)]
  frame_id: String,
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, FixtureError> {
  let text = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  serde_json::from_str(&text).map_err(|source| FixtureError::Json {
    path: path.to_path_buf(),
    source,
  })
}

/// 读取 `image.json` 以及它引用的图片文件
pub fn load_image_from_json(path: &Path) -> Result<Image, FixtureError> {
  let descriptor: ImageDescriptor = read_json(path)?;
  let picture = path
    .parent()
    .unwrap_or_else(|| Path::new("."))
    .join(&descriptor.image);

  let image_error = |source| FixtureError::Image {
    path: picture.clone(),
    source,
  };
  let decoded = ImageReader::open(&picture)
    .map_err(|source| FixtureError::Io {
      path: picture.clone(),
      source,
    })?
    .decode()
    .map_err(image_error)?;

  let encoding: Encoding = descriptor.encoding.parse()?;
  let mut image = if descriptor.gray_scale || encoding == Encoding::Mono8 {
    Image::from_gray_image(&decoded.to_luma8())
  } else {
    Image::from_rgb_image(&decoded.to_rgb8(), encoding)?
  };
  image.header.frame_id = descriptor.frame_id;

  debug!(
    "加载图像 {}: {}x{} {}",
    picture.display(),
    image.width,
    image.height,
    image.encoding
  );
  Ok(image)
}

pub fn load_camera_info_from_json(path: &Path) -> Result<CameraInfo, FixtureError> {
  read_json(path)
}

/// 一个测试用例的全部激励与期望输出
#[derive(Debug, Clone)]
pub struct Fixture {
  pub name: String,
  pub dir: PathBuf,
  pub image: Image,
  pub camera_info: CameraInfo,
  /// 测试用例目录下的 `expected.json`，不存在时为 `None`
  pub ground_truth: Option<GroundTruth>,
}

impl Fixture {
  pub fn load(dir: impl AsRef<Path>) -> Result<Self, FixtureError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
      return Err(FixtureError::MissingDirectory(dir.to_path_buf()));
    }

    let image = load_image_from_json(&dir.join(IMAGE_FILE))?;
    let camera_info = load_camera_info_from_json(&dir.join(CAMERA_INFO_FILE))?;

    let truth_path = dir.join(GROUND_TRUTH_FILE);
    let ground_truth = if truth_path.is_file() {
      Some(read_json(&truth_path)?)
    } else {
      None
    };

    let name = dir
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| "fixture".to_string());

    info!(
      "加载测试用例 {}: 图像 {}x{}, 标定 {}x{}, 期望输出 {}",
      name,
      image.width,
      image.height,
      camera_info.width,
      camera_info.height,
      if ground_truth.is_some() { "文件" } else { "内置" }
    );

    Ok(Fixture {
      name,
      dir: dir.to_path_buf(),
      image,
      camera_info,
      ground_truth,
    })
  }

  pub fn ground_truth_or_default(&self) -> GroundTruth {
    self
      .ground_truth
      .clone()
      .unwrap_or_else(GroundTruth::apriltag0)
  }

  /// 将图像转换为 mono8 后的副本
  pub fn to_mono8(&self) -> Result<Self, FixtureError> {
    let mut fixture = self.clone();
    fixture.image = self.image.to_mono8()?;
    Ok(fixture)
  }
}

impl FromUrlWithScheme for Fixture {
  const SCHEME: &'static str = "fixture";
}

impl FromUrl for Fixture {
  type Error = FixtureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(FixtureError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }
    Fixture::load(crate::url_file_path(url))
  }
}
