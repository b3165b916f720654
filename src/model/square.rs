// 该文件是 Tanzhen （探针） 项目的一部分。
// src/model/square.rs - 方形标记检测器
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
use tracing::{debug, warn};

use crate::{
  message::{
    AprilTagDetection, CameraInfo, Image, ImageError, Point2, Point3, Pose, PoseStamped,
    Quaternion,
  },
  model::{Detector, DetectorConfig, DetectorConfigError},
};

const DARK_THRESHOLD: u8 = 128;

/// 标签平面朝向相机时的姿态，绕 z 轴翻转
const FACING_CAMERA: Quaternion = Quaternion::new(0.0, 0.0, 1.0, 0.0);

#[derive(Error, Debug)]
pub enum SquareDetectorError {
  #[error("图像转换错误: {0}")]
  Image(#[from] ImageError),
  #[error("相机内参无效: fx={fx}, fy={fy}")]
  InvalidIntrinsics { fx: f64, fy: f64 },
  #[error("检测器参数错误: {0}")]
  Config(#[from] DetectorConfigError),
}

/// 在合成图像中寻找唯一的深色方块
///
/// 不解码标签内容，上报配置中的标签族与 `tag_id`。
#[derive(Debug, Clone)]
pub struct SquareMarkerDetector {
  config: DetectorConfig,
  tag_id: i32,
  threshold: u8,
}

struct DarkRegion {
  min_x: u32,
  min_y: u32,
  max_x: u32,
  max_y: u32,
  contrast: f32,
}

impl SquareMarkerDetector {
  pub fn from_config(config: DetectorConfig) -> Result<Self, SquareDetectorError> {
    config.validate()?;
    Ok(SquareMarkerDetector {
      config,
      tag_id: 0,
      threshold: DARK_THRESHOLD,
    })
  }

  pub fn with_tag_id(mut self, tag_id: i32) -> Self {
    self.tag_id = tag_id;
    self
  }

  pub fn with_threshold(mut self, threshold: u8) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  fn dark_region(&self, gray: &image::GrayImage) -> Option<DarkRegion> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    let (mut dark_sum, mut dark_count) = (0u64, 0u64);
    let (mut bright_sum, mut bright_count) = (0u64, 0u64);

    for (x, y, pixel) in gray.enumerate_pixels() {
      let value = pixel.0[0];
      if value < self.threshold {
        dark_sum += value as u64;
        dark_count += 1;
        bounds = Some(match bounds {
          None => (x, y, x, y),
          Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
      } else {
        bright_sum += value as u64;
        bright_count += 1;
      }
    }

    let (min_x, min_y, max_x, max_y) = bounds?;
    let mean = |sum: u64, count: u64| if count == 0 { 0.0 } else { sum as f32 / count as f32 };
    Some(DarkRegion {
      min_x,
      min_y,
      max_x,
      max_y,
      contrast: mean(bright_sum, bright_count) - mean(dark_sum, dark_count),
    })
  }
}

impl Detector for SquareMarkerDetector {
  type Error = SquareDetectorError;

  fn detect(
    &self,
    image: &Image,
    camera_info: &CameraInfo,
  ) -> Result<Vec<AprilTagDetection>, Self::Error> {
    let (fx, fy) = (camera_info.fx(), camera_info.fy());
    if !(fx > 0.0 && fy > 0.0) {
      return Err(SquareDetectorError::InvalidIntrinsics { fx, fy });
    }
    if image.width != camera_info.width || image.height != camera_info.height {
      warn!(
        "图像尺寸 {}x{} 与标定尺寸 {}x{} 不一致",
        image.width, image.height, camera_info.width, camera_info.height
      );
    }

    let gray = image.to_gray_image()?;
    let Some(region) = self.dark_region(&gray) else {
      debug!("未找到深色区域");
      return Ok(Vec::new());
    };

    // 外边界取像素右下边缘
    let (x0, y0) = (region.min_x as f64, region.min_y as f64);
    let (x1, y1) = ((region.max_x + 1) as f64, (region.max_y + 1) as f64);
    let corners = [
      Point2::new(x1, y1),
      Point2::new(x0, y1),
      Point2::new(x0, y0),
      Point2::new(x1, y0),
    ];
    let center = Point2::new(
      corners.iter().map(|c| c.x).sum::<f64>() / 4.0,
      corners.iter().map(|c| c.y).sum::<f64>() / 4.0,
    );

    let angular = ((x1 - x0) / fx + (y1 - y0) / fy) / 2.0;
    let z = self.config.size / angular;
    let position = Point3::new(
      (center.x - camera_info.cx()) * z / fx,
      (center.y - camera_info.cy()) * z / fy,
      z,
    );

    let detection = AprilTagDetection {
      family: self.config.tag_family.as_str().to_string(),
      id: self.tag_id,
      center,
      corners,
      goodness: 0.0,
      decision_margin: region.contrast,
      pose: PoseStamped {
        header: image.header.clone(),
        pose: Pose {
          position,
          orientation: FACING_CAMERA,
        },
      },
    };
    debug!(
      "检测到标记 {}: 中心 ({:.1}, {:.1}), 深度 {:.4}",
      detection.id, center.x, center.y, z
    );

    let mut detections = vec![detection];
    detections.truncate(self.config.max_tags);
    Ok(detections)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::message::Encoding;
  use crate::model::{Backend, TagFamily};

  fn camera_info(width: u32, height: u32) -> CameraInfo {
    let mut info = CameraInfo::default();
    info.width = width;
    info.height = height;
    info.k = [100.0, 0.0, 50.0, 0.0, 100.0, 40.0, 0.0, 0.0, 1.0];
    info
  }

  fn square_image(width: u32, height: u32, x: (u32, u32), y: (u32, u32)) -> Image {
    let picture = image::RgbImage::from_fn(width, height, |px, py| {
      if (x.0..x.1).contains(&px) && (y.0..y.1).contains(&py) {
        image::Rgb([10, 10, 10])
      } else {
        image::Rgb([250, 250, 250])
      }
    });
    Image::from_rgb_image(&picture, Encoding::Bgr8).unwrap()
  }

  #[test]
  fn locates_square_and_estimates_pose() {
    let detector = SquareMarkerDetector::from_config(DetectorConfig::default().with_size(0.2))
      .unwrap()
      .with_tag_id(3);
    let image = square_image(100, 80, (40, 60), (30, 50));
    let detections = detector.detect(&image, &camera_info(100, 80)).unwrap();

    assert_eq!(detections.len(), 1);
    let detection = &detections[0];
    assert_eq!(detection.id, 3);
    assert_eq!(detection.family, "tag36h11");
    assert_eq!(detection.center, Point2::new(50.0, 40.0));
    assert_eq!(detection.corners[0], Point2::new(60.0, 50.0));
    assert_eq!(detection.corners[2], Point2::new(40.0, 30.0));

    // 20 像素对应 0.2 米，焦距 100 像素
    let position = detection.pose.pose.position;
    assert!((position.z - 1.0).abs() < 1e-9);
    assert!(position.x.abs() < 1e-9 && position.y.abs() < 1e-9);
    assert_eq!(detection.pose.pose.orientation, FACING_CAMERA);
    assert!(detection.decision_margin > 200.0);
  }

  #[test]
  fn blank_image_has_no_detection() {
    let detector = SquareMarkerDetector::from_config(DetectorConfig::default()).unwrap();
    let image = square_image(10, 10, (0, 0), (0, 0));
    assert!(detector.detect(&image, &camera_info(10, 10)).unwrap().is_empty());
  }

  #[test]
  fn rejects_zero_focal_length() {
    let detector = SquareMarkerDetector::from_config(DetectorConfig::default()).unwrap();
    let image = square_image(10, 10, (2, 4), (2, 4));
    let info = CameraInfo::default();
    assert!(matches!(
      detector.detect(&image, &info),
      Err(SquareDetectorError::InvalidIntrinsics { .. })
    ));
  }

  #[test]
  fn invalid_config_is_refused() {
    let config = DetectorConfig::default()
      .with_family(TagFamily::Tag16h5)
      .with_backends(&[Backend::Pva]);
    assert!(matches!(
      SquareMarkerDetector::from_config(config),
      Err(SquareDetectorError::Config(
        DetectorConfigError::UnsupportedFamily { .. }
      ))
    ));
  }
}
