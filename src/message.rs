// 该文件是 Tanzhen （探针） 项目的一部分。
// src/message.rs - 消息定义
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

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// 可以在总线上传输的消息
///
/// `TYPE_NAME` 用于在话题注册时检查类型是否一致。
pub trait Message: Clone + Send + Sync + 'static {
  const TYPE_NAME: &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Time {
  pub sec: i32,
  pub nanosec: u32,
}

impl Time {
  pub fn now() -> Self {
    let now = Utc::now();
    Time {
      sec: now.timestamp() as i32,
      nanosec: now.timestamp_subsec_nanos(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
  #[serde(default)]
  pub stamp: Time,
  #[serde(default)]
  pub frame_id: String,
}

mod camera_info;
mod detection;
mod geometry;
mod image;

pub use self::camera_info::CameraInfo;
pub use self::detection::{AprilTagDetection, AprilTagDetectionArray};
pub use self::geometry::{Point2, Point3, Pose, PoseStamped, Quaternion};
pub use self::image::{Encoding, Image, ImageError};
