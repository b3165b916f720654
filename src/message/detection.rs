// 该文件是 Tanzhen （探针） 项目的一部分。
// src/message/detection.rs - AprilTag 检测结果消息
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

use serde::{Deserialize, Serialize};

use crate::message::{Header, Message, Point2, PoseStamped};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AprilTagDetection {
  pub family: String,
  pub id: i32,
  pub center: Point2,
  /// 四个角点，顺序与检测器输出一致
  pub corners: [Point2; 4],
  #[serde(default)]
  pub goodness: f32,
  #[serde(default)]
  pub decision_margin: f32,
  pub pose: PoseStamped,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AprilTagDetectionArray {
  pub header: Header,
  pub detections: Vec<AprilTagDetection>,
}

impl Message for AprilTagDetectionArray {
  const TYPE_NAME: &'static str = "isaac_ros_apriltag_interfaces/msg/AprilTagDetectionArray";
}

impl AprilTagDetectionArray {
  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }

  pub fn len(&self) -> usize {
    self.detections.len()
  }
}
