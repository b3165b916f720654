// 该文件是 Tanzhen （探针） 项目的一部分。
// src/verify/ground_truth.rs - 期望的检测结果
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

use crate::message::{AprilTagDetection, AprilTagDetectionArray};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedDetection {
  pub id: i32,
  pub family: String,
  pub center: [f64; 2],
  pub corners: [[f64; 2]; 4],
  pub translation: [f64; 3],
  /// `[x, y, z, w]`
  pub orientation: [f64; 4],
}

impl From<&AprilTagDetection> for ExpectedDetection {
  fn from(detection: &AprilTagDetection) -> Self {
    let pose = &detection.pose.pose;
    ExpectedDetection {
      id: detection.id,
      family: detection.family.clone(),
      center: [detection.center.x, detection.center.y],
      corners: detection.corners.map(|c| [c.x, c.y]),
      translation: pose.position.to_array(),
      orientation: pose.orientation.to_array(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
  pub detections: Vec<ExpectedDetection>,
}

impl GroundTruth {
  /// 随仓库提供的 `apriltag0` 测试图像
  pub fn apriltag0() -> Self {
    GroundTruth {
      detections: vec![ExpectedDetection {
        id: 0,
        family: "tag36h11".to_string(),
        center: [926.0, 547.0],
        corners: [
          [1044.0, 665.0],
          [808.0, 665.0],
          [808.0, 429.0],
          [1044.0, 429.0],
        ],
        translation: [0.255342, 0.098358, 0.403961],
        orientation: [0.0, 0.0, 1.0, 0.0],
      }],
    }
  }

  pub fn from_message(message: &AprilTagDetectionArray) -> Self {
    GroundTruth {
      detections: message.detections.iter().map(ExpectedDetection::from).collect(),
    }
  }

  /// 只有一项时对所有检测结果都用这一项比较，否则按 id 查找
  pub fn expected_for(&self, id: i32) -> Option<&ExpectedDetection> {
    match self.detections.as_slice() {
      [only] => Some(only),
      many => many.iter().find(|expected| expected.id == id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn single_entry_matches_every_id() {
    let truth = GroundTruth::apriltag0();
    assert_eq!(truth.expected_for(0).map(|e| e.id), Some(0));
    assert_eq!(truth.expected_for(7).map(|e| e.id), Some(0));
  }

  #[test]
  fn multiple_entries_match_by_id() {
    let mut truth = GroundTruth::apriltag0();
    let mut other = truth.detections[0].clone();
    other.id = 5;
    truth.detections.push(other);
    assert_eq!(truth.expected_for(5).map(|e| e.id), Some(5));
    assert!(truth.expected_for(7).is_none());
  }

  #[test]
  fn parses_expected_json() {
    let truth: GroundTruth = serde_json::from_str(
      r#"{ "detections": [ { "id": 1, "family": "tag36h11", "center": [1, 2],
           "corners": [[0, 0], [1, 0], [1, 1], [0, 1]],
           "translation": [0, 0, 1], "orientation": [0, 0, 0, 1] } ] }"#,
    )
    .unwrap();
    assert_eq!(truth.detections[0].corners[2], [1.0, 1.0]);
  }
}
