// 该文件是 Tanzhen （探针） 项目的一部分。
// src/message/camera_info.rs - 相机标定消息
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

use crate::message::{Header, Message};

/// 相机内参与畸变参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
  #[serde(default)]
  pub header: Header,
  pub height: u32,
  pub width: u32,
  #[serde(default)]
  pub distortion_model: String,
  #[serde(rename = "D", default)]
  pub d: Vec<f64>,
  /// 3x3 内参矩阵，行优先
  #[serde(rename = "K")]
  pub k: [f64; 9],
  #[serde(rename = "R", default = "identity_rotation")]
  pub r: [f64; 9],
  /// 3x4 投影矩阵，行优先
  #[serde(rename = "P", default)]
  pub p: [f64; 12],
  #[serde(default)]
  pub binning_x: u32,
  #[serde(default)]
  pub binning_y: u32,
}

fn identity_rotation() -> [f64; 9] {
  [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
}

impl Default for CameraInfo {
  fn default() -> Self {
    CameraInfo {
      header: Header::default(),
      height: 0,
      width: 0,
      distortion_model: String::new(),
      d: Vec::new(),
      k: [0.0; 9],
      r: identity_rotation(),
      p: [0.0; 12],
      binning_x: 0,
      binning_y: 0,
    }
  }
}

impl Message for CameraInfo {
  const TYPE_NAME: &'static str = "sensor_msgs/msg/CameraInfo";
}

impl CameraInfo {
  pub fn fx(&self) -> f64 {
    self.k[0]
  }

  pub fn fy(&self) -> f64 {
    self.k[4]
  }

  pub fn cx(&self) -> f64 {
    self.k[2]
  }

  pub fn cy(&self) -> f64 {
    self.k[5]
  }
}
