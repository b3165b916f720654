// 该文件是 Tanzhen （探针） 项目的一部分。
// src/message/geometry.rs - 几何消息
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

use crate::message::Header;

/// 图像平面上的点（像素）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
  pub x: f64,
  pub y: f64,
}

impl Point2 {
  pub const fn new(x: f64, y: f64) -> Self {
    Point2 { x, y }
  }
}

impl From<[f64; 2]> for Point2 {
  fn from([x, y]: [f64; 2]) -> Self {
    Point2 { x, y }
  }
}

/// 相机坐标系下的点（米）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
  pub x: f64,
  pub y: f64,
  pub z: f64,
}

impl Point3 {
  pub const fn new(x: f64, y: f64, z: f64) -> Self {
    Point3 { x, y, z }
  }

  pub fn to_array(self) -> [f64; 3] {
    [self.x, self.y, self.z]
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
  pub x: f64,
  pub y: f64,
  pub z: f64,
  pub w: f64,
}

impl Default for Quaternion {
  fn default() -> Self {
    Quaternion::IDENTITY
  }
}

impl Quaternion {
  pub const IDENTITY: Quaternion = Quaternion::new(0.0, 0.0, 0.0, 1.0);

  pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
    Quaternion { x, y, z, w }
  }

  /// 按 `[x, y, z, w]` 顺序输出
  pub fn to_array(self) -> [f64; 4] {
    [self.x, self.y, self.z, self.w]
  }

  pub fn norm(&self) -> f64 {
    (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
  pub position: Point3,
  pub orientation: Quaternion,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseStamped {
  pub header: Header,
  pub pose: Pose,
}
