// 该文件是 Tanzhen （探针） 项目的一部分。
// src/transport/qos.rs - 服务质量策略
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
  /// 允许丢包，队列满时直接丢弃
  BestEffort,
  /// 队列满时在限定时间内重试
  Reliable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
  /// 不向晚加入的订阅者补发历史消息
  Volatile,
  /// 保留最后一条消息给晚加入的订阅者
  TransientLocal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qos {
  pub reliability: Reliability,
  pub durability: Durability,
  pub depth: usize,
}

impl Default for Qos {
  fn default() -> Self {
    Qos::sensor_data()
  }
}

impl Qos {
  /// 尽力而为 + 易失，测试激励消息使用的默认策略
  pub const fn sensor_data() -> Self {
    Qos {
      reliability: Reliability::BestEffort,
      durability: Durability::Volatile,
      depth: 10,
    }
  }

  pub const fn reliable(depth: usize) -> Self {
    Qos {
      reliability: Reliability::Reliable,
      durability: Durability::Volatile,
      depth,
    }
  }

  pub const fn with_depth(mut self, depth: usize) -> Self {
    self.depth = depth;
    self
  }

  pub const fn transient_local(mut self) -> Self {
    self.durability = Durability::TransientLocal;
    self
  }

  /// 发布者与订阅者策略是否兼容
  ///
  /// 可靠订阅不接收尽力而为发布者的消息；
  /// TransientLocal 订阅不接收 Volatile 发布者的消息。
  pub fn is_compatible(publisher: &Qos, subscriber: &Qos) -> bool {
    let reliability_ok = !(subscriber.reliability == Reliability::Reliable
      && publisher.reliability == Reliability::BestEffort);
    let durability_ok = !(subscriber.durability == Durability::TransientLocal
      && publisher.durability == Durability::Volatile);
    reliability_ok && durability_ok
  }
}
