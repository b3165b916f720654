// 该文件是 Tanzhen （探针） 项目的一部分。
// src/transport.rs - 话题传输
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

mod bus;
mod namespace;
mod node;
mod qos;

pub use self::bus::{Bus, Delivery};
pub use self::namespace::{Namespace, validate_topic_name};
pub use self::node::{Inbox, Node, Publisher, Subscription};
pub use self::qos::{Durability, Qos, Reliability};

#[derive(Error, Debug)]
pub enum TransportError {
  #[error("非法话题名称 '{0}': {1}")]
  InvalidTopicName(String, &'static str),
  #[error("非法节点名称 '{0}'")]
  InvalidNodeName(String),
  #[error("话题 '{topic}' 类型冲突: 已注册 {registered}, 请求 {requested}")]
  TypeMismatch {
    topic: String,
    registered: &'static str,
    requested: &'static str,
  },
  #[error("队列深度必须大于 0")]
  ZeroDepth,
  #[error("发布者已被销毁: {0}")]
  PublisherDestroyed(String),
  #[error("总线状态锁已损坏")]
  Poisoned,
}
