// 该文件是 Tanzhen （探针） 项目的一部分。
// src/transport/node.rs - 节点、发布者与订阅者
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

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError, sync_channel};
use std::time::Duration;

use tracing::{debug, warn};

use crate::message::Message;
use crate::transport::bus::Envelope;
use crate::transport::{Bus, Delivery, Namespace, Qos, TransportError};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

fn validate_node_name(name: &str) -> Result<(), TransportError> {
  let valid = !name.is_empty()
    && !name.starts_with(|c: char| c.is_ascii_digit())
    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
  if valid {
    Ok(())
  } else {
    Err(TransportError::InvalidNodeName(name.to_string()))
  }
}

/// 总线上的一个参与者，持有自己创建的发布者与订阅者
pub struct Node {
  id: u64,
  name: String,
  bus: Bus,
}

impl Node {
  pub(crate) fn new(bus: Bus, name: &str) -> Result<Self, TransportError> {
    validate_node_name(name)?;
    Ok(Node {
      id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
      name: name.to_string(),
      bus,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn bus(&self) -> &Bus {
    &self.bus
  }

  pub fn create_publisher<T: Message>(
    &self,
    topic: &str,
    qos: Qos,
  ) -> Result<Publisher<T>, TransportError> {
    if qos.depth == 0 {
      return Err(TransportError::ZeroDepth);
    }
    let topic = Namespace::root().resolve(topic)?;
    let id = self.bus.add_publisher(&topic, T::TYPE_NAME, self.id, qos)?;
    debug!("节点 {} 创建发布者 {}", self.name, topic);
    Ok(Publisher {
      id,
      node_id: self.id,
      topic,
      bus: self.bus.clone(),
      released: false,
      _marker: PhantomData,
    })
  }

  pub fn create_subscription<T: Message>(
    &self,
    topic: &str,
    qos: Qos,
  ) -> Result<(Subscription, Inbox<T>), TransportError> {
    let (mut subscriptions, inbox) = self.create_subscriptions::<T>(&[topic], qos)?;
    let subscription = subscriptions.pop().ok_or(TransportError::ZeroDepth)?;
    Ok((subscription, inbox))
  }

  /// 为一组话题创建订阅，所有消息汇入同一个收件箱
  ///
  /// 任一话题注册失败时，已注册的订阅会被回滚。
  pub fn create_subscriptions<T: Message>(
    &self,
    topics: &[&str],
    qos: Qos,
  ) -> Result<(Vec<Subscription>, Inbox<T>), TransportError> {
    if qos.depth == 0 || topics.is_empty() {
      return Err(TransportError::ZeroDepth);
    }

    let (sender, receiver) = sync_channel(qos.depth * topics.len());
    let mut subscriptions = Vec::with_capacity(topics.len());
    for topic in topics {
      let registered = Namespace::root().resolve(topic).and_then(|topic| {
        let id = self
          .bus
          .add_subscriber(&topic, T::TYPE_NAME, self.id, qos, sender.clone())?;
        Ok((topic, id))
      });
      match registered {
        Ok((topic, id)) => {
          debug!("节点 {} 订阅 {}", self.name, topic);
          subscriptions.push(Subscription {
            id,
            node_id: self.id,
            topic,
            bus: self.bus.clone(),
            released: false,
          });
        }
        Err(e) => {
          for subscription in subscriptions {
            self.destroy_subscription(subscription);
          }
          return Err(e);
        }
      }
    }

    Ok((
      subscriptions,
      Inbox {
        receiver,
        _marker: PhantomData,
      },
    ))
  }

  /// 销毁发布者；句柄不属于本节点或已被释放时返回 `false`
  pub fn destroy_publisher<T: Message>(&self, mut publisher: Publisher<T>) -> bool {
    if publisher.node_id != self.id || publisher.released {
      return false;
    }
    let removed = self
      .bus
      .remove_publisher(&publisher.topic, publisher.id, self.id);
    publisher.released = true;
    debug!("节点 {} 销毁发布者 {}: {}", self.name, publisher.topic, removed);
    removed
  }

  /// 销毁订阅；句柄不属于本节点或已被释放时返回 `false`
  pub fn destroy_subscription(&self, mut subscription: Subscription) -> bool {
    if subscription.node_id != self.id || subscription.released {
      return false;
    }
    let removed = self
      .bus
      .remove_subscriber(&subscription.topic, subscription.id, self.id);
    subscription.released = true;
    debug!("节点 {} 销毁订阅 {}: {}", self.name, subscription.topic, removed);
    removed
  }
}

pub struct Publisher<T> {
  id: u64,
  node_id: u64,
  topic: String,
  bus: Bus,
  released: bool,
  _marker: PhantomData<fn(T)>,
}

impl<T: Message> Publisher<T> {
  pub fn topic(&self) -> &str {
    &self.topic
  }

  pub fn publish(&self, message: &T) -> Result<Delivery, TransportError> {
    self
      .bus
      .publish(&self.topic, self.id, Arc::new(message.clone()))
  }
}

impl<T> Drop for Publisher<T> {
  fn drop(&mut self) {
    if !self.released {
      self.bus.remove_publisher(&self.topic, self.id, self.node_id);
    }
  }
}

pub struct Subscription {
  id: u64,
  node_id: u64,
  topic: String,
  bus: Bus,
  released: bool,
}

impl Subscription {
  pub fn topic(&self) -> &str {
    &self.topic
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if !self.released {
      self.bus.remove_subscriber(&self.topic, self.id, self.node_id);
    }
  }
}

/// 订阅消息的收件箱，只由创建它的线程读取
pub struct Inbox<T> {
  receiver: Receiver<Envelope>,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Message> Inbox<T> {
  fn unpack(envelope: Envelope) -> Option<(String, T)> {
    match envelope.payload.downcast_ref::<T>() {
      Some(message) => Some((envelope.topic, message.clone())),
      None => {
        warn!("话题 {} 收到类型不符的消息", envelope.topic);
        None
      }
    }
  }

  /// 最多等待 `timeout`；所有订阅都已销毁时同样等满 `timeout` 再返回
  pub fn recv_timeout(&self, timeout: Duration) -> Option<(String, T)> {
    match self.receiver.recv_timeout(timeout) {
      Ok(envelope) => Self::unpack(envelope),
      Err(RecvTimeoutError::Timeout) => None,
      Err(RecvTimeoutError::Disconnected) => {
        std::thread::sleep(timeout);
        None
      }
    }
  }

  pub fn try_recv(&self) -> Option<(String, T)> {
    match self.receiver.try_recv() {
      Ok(envelope) => Self::unpack(envelope),
      Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
    }
  }

  /// 取出当前队列中的全部消息
  pub fn drain(&self) -> Vec<(String, T)> {
    std::iter::from_fn(|| self.receiver.try_recv().ok())
      .filter_map(Self::unpack)
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::message::{AprilTagDetectionArray, CameraInfo};

  fn info() -> CameraInfo {
    serde_json::from_str(r#"{ "width": 2, "height": 2, "K": [1, 0, 1, 0, 1, 1, 0, 0, 1] }"#)
      .unwrap()
  }

  #[test]
  fn publish_without_subscriber_is_dropped() {
    let bus = Bus::new();
    let node = bus.create_node("driver").unwrap();
    let publisher = node
      .create_publisher::<CameraInfo>("/ns/camera_info", Qos::sensor_data())
      .unwrap();
    let delivery = publisher.publish(&info()).unwrap();
    assert_eq!(delivery, Delivery::default());
  }

  #[test]
  fn best_effort_drops_when_queue_is_full() {
    let bus = Bus::new();
    let node = bus.create_node("driver").unwrap();
    let publisher = node
      .create_publisher::<CameraInfo>("camera_info", Qos::sensor_data())
      .unwrap();
    let (_sub, inbox) = node
      .create_subscription::<CameraInfo>("camera_info", Qos::sensor_data().with_depth(2))
      .unwrap();

    let mut dropped = 0;
    for _ in 0..5 {
      dropped += publisher.publish(&info()).unwrap().dropped;
    }
    assert_eq!(dropped, 3);
    assert_eq!(inbox.drain().len(), 2);
  }

  #[test]
  fn grouped_subscriptions_share_one_inbox() {
    let bus = Bus::new();
    let node = bus.create_node("driver").unwrap();
    let a = node
      .create_publisher::<AprilTagDetectionArray>("tag_detections_CPU", Qos::reliable(10))
      .unwrap();
    let b = node
      .create_publisher::<AprilTagDetectionArray>("tag_detections_CUDA", Qos::reliable(10))
      .unwrap();
    let (subs, inbox) = node
      .create_subscriptions::<AprilTagDetectionArray>(
        &["tag_detections_CPU", "tag_detections_CUDA"],
        Qos::reliable(10),
      )
      .unwrap();
    assert_eq!(subs.len(), 2);

    a.publish(&AprilTagDetectionArray::default()).unwrap();
    b.publish(&AprilTagDetectionArray::default()).unwrap();
    let mut topics = inbox.drain().into_iter().map(|(t, _)| t).collect::<Vec<_>>();
    topics.sort();
    assert_eq!(topics, ["/tag_detections_CPU", "/tag_detections_CUDA"]);
  }

  #[test]
  fn type_mismatch_is_rejected() {
    let bus = Bus::new();
    let node = bus.create_node("driver").unwrap();
    let _publisher = node
      .create_publisher::<CameraInfo>("topic", Qos::sensor_data())
      .unwrap();
    let result = node.create_subscription::<AprilTagDetectionArray>("topic", Qos::sensor_data());
    assert!(matches!(result, Err(TransportError::TypeMismatch { .. })));
  }

  #[test]
  fn failed_group_registration_rolls_back() {
    let bus = Bus::new();
    let node = bus.create_node("driver").unwrap();
    let _publisher = node
      .create_publisher::<CameraInfo>("/taken", Qos::sensor_data())
      .unwrap();
    let result =
      node.create_subscriptions::<AprilTagDetectionArray>(&["/free", "/taken"], Qos::sensor_data());
    assert!(result.is_err());
    assert_eq!(bus.subscriber_count("/free"), 0);
  }

  #[test]
  fn destroy_reports_ownership_and_release() {
    let bus = Bus::new();
    let owner = bus.create_node("owner").unwrap();
    let other = bus.create_node("other").unwrap();

    let publisher = owner
      .create_publisher::<CameraInfo>("camera_info", Qos::sensor_data())
      .unwrap();
    assert!(!other.destroy_publisher(publisher));
    // 非所属节点销毁失败后，句柄析构仍会释放注册
    assert_eq!(bus.publisher_count("/camera_info"), 0);

    let publisher = owner
      .create_publisher::<CameraInfo>("camera_info", Qos::sensor_data())
      .unwrap();
    assert_eq!(bus.publisher_count("/camera_info"), 1);
    assert!(owner.destroy_publisher(publisher));
    assert_eq!(bus.publisher_count("/camera_info"), 0);

    let (sub, _inbox) = owner
      .create_subscription::<CameraInfo>("camera_info", Qos::sensor_data())
      .unwrap();
    assert!(owner.destroy_subscription(sub));
    assert_eq!(bus.subscriber_count("/camera_info"), 0);
  }

  #[test]
  fn transient_local_latches_only_for_transient_local_subscriber() {
    let bus = Bus::new();
    let node = bus.create_node("driver").unwrap();
    let qos = Qos::reliable(1).transient_local();
    let publisher = node.create_publisher::<CameraInfo>("latched", qos).unwrap();
    publisher.publish(&info()).unwrap();

    let (_sub, inbox) = node.create_subscription::<CameraInfo>("latched", qos).unwrap();
    assert!(inbox.try_recv().is_some());

    let (_volatile, inbox) = node
      .create_subscription::<CameraInfo>("latched", Qos::sensor_data())
      .unwrap();
    assert!(inbox.try_recv().is_none());
  }

  #[test]
  fn latched_message_released_with_last_publisher() {
    let bus = Bus::new();
    let node = bus.create_node("driver").unwrap();
    let qos = Qos::reliable(1).transient_local();
    let publisher = node.create_publisher::<CameraInfo>("latched", qos).unwrap();
    publisher.publish(&info()).unwrap();
    assert!(node.destroy_publisher(publisher));
    assert!(bus.topic_names().is_empty());

    let (_sub, inbox) = node.create_subscription::<CameraInfo>("latched", qos).unwrap();
    assert!(inbox.try_recv().is_none());
  }

  #[test]
  fn rejects_bad_node_name_and_zero_depth() {
    let bus = Bus::new();
    assert!(bus.create_node("bad name").is_err());
    let node = bus.create_node("driver").unwrap();
    assert!(matches!(
      node.create_publisher::<CameraInfo>("x", Qos::sensor_data().with_depth(0)),
      Err(TransportError::ZeroDepth)
    ));
  }
}
