// 该文件是 Tanzhen （探针） 项目的一部分。
// src/transport/bus.rs - 进程内话题总线
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

use std::any::Any;
use std::collections::HashMap;
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::transport::{Durability, Node, Qos, Reliability, TransportError};

pub(crate) type Payload = Arc<dyn Any + Send + Sync>;

pub(crate) struct Envelope {
  pub topic: String,
  pub payload: Payload,
}

const RELIABLE_RETRY_WINDOW: Duration = Duration::from_millis(500);
const RELIABLE_RETRY_STEP: Duration = Duration::from_millis(1);

/// 单次发布的投递结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
  pub delivered: usize,
  pub dropped: usize,
}

struct PublisherSlot {
  id: u64,
  node_id: u64,
  qos: Qos,
}

struct SubscriberSlot {
  id: u64,
  node_id: u64,
  qos: Qos,
  sender: SyncSender<Envelope>,
}

struct TopicEntry {
  type_name: &'static str,
  publishers: Vec<PublisherSlot>,
  subscribers: Vec<SubscriberSlot>,
  latched: Option<(Qos, Payload)>,
}

impl TopicEntry {
  fn new(type_name: &'static str) -> Self {
    TopicEntry {
      type_name,
      publishers: Vec::new(),
      subscribers: Vec::new(),
      latched: None,
    }
  }

  fn is_idle(&self) -> bool {
    self.publishers.is_empty() && self.subscribers.is_empty() && self.latched.is_none()
  }
}

#[derive(Default)]
struct BusState {
  topics: HashMap<String, TopicEntry>,
  next_id: u64,
}

impl BusState {
  fn next_id(&mut self) -> u64 {
    self.next_id += 1;
    self.next_id
  }

  fn entry(
    &mut self,
    topic: &str,
    type_name: &'static str,
  ) -> Result<&mut TopicEntry, TransportError> {
    let entry = self
      .topics
      .entry(topic.to_string())
      .or_insert_with(|| TopicEntry::new(type_name));
    if entry.type_name != type_name {
      return Err(TransportError::TypeMismatch {
        topic: topic.to_string(),
        registered: entry.type_name,
        requested: type_name,
      });
    }
    Ok(entry)
  }

  fn prune(&mut self, topic: &str) {
    if self.topics.get(topic).is_some_and(TopicEntry::is_idle) {
      self.topics.remove(topic);
    }
  }
}

/// 进程内的话题注册表
///
/// 克隆得到的句柄共享同一份状态。
#[derive(Clone, Default)]
pub struct Bus {
  state: Arc<Mutex<BusState>>,
}

impl Bus {
  pub fn new() -> Self {
    Bus::default()
  }

  pub fn create_node(&self, name: &str) -> Result<Node, TransportError> {
    Node::new(self.clone(), name)
  }

  fn lock(&self) -> Result<MutexGuard<'_, BusState>, TransportError> {
    self.state.lock().map_err(|_| TransportError::Poisoned)
  }

  pub(crate) fn add_publisher(
    &self,
    topic: &str,
    type_name: &'static str,
    node_id: u64,
    qos: Qos,
  ) -> Result<u64, TransportError> {
    let mut state = self.lock()?;
    let id = state.next_id();
    state.entry(topic, type_name)?.publishers.push(PublisherSlot { id, node_id, qos });
    debug!("注册发布者 {} -> {}", id, topic);
    Ok(id)
  }

  pub(crate) fn add_subscriber(
    &self,
    topic: &str,
    type_name: &'static str,
    node_id: u64,
    qos: Qos,
    sender: SyncSender<Envelope>,
  ) -> Result<u64, TransportError> {
    let mut state = self.lock()?;
    let id = state.next_id();
    let entry = state.entry(topic, type_name)?;

    if qos.durability == Durability::TransientLocal
      && let Some((latched_qos, payload)) = &entry.latched
      && Qos::is_compatible(latched_qos, &qos)
    {
      let envelope = Envelope {
        topic: topic.to_string(),
        payload: payload.clone(),
      };
      if sender.try_send(envelope).is_err() {
        warn!("话题 {} 的保留消息补发失败", topic);
      }
    }

    entry.subscribers.push(SubscriberSlot {
      id,
      node_id,
      qos,
      sender,
    });
    debug!("注册订阅者 {} <- {}", id, topic);
    Ok(id)
  }

  pub(crate) fn remove_publisher(&self, topic: &str, id: u64, node_id: u64) -> bool {
    let Ok(mut state) = self.lock() else {
      return false;
    };
    let removed = match state.topics.get_mut(topic) {
      Some(entry) => {
        let before = entry.publishers.len();
        entry
          .publishers
          .retain(|slot| !(slot.id == id && slot.node_id == node_id));
        // 保留消息随最后一个发布者一起释放
        if entry.publishers.is_empty() {
          entry.latched = None;
        }
        before != entry.publishers.len()
      }
      None => false,
    };
    state.prune(topic);
    removed
  }

  pub(crate) fn remove_subscriber(&self, topic: &str, id: u64, node_id: u64) -> bool {
    let Ok(mut state) = self.lock() else {
      return false;
    };
    let removed = match state.topics.get_mut(topic) {
      Some(entry) => {
        let before = entry.subscribers.len();
        entry
          .subscribers
          .retain(|slot| !(slot.id == id && slot.node_id == node_id));
        before != entry.subscribers.len()
      }
      None => false,
    };
    state.prune(topic);
    removed
  }

  pub(crate) fn publish(
    &self,
    topic: &str,
    publisher_id: u64,
    payload: Payload,
  ) -> Result<Delivery, TransportError> {
    let targets = {
      let mut state = self.lock()?;
      let entry = state
        .topics
        .get_mut(topic)
        .ok_or_else(|| TransportError::PublisherDestroyed(topic.to_string()))?;
      let qos = entry
        .publishers
        .iter()
        .find(|slot| slot.id == publisher_id)
        .map(|slot| slot.qos)
        .ok_or_else(|| TransportError::PublisherDestroyed(topic.to_string()))?;

      if qos.durability == Durability::TransientLocal {
        entry.latched = Some((qos, payload.clone()));
      }

      entry
        .subscribers
        .iter()
        .filter(|slot| Qos::is_compatible(&qos, &slot.qos))
        .map(|slot| {
          let reliable = qos.reliability == Reliability::Reliable
            && slot.qos.reliability == Reliability::Reliable;
          (slot.sender.clone(), reliable)
        })
        .collect::<Vec<_>>()
    };

    let mut delivery = Delivery::default();
    for (sender, reliable) in targets {
      let envelope = Envelope {
        topic: topic.to_string(),
        payload: payload.clone(),
      };
      let sent = if reliable {
        send_reliable(&sender, envelope)
      } else {
        sender.try_send(envelope).is_ok()
      };
      if sent {
        delivery.delivered += 1;
      } else {
        delivery.dropped += 1;
      }
    }

    if delivery.dropped > 0 {
      debug!("话题 {} 丢弃 {} 条消息", topic, delivery.dropped);
    }
    Ok(delivery)
  }

  pub fn topic_names(&self) -> Vec<String> {
    let mut names = match self.lock() {
      Ok(state) => state.topics.keys().cloned().collect::<Vec<_>>(),
      Err(_) => Vec::new(),
    };
    names.sort();
    names
  }

  pub fn subscriber_count(&self, topic: &str) -> usize {
    self
      .lock()
      .ok()
      .and_then(|state| state.topics.get(topic).map(|entry| entry.subscribers.len()))
      .unwrap_or(0)
  }

  pub fn publisher_count(&self, topic: &str) -> usize {
    self
      .lock()
      .ok()
      .and_then(|state| state.topics.get(topic).map(|entry| entry.publishers.len()))
      .unwrap_or(0)
  }
}

/// 队列满时在限定时间内重试，超时仍失败则放弃
fn send_reliable(sender: &SyncSender<Envelope>, envelope: Envelope) -> bool {
  let deadline = Instant::now() + RELIABLE_RETRY_WINDOW;
  let mut envelope = envelope;
  loop {
    match sender.try_send(envelope) {
      Ok(()) => return true,
      Err(TrySendError::Disconnected(_)) => return false,
      Err(TrySendError::Full(back)) => {
        if Instant::now() >= deadline {
          warn!("可靠投递超时，话题 {} 的消息被丢弃", back.topic);
          return false;
        }
        envelope = back;
        std::thread::sleep(RELIABLE_RETRY_STEP);
      }
    }
  }
}
