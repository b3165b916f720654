// 该文件是 Tanzhen （探针） 项目的一部分。
// src/container.rs - 检测节点容器
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

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  message::{AprilTagDetectionArray, CameraInfo, Image},
  model::{Detector, DetectorConfig, SquareDetectorError, SquareMarkerDetector},
  transport::{Bus, Inbox, Namespace, Publisher, Qos, TransportError},
};

pub const IMAGE_TOPIC: &str = "image";
pub const CAMERA_INFO_TOPIC: &str = "camera_info";
pub const DETECTIONS_TOPIC: &str = "tag_detections";

const NODE_POLL: Duration = Duration::from_millis(20);
const PAIRING_WINDOW: usize = 10;

#[derive(Error, Debug)]
pub enum ContainerError {
  #[error("总线错误: {0}")]
  Transport(#[from] TransportError),
  #[error("无法创建节点线程 {name}: {source}")]
  Spawn {
    name: String,
    #[source]
    source: std::io::Error,
  },
  #[error("节点 {0} 异常退出")]
  NodePanicked(String),
  #[error("检测器创建失败: {0}")]
  Detector(#[from] SquareDetectorError),
}

/// 加载到容器中的节点描述
#[derive(Debug, Clone)]
pub struct ComposableNode {
  pub name: String,
  pub namespace: Namespace,
  /// 节点内话题名到实际话题名的映射
  pub remappings: BTreeMap<String, String>,
}

impl ComposableNode {
  pub fn new(name: &str) -> Self {
    ComposableNode {
      name: name.to_string(),
      namespace: Namespace::root(),
      remappings: BTreeMap::new(),
    }
  }

  pub fn with_namespace(mut self, namespace: Namespace) -> Self {
    self.namespace = namespace;
    self
  }

  pub fn with_remapping(mut self, from: &str, to: &str) -> Self {
    self.remappings.insert(from.to_string(), to.to_string());
    self
  }

  pub fn topic(&self, name: &str) -> Result<String, TransportError> {
    let name = self.remappings.get(name).map(String::as_str).unwrap_or(name);
    self.namespace.resolve(name)
  }
}

struct LoadedNode {
  name: String,
  stop: Arc<AtomicBool>,
  handle: Option<JoinHandle<()>>,
}

/// 每个节点独占一个线程，节点之间只通过总线通信
pub struct Container {
  name: String,
  bus: Bus,
  nodes: Vec<LoadedNode>,
}

impl Container {
  pub fn launch(bus: &Bus, name: &str) -> Self {
    info!("启动容器 {}", name);
    Container {
      name: name.to_string(),
      bus: bus.clone(),
      nodes: Vec::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn node_names(&self) -> Vec<&str> {
    self.nodes.iter().map(|node| node.name.as_str()).collect()
  }

  /// 返回时节点已完成订阅
  pub fn load_node<D>(&mut self, description: ComposableNode, detector: D) -> Result<(), ContainerError>
  where
    D: Detector + Send + 'static,
  {
    let node = self.bus.create_node(&description.name)?;
    let image_topic = description.topic(IMAGE_TOPIC)?;
    let info_topic = description.topic(CAMERA_INFO_TOPIC)?;
    let output_topic = description.topic(DETECTIONS_TOPIC)?;

    let (image_sub, images) = node.create_subscription::<Image>(&image_topic, Qos::sensor_data())?;
    let (info_sub, infos) =
      node.create_subscription::<CameraInfo>(&info_topic, Qos::sensor_data())?;
    let publisher = node.create_publisher::<AprilTagDetectionArray>(&output_topic, Qos::reliable(10))?;

    let stop = Arc::new(AtomicBool::new(false));
    let worker = NodeWorker {
      name: description.name.clone(),
      detector,
      images,
      infos,
      publisher,
      stop: stop.clone(),
    };

    let handle = thread::Builder::new()
      .name(format!("{}/{}", self.name, description.name))
      .spawn(move || {
        worker.run();
        node.destroy_subscription(image_sub);
        node.destroy_subscription(info_sub);
      })
      .map_err(|source| ContainerError::Spawn {
        name: description.name.clone(),
        source,
      })?;

    info!(
      "容器 {} 加载节点 {}: {} + {} -> {}",
      self.name, description.name, image_topic, info_topic, output_topic
    );
    self.nodes.push(LoadedNode {
      name: description.name,
      stop,
      handle: Some(handle),
    });
    Ok(())
  }

  /// 通知所有节点退出并等待线程结束
  pub fn shutdown(&mut self) -> Result<(), ContainerError> {
    for node in &self.nodes {
      node.stop.store(true, Ordering::Release);
    }
    let mut panicked = None;
    for node in &mut self.nodes {
      if let Some(handle) = node.handle.take() {
        if handle.join().is_err() {
          error!("节点 {} 线程异常退出", node.name);
          panicked.get_or_insert_with(|| node.name.clone());
        } else {
          debug!("节点 {} 已退出", node.name);
        }
      }
    }
    self.nodes.clear();
    match panicked {
      Some(name) => Err(ContainerError::NodePanicked(name)),
      None => Ok(()),
    }
  }
}

impl Drop for Container {
  fn drop(&mut self) {
    if let Err(e) = self.shutdown() {
      error!("关闭容器 {} 失败: {}", self.name, e);
    }
  }
}

/// 为每个后端加载一个方形标记检测节点，返回各节点的输出话题
///
/// 多个后端时输出话题为 `tag_detections_<后端>`。
pub fn launch_apriltag(
  bus: &Bus,
  namespace: &Namespace,
  config: &DetectorConfig,
) -> Result<(Container, Vec<String>), ContainerError> {
  let mut container = Container::launch(bus, "apriltag_container");
  let mut topics = Vec::with_capacity(config.backends.len());
  for backend in &config.backends {
    let detector = SquareMarkerDetector::from_config(config.clone().with_backends(&[*backend]))?;
    let mut node = ComposableNode::new(&format!("apriltag_{}", backend.as_str().to_lowercase()))
      .with_namespace(namespace.clone());
    let topic = if config.backends.len() > 1 {
      let topic = format!("{}_{}", DETECTIONS_TOPIC, backend.as_str());
      node = node.with_remapping(DETECTIONS_TOPIC, &topic);
      topic
    } else {
      DETECTIONS_TOPIC.to_string()
    };
    container.load_node(node, detector)?;
    topics.push(topic);
  }
  Ok((container, topics))
}

struct NodeWorker<D> {
  name: String,
  detector: D,
  images: Inbox<Image>,
  infos: Inbox<CameraInfo>,
  publisher: Publisher<AprilTagDetectionArray>,
  stop: Arc<AtomicBool>,
}

impl<D: Detector> NodeWorker<D> {
  fn run(self) {
    let mut infos: VecDeque<CameraInfo> = VecDeque::with_capacity(PAIRING_WINDOW);
    let mut pending: VecDeque<Image> = VecDeque::with_capacity(PAIRING_WINDOW);

    while !self.stop.load(Ordering::Acquire) {
      for (_, info) in self.infos.drain() {
        if infos.len() == PAIRING_WINDOW {
          infos.pop_front();
        }
        infos.push_back(info);
      }

      if let Some((_, image)) = self.images.recv_timeout(NODE_POLL) {
        if pending.len() == PAIRING_WINDOW {
          debug!("节点 {} 丢弃未配对的图像", self.name);
          pending.pop_front();
        }
        pending.push_back(image);
      }

      // 以最新的同时间戳标定配对
      while let Some(index) = pending
        .iter()
        .position(|image| infos.iter().any(|info| info.header.stamp == image.header.stamp))
      {
        let Some(image) = pending.remove(index) else {
          break;
        };
        let Some(info) = infos
          .iter()
          .rev()
          .find(|info| info.header.stamp == image.header.stamp)
        else {
          break;
        };
        self.process(&image, info);
      }
    }
    debug!("节点 {} 停止", self.name);
  }

  fn process(&self, image: &Image, info: &CameraInfo) {
    let detections = match self.detector.detect(image, info) {
      Ok(detections) => detections,
      Err(e) => {
        error!("节点 {} 检测失败: {}", self.name, e);
        return;
      }
    };
    let message = AprilTagDetectionArray {
      header: image.header.clone(),
      detections,
    };
    match self.publisher.publish(&message) {
      Ok(delivery) => debug!(
        "节点 {} 发布 {} 个检测结果到 {}: {:?}",
        self.name,
        message.len(),
        self.publisher.topic(),
        delivery
      ),
      Err(e) => warn!("节点 {} 发布失败: {}", self.name, e),
    }
  }
}
