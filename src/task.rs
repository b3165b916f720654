// 该文件是 Tanzhen （探针） 项目的一部分。
// src/task.rs - 重复发布并等待检测结果的测试任务
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

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  container::{CAMERA_INFO_TOPIC, DETECTIONS_TOPIC, IMAGE_TOPIC},
  input::{Fixture, FixtureError},
  message::{AprilTagDetectionArray, CameraInfo, Image, Time},
  transport::{Delivery, Inbox, Namespace, Node, Publisher, Qos, Subscription, TransportError},
  verify::{Verify, VerifyError},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("创建通道失败: {0}")]
  Setup(#[source] TransportError),
  #[error("发布失败: {0}")]
  Publish(#[source] TransportError),
  #[error("测试用例错误: {0}")]
  Fixture(#[from] FixtureError),
  #[error("轮询周期必须大于零")]
  ZeroPollInterval,
  #[error("{:.1?} 内未收到话题 {} 的输出 (共 {iterations} 轮)", timeout, missing.join(", "))]
  Timeout {
    missing: Vec<String>,
    timeout: Duration,
    iterations: usize,
  },
  #[error("校验失败: {0}")]
  Verify(#[from] VerifyError),
  #[error(
    "拆除失败: {}{}",
    failed.join(", "),
    body.as_ref().map(|e| format!("; 测试主体同时失败: {e}")).unwrap_or_default()
  )]
  Teardown {
    failed: Vec<String>,
    body: Option<Box<TaskError>>,
  },
}

/// 按话题保存收到的检测结果，只由驱动线程修改
#[derive(Debug, Clone, Default)]
pub struct Received {
  messages: BTreeMap<String, Vec<AprilTagDetectionArray>>,
  accept_multiple: bool,
  ignored: usize,
}

impl Received {
  pub fn new(accept_multiple: bool) -> Self {
    Received {
      accept_multiple,
      ..Default::default()
    }
  }

  /// 单消息模式下，已有记录的话题忽略后续消息并返回 `false`
  pub fn insert(&mut self, topic: &str, message: AprilTagDetectionArray) -> bool {
    let slot = self.messages.entry(topic.to_string()).or_default();
    if !self.accept_multiple && !slot.is_empty() {
      self.ignored += 1;
      return false;
    }
    slot.push(message);
    true
  }

  pub fn first(&self, topic: &str) -> Option<&AprilTagDetectionArray> {
    self.messages.get(topic).and_then(|messages| messages.first())
  }

  pub fn messages(&self, topic: &str) -> &[AprilTagDetectionArray] {
    self.messages.get(topic).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn contains(&self, topic: &str) -> bool {
    self.messages.get(topic).is_some_and(|messages| !messages.is_empty())
  }

  pub fn has_all<S: AsRef<str>>(&self, topics: &[S]) -> bool {
    topics.iter().all(|topic| self.contains(topic.as_ref()))
  }

  pub fn missing<S: AsRef<str>>(&self, topics: &[S]) -> Vec<String> {
    topics
      .iter()
      .map(|topic| topic.as_ref())
      .filter(|topic| !self.contains(topic))
      .map(str::to_string)
      .collect()
  }

  pub fn topics(&self) -> impl Iterator<Item = &str> {
    self.messages.keys().map(String::as_str)
  }

  /// 被忽略的重复消息数
  pub fn ignored(&self) -> usize {
    self.ignored
  }
}

#[derive(Debug, Clone)]
pub struct Outcome {
  pub received: Received,
  pub iterations: usize,
  pub elapsed: Duration,
  pub delivery: Delivery,
}

struct Channels {
  image: Publisher<Image>,
  camera_info: Publisher<CameraInfo>,
  subscriptions: Vec<Subscription>,
  inbox: Inbox<AprilTagDetectionArray>,
  /// 完整话题名到短名称
  names: BTreeMap<String, String>,
}

impl Channels {
  fn create(node: &Node, task: &RetryPublishTask) -> Result<Self, TransportError> {
    let mut names = vec![IMAGE_TOPIC, CAMERA_INFO_TOPIC];
    names.extend(task.output_topics.iter().map(String::as_str));
    let lookup = task.namespace.lookup(&names)?;
    let topic = |name: &str| lookup.get(name).cloned().unwrap_or_default();

    let image = node.create_publisher::<Image>(&topic(IMAGE_TOPIC), task.stimulus_qos)?;
    let camera_info =
      node.create_publisher::<CameraInfo>(&topic(CAMERA_INFO_TOPIC), task.stimulus_qos)?;

    let outputs = task
      .output_topics
      .iter()
      .map(|name| topic(name))
      .collect::<Vec<_>>();
    let output_refs = outputs.iter().map(String::as_str).collect::<Vec<_>>();
    let (subscriptions, inbox) =
      node.create_subscriptions::<AprilTagDetectionArray>(&output_refs, task.result_qos)?;

    let names = task
      .output_topics
      .iter()
      .zip(outputs)
      .map(|(short, full)| (full, short.clone()))
      .collect();

    Ok(Channels {
      image,
      camera_info,
      subscriptions,
      inbox,
      names,
    })
  }

  /// 先销毁订阅再销毁发布者，返回失败的步骤
  fn teardown(self, node: &Node) -> Vec<String> {
    let mut failed = Vec::new();
    for subscription in self.subscriptions {
      let topic = subscription.topic().to_string();
      if !node.destroy_subscription(subscription) {
        error!("销毁订阅 {} 失败", topic);
        failed.push(format!("订阅 {}", topic));
      }
    }

    let topic = self.camera_info.topic().to_string();
    if !node.destroy_publisher(self.camera_info) {
      error!("销毁发布者 {} 失败", topic);
      failed.push(format!("发布者 {}", topic));
    }
    let topic = self.image.topic().to_string();
    if !node.destroy_publisher(self.image) {
      error!("销毁发布者 {} 失败", topic);
      failed.push(format!("发布者 {}", topic));
    }
    failed
  }
}

/// 按固定周期重复发布同一组激励，直到每个输出话题都收到消息
#[derive(Debug, Clone)]
pub struct RetryPublishTask {
  namespace: Namespace,
  timeout: Duration,
  poll_interval: Duration,
  output_topics: Vec<String>,
  accept_multiple: bool,
  mono8: bool,
  stimulus_qos: Qos,
  result_qos: Qos,
}

impl Default for RetryPublishTask {
  fn default() -> Self {
    RetryPublishTask {
      namespace: Namespace::default(),
      timeout: DEFAULT_TIMEOUT,
      poll_interval: DEFAULT_POLL_INTERVAL,
      output_topics: vec![DETECTIONS_TOPIC.to_string()],
      accept_multiple: false,
      mono8: false,
      stimulus_qos: Qos::sensor_data(),
      result_qos: Qos::reliable(10),
    }
  }
}

impl RetryPublishTask {
  pub fn with_namespace(mut self, namespace: Namespace) -> Self {
    self.namespace = namespace;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
    self.poll_interval = poll_interval;
    self
  }

  pub fn with_output_topics<S: AsRef<str>>(mut self, topics: &[S]) -> Self {
    self.output_topics = topics.iter().map(|t| t.as_ref().to_string()).collect();
    self
  }

  pub fn accept_multiple_messages(mut self, accept: bool) -> Self {
    self.accept_multiple = accept;
    self
  }

  /// 发布前把图像转换为 mono8
  pub fn with_mono8(mut self, mono8: bool) -> Self {
    self.mono8 = mono8;
    self
  }

  pub fn with_stimulus_qos(mut self, qos: Qos) -> Self {
    self.stimulus_qos = qos;
    self
  }

  pub fn with_result_qos(mut self, qos: Qos) -> Self {
    self.result_qos = qos;
    self
  }

  pub fn namespace(&self) -> &Namespace {
    &self.namespace
  }

  pub fn output_topics(&self) -> &[String] {
    &self.output_topics
  }

  /// 默认参数下不超过 200 轮；周期为零的任务不会运行
  pub fn max_iterations(&self) -> usize {
    if self.poll_interval.is_zero() {
      return 0;
    }
    self.timeout.as_nanos().div_ceil(self.poll_interval.as_nanos()) as usize
  }

  fn retry_publish(&self, channels: &Channels, fixture: &Fixture) -> Result<Outcome, TaskError> {
    let start = Instant::now();
    let deadline = start + self.timeout;
    let mut received = Received::new(self.accept_multiple);
    let mut delivery = Delivery::default();
    let mut iterations = 0;

    let mut image = fixture.image.clone();
    let mut camera_info = fixture.camera_info.clone();

    while Instant::now() < deadline {
      let iteration_start = Instant::now();
      iterations += 1;

      // 检测节点按时间戳配对图像与标定
      let stamp = Time::now();
      image.header.stamp = stamp;
      camera_info.header.stamp = stamp;
      let info_step = channels
        .camera_info
        .publish(&camera_info)
        .map_err(TaskError::Publish)?;
      let image_step = channels.image.publish(&image).map_err(TaskError::Publish)?;
      for step in [info_step, image_step] {
        delivery.delivered += step.delivered;
        delivery.dropped += step.dropped;
      }

      let window_end = (iteration_start + self.poll_interval).min(deadline);
      loop {
        let now = Instant::now();
        if now >= window_end || received.has_all(&self.output_topics) {
          break;
        }
        let Some((topic, message)) = channels.inbox.recv_timeout(window_end - now) else {
          continue;
        };
        let name = channels.names.get(&topic).map(String::as_str).unwrap_or(&topic);
        if !received.insert(name, message) {
          warn!("话题 {} 已有消息，忽略后续消息", name);
        }
      }

      debug!(
        "第 {} 轮: 已收到 {:?}, 投递 {:?}",
        iterations,
        received.topics().collect::<Vec<_>>(),
        delivery
      );

      if received.has_all(&self.output_topics) {
        let elapsed = start.elapsed();
        info!("{} 轮后收到全部输出, 耗时 {:.2?}", iterations, elapsed);
        return Ok(Outcome {
          received,
          iterations,
          elapsed,
          delivery,
        });
      }
    }

    Err(TaskError::Timeout {
      missing: received.missing(&self.output_topics),
      timeout: self.timeout,
      iterations,
    })
  }
}

impl<'a, V> Task<&'a Fixture, &'a Node, &'a V> for RetryPublishTask
where
  V: Verify<Error = VerifyError>,
{
  type Output = Outcome;
  type Error = TaskError;

  /// 测试主体结束后总会执行拆除，并检查每一步的结果
  fn run_task(
    self,
    fixture: &'a Fixture,
    node: &'a Node,
    verifier: &'a V,
  ) -> Result<Outcome, TaskError> {
    self.run_with_teardown(fixture, node, node, verifier)
  }
}

impl RetryPublishTask {
  /// 在 `node` 上创建通道，由 `teardown_node` 负责拆除
  fn run_with_teardown<V: Verify<Error = VerifyError>>(
    self,
    fixture: &Fixture,
    node: &Node,
    teardown_node: &Node,
    verifier: &V,
  ) -> Result<Outcome, TaskError> {
    info!(
      "开始测试用例 {}: 命名空间 {}, 超时 {:.1?}, 周期 {:.1?}",
      fixture.name, self.namespace, self.timeout, self.poll_interval
    );
    if self.poll_interval.is_zero() {
      return Err(TaskError::ZeroPollInterval);
    }
    let fixture = if self.mono8 {
      Cow::Owned(fixture.to_mono8()?)
    } else {
      Cow::Borrowed(fixture)
    };

    let channels = Channels::create(node, &self).map_err(TaskError::Setup)?;
    let body = self.retry_publish(&channels, &fixture).and_then(|outcome| {
      verifier.verify(&outcome.received)?;
      Ok(outcome)
    });
    let failed = channels.teardown(teardown_node);

    match (body, failed.is_empty()) {
      (Ok(outcome), true) => {
        info!("测试用例 {} 通过", fixture.name);
        Ok(outcome)
      }
      (Ok(_), false) => Err(TaskError::Teardown { failed, body: None }),
      (Err(e), true) => {
        error!("测试用例 {} 失败: {}", fixture.name, e);
        Err(e)
      }
      (Err(e), false) => Err(TaskError::Teardown {
        failed,
        body: Some(Box::new(e)),
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    container::launch_apriltag,
    model::DetectorConfig,
    transport::Bus,
    verify::{GroundTruth, GroundTruthCheck},
  };

  fn apriltag0() -> Fixture {
    Fixture::load(
      std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("test_cases")
        .join("apriltag0"),
    )
    .unwrap()
  }

  fn check() -> GroundTruthCheck {
    GroundTruthCheck::new(DETECTIONS_TOPIC, GroundTruth::apriltag0())
  }

  #[test]
  fn single_message_mode_keeps_first() {
    let mut received = Received::default();
    let first = AprilTagDetectionArray::default();
    let mut second = AprilTagDetectionArray::default();
    second.header.frame_id = "second".into();

    assert!(received.insert("tag_detections", first));
    assert!(!received.insert("tag_detections", second));
    assert_eq!(received.messages("tag_detections").len(), 1);
    assert_eq!(received.first("tag_detections").unwrap().header.frame_id, "");
    assert_eq!(received.ignored(), 1);
  }

  #[test]
  fn multiple_mode_keeps_all() {
    let mut received = Received::new(true);
    received.insert("a", AprilTagDetectionArray::default());
    received.insert("a", AprilTagDetectionArray::default());
    assert_eq!(received.messages("a").len(), 2);
    assert_eq!(received.missing(&["a", "b"]), ["b"]);
    assert!(!received.has_all(&["a", "b"]));
  }

  #[test]
  fn iteration_bound_rounds_up() {
    assert_eq!(RetryPublishTask::default().max_iterations(), 200);
    let task = RetryPublishTask::default()
      .with_timeout(Duration::from_millis(250))
      .with_poll_interval(Duration::from_millis(100));
    assert_eq!(task.max_iterations(), 3);
  }

  #[test]
  fn channels_are_namespaced_and_torn_down() {
    let bus = Bus::new();
    let node = bus.create_node("driver").unwrap();
    let task = RetryPublishTask::default()
      .with_namespace(Namespace::generate(&["unit"]).unwrap())
      .with_output_topics(&["tag_detections_CPU", "tag_detections_CUDA"]);

    let channels = Channels::create(&node, &task).unwrap();
    assert_eq!(channels.image.topic(), "/tanzhen_test/unit/image");
    assert_eq!(bus.subscriber_count("/tanzhen_test/unit/tag_detections_CUDA"), 1);
    assert_eq!(
      channels.names["/tanzhen_test/unit/tag_detections_CPU"],
      "tag_detections_CPU"
    );

    assert!(channels.teardown(&node).is_empty());
    assert!(bus.topic_names().is_empty());
  }

  #[test]
  fn teardown_on_foreign_node_reports_every_step() {
    let bus = Bus::new();
    let owner = bus.create_node("driver").unwrap();
    let other = bus.create_node("intruder").unwrap();
    let channels = Channels::create(&owner, &RetryPublishTask::default()).unwrap();
    let failed = channels.teardown(&other);
    assert_eq!(failed.len(), 3);
  }

  #[test]
  fn zero_poll_interval_is_rejected_before_setup() {
    let bus = Bus::new();
    let node = bus.create_node("driver").unwrap();
    let task = RetryPublishTask::default()
      .with_namespace(Namespace::generate(&["zero"]).unwrap())
      .with_poll_interval(Duration::ZERO);
    assert_eq!(task.max_iterations(), 0);

    let start = Instant::now();
    let result = task.run_task(&apriltag0(), &node, &check());
    assert!(matches!(result, Err(TaskError::ZeroPollInterval)));
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(bus.topic_names().is_empty());
  }

  #[test]
  fn failed_teardown_after_success_is_reported() {
    let bus = Bus::new();
    let owner = bus.create_node("driver").unwrap();
    let other = bus.create_node("intruder").unwrap();
    let namespace = Namespace::unique(&["teardown_ok"]).unwrap();
    let (_container, _) = launch_apriltag(&bus, &namespace, &DetectorConfig::default()).unwrap();

    let result = RetryPublishTask::default()
      .with_namespace(namespace)
      .with_timeout(Duration::from_secs(10))
      .run_with_teardown(&apriltag0(), &owner, &other, &check());
    match result {
      Err(TaskError::Teardown { failed, body }) => {
        assert_eq!(failed.len(), 3);
        assert!(body.is_none());
      }
      other => panic!("期望拆除失败, 实际 {other:?}"),
    }
  }

  #[test]
  fn failed_teardown_keeps_body_error() {
    let bus = Bus::new();
    let owner = bus.create_node("driver").unwrap();
    let other = bus.create_node("intruder").unwrap();

    let result = RetryPublishTask::default()
      .with_namespace(Namespace::unique(&["teardown_err"]).unwrap())
      .with_timeout(Duration::from_millis(150))
      .with_poll_interval(Duration::from_millis(50))
      .run_with_teardown(&apriltag0(), &owner, &other, &check());
    let Err(TaskError::Teardown { failed, body }) = result else {
      panic!("期望拆除失败");
    };
    assert_eq!(failed.len(), 3);
    assert!(failed.iter().any(|step| step.contains("tag_detections")));
    assert!(matches!(
      body.as_deref(),
      Some(TaskError::Timeout { missing, .. }) if missing == &["tag_detections"]
    ));
    // 句柄释放后注册随之移除
    assert!(bus.topic_names().is_empty());
  }
}
