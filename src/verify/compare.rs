// 该文件是 Tanzhen （探针） 项目的一部分。
// src/verify/compare.rs - 与真值或其他后端比较
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

use tracing::{debug, info};

use crate::{
  message::{AprilTagDetection, AprilTagDetectionArray},
  task::Received,
  verify::{
    Category, ExpectedDetection, GroundTruth, Mismatch, Report, Tolerance, Verify, VerifyError,
    within,
  },
};

/// 第一个收到的消息，且至少包含一个检测结果
fn first_with_detections<'a>(
  received: &'a Received,
  topic: &str,
) -> Result<&'a AprilTagDetectionArray, VerifyError> {
  let message = received
    .first(topic)
    .ok_or_else(|| VerifyError::MissingTopic(topic.to_string()))?;
  if message.is_empty() {
    return Err(VerifyError::NoDetections {
      topic: topic.to_string(),
      min: 1,
    });
  }
  Ok(message)
}

struct Comparison<'a> {
  topic: &'a str,
  index: usize,
  actual: &'a AprilTagDetection,
  report: &'a mut Report,
}

impl Comparison<'_> {
  fn mismatch(&mut self, category: Category, field: String, actual: String, expected: String, delta: Option<f64>) {
    self.report.push(Mismatch {
      topic: self.topic.to_string(),
      index: self.index,
      id: self.actual.id,
      category,
      field,
      actual,
      expected,
      delta,
    });
  }

  fn value(&mut self, category: Category, field: String, actual: f64, expected: f64, delta: f64) {
    if !within(actual, expected, delta) {
      self.mismatch(
        category,
        field,
        actual.to_string(),
        expected.to_string(),
        Some(delta),
      );
    }
  }

  /// 每一项独立比较，全部不一致项都记入报告
  fn run(&mut self, expected: &ExpectedDetection, tolerance: &Tolerance) {
    let actual = self.actual;
    if actual.id != expected.id {
      self.mismatch(
        Category::Identity,
        "id".into(),
        actual.id.to_string(),
        expected.id.to_string(),
        None,
      );
    }
    if actual.family != expected.family {
      self.mismatch(
        Category::Identity,
        "family".into(),
        actual.family.clone(),
        expected.family.clone(),
        None,
      );
    }

    let axes = ["x", "y"];
    let center = [actual.center.x, actual.center.y];
    for (axis, (a, e)) in axes.iter().zip(center.iter().zip(expected.center)) {
      self.value(Category::Center, format!("center.{axis}"), *a, e, tolerance.pixel);
    }

    for (i, (corner, e)) in actual.corners.iter().zip(expected.corners).enumerate() {
      let corner = [corner.x, corner.y];
      for (axis, (a, e)) in axes.iter().zip(corner.iter().zip(e)) {
        self.value(
          Category::Corners,
          format!("corners[{i}].{axis}"),
          *a,
          e,
          tolerance.pixel,
        );
      }
    }

    let pose = &actual.pose.pose;
    let translation = pose.position.to_array();
    for (axis, (a, e)) in ["x", "y", "z"]
      .iter()
      .zip(translation.iter().zip(expected.translation))
    {
      self.value(
        Category::Translation,
        format!("position.{axis}"),
        *a,
        e,
        tolerance.translation,
      );
    }

    let orientation = pose.orientation.to_array();
    for (axis, (a, e)) in ["x", "y", "z", "w"]
      .iter()
      .zip(orientation.iter().zip(expected.orientation))
    {
      self.value(
        Category::Orientation,
        format!("orientation.{axis}"),
        *a,
        e,
        tolerance.quaternion,
      );
    }
  }
}

fn compare_detection(
  topic: &str,
  index: usize,
  actual: &AprilTagDetection,
  expected: &ExpectedDetection,
  tolerance: &Tolerance,
  report: &mut Report,
) {
  Comparison {
    topic,
    index,
    actual,
    report,
  }
  .run(expected, tolerance);
}

fn finish(report: Report) -> Result<(), VerifyError> {
  if report.is_empty() {
    Ok(())
  } else {
    Err(VerifyError::Mismatches(report))
  }
}

/// 与真值比较收到的检测结果
#[derive(Debug, Clone)]
pub struct GroundTruthCheck {
  pub topic: String,
  pub truth: GroundTruth,
  pub tolerance: Tolerance,
}

impl GroundTruthCheck {
  pub fn new(topic: &str, truth: GroundTruth) -> Self {
    GroundTruthCheck {
      topic: topic.to_string(),
      truth,
      tolerance: Tolerance::default(),
    }
  }

  pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
    self.tolerance = tolerance;
    self
  }
}

impl Verify for GroundTruthCheck {
  type Error = VerifyError;

  fn verify(&self, received: &Received) -> Result<(), Self::Error> {
    let message = first_with_detections(received, &self.topic)?;
    let mut report = Report::default();

    for (index, detection) in message.detections.iter().enumerate() {
      match self.truth.expected_for(detection.id) {
        Some(expected) => compare_detection(
          &self.topic,
          index,
          detection,
          expected,
          &self.tolerance,
          &mut report,
        ),
        None => report.push(Mismatch {
          topic: self.topic.clone(),
          index,
          id: detection.id,
          category: Category::Identity,
          field: "id".into(),
          actual: detection.id.to_string(),
          expected: "<无对应真值>".into(),
          delta: None,
        }),
      }
    }

    info!(
      "话题 {}: {} 个检测结果, {} 项不一致",
      self.topic,
      message.len(),
      report.len()
    );
    finish(report)
  }
}

/// 以第一个话题为基准，逐个比较其余话题的检测结果
#[derive(Debug, Clone)]
pub struct BackendsCompareCheck {
  pub topics: Vec<String>,
  pub tolerance: Tolerance,
}

impl BackendsCompareCheck {
  pub fn new<S: AsRef<str>>(topics: &[S]) -> Self {
    BackendsCompareCheck {
      topics: topics.iter().map(|t| t.as_ref().to_string()).collect(),
      tolerance: Tolerance::default(),
    }
  }
}

impl Verify for BackendsCompareCheck {
  type Error = VerifyError;

  fn verify(&self, received: &Received) -> Result<(), Self::Error> {
    let messages = self
      .topics
      .iter()
      .map(|topic| first_with_detections(received, topic).map(|message| (topic, message)))
      .collect::<Result<Vec<_>, _>>()?;

    let Some(((base_topic, base), rest)) = messages.split_first() else {
      return Ok(());
    };
    let baseline = base
      .detections
      .iter()
      .map(ExpectedDetection::from)
      .collect::<Vec<_>>();

    let mut report = Report::default();
    for (topic, message) in rest {
      if message.len() != baseline.len() {
        return Err(VerifyError::CountMismatch {
          topic: topic.to_string(),
          expected: baseline.len(),
          actual: message.len(),
        });
      }
      for (index, (detection, expected)) in message.detections.iter().zip(&baseline).enumerate() {
        compare_detection(topic, index, detection, expected, &self.tolerance, &mut report);
      }
      debug!("话题 {} 与基准 {} 比较完成", topic, base_topic);
    }
    finish(report)
  }
}

/// 每个话题至少 `min` 个检测结果
#[derive(Debug, Clone)]
pub struct DetectionCountCheck {
  pub topics: Vec<String>,
  pub min: usize,
}

impl DetectionCountCheck {
  pub fn new<S: AsRef<str>>(topics: &[S], min: usize) -> Self {
    DetectionCountCheck {
      topics: topics.iter().map(|t| t.as_ref().to_string()).collect(),
      min,
    }
  }
}

impl Verify for DetectionCountCheck {
  type Error = VerifyError;

  fn verify(&self, received: &Received) -> Result<(), Self::Error> {
    for topic in &self.topics {
      let message = received
        .first(topic)
        .ok_or_else(|| VerifyError::MissingTopic(topic.clone()))?;
      if message.len() < self.min {
        return Err(VerifyError::NoDetections {
          topic: topic.clone(),
          min: self.min,
        });
      }
    }
    Ok(())
  }
}
