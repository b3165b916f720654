// 该文件是 Tanzhen （探针） 项目的一部分。
// tests/backends_compare.rs - 多后端结果一致性测试
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

mod common;

use tanzhen::{
  FromUrl,
  container::launch_apriltag,
  model::DetectorConfig,
  task::Task,
  transport::Bus,
  verify::{BackendsCompareCheck, GroundTruthCheck},
};
use url::Url;

#[test]
fn cpu_and_cuda_agree() {
  common::init_logging();
  let fixture = common::apriltag0();
  let config =
    DetectorConfig::from_url(&Url::parse("apriltag://?size=0.22&max_tags=64&tile_size=4&backends=CPU,CUDA").unwrap())
      .unwrap();

  let bus = Bus::new();
  let driver = bus.create_node("driver").unwrap();
  let namespace = common::namespace("backends");
  let (_container, topics) = launch_apriltag(&bus, &namespace, &config).unwrap();
  assert_eq!(topics, ["tag_detections_CPU", "tag_detections_CUDA"]);

  let verifier = (
    BackendsCompareCheck::new(&topics),
    GroundTruthCheck::new(&topics[1], fixture.ground_truth_or_default()),
  );
  let outcome = common::task(&namespace)
    .with_output_topics(&topics)
    .accept_multiple_messages(true)
    .run_task(&fixture, &driver, &verifier)
    .unwrap();

  for topic in &topics {
    assert!(!outcome.received.messages(topic).is_empty(), "{topic}");
  }
  assert_eq!(outcome.received.ignored(), 0);
}
