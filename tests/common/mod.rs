#![allow(dead_code)]

use dual_writer::context::RequestContext;
use dual_writer::dualwriter::{DualWriter, Mode};
use dual_writer::model::{Feature, FeatureSpec};
use dual_writer::storage::mock::{CallLog, SpyStorage};
use dual_writer::storage::{CreateOptions, MemoryStore, Storage};
use std::sync::Arc;

/// A dual writer over two spied memory stores sharing one call log.
pub struct Harness {
    pub writer: DualWriter<Feature>,
    pub legacy: Arc<SpyStorage<Feature>>,
    pub new: Arc<SpyStorage<Feature>>,
    pub log: CallLog,
}

pub fn harness(mode: Mode) -> Harness {
    let (legacy_actor, legacy_client) = MemoryStore::<Feature>::new("legacy", 10);
    let (new_actor, new_client) = MemoryStore::<Feature>::new("unified", 10);
    tokio::spawn(legacy_actor.run());
    tokio::spawn(new_actor.run());

    let log = CallLog::default();
    let legacy = Arc::new(SpyStorage::new("LegacyStorage", Arc::new(legacy_client), log.clone()));
    let new = Arc::new(SpyStorage::new("Storage", Arc::new(new_client), log.clone()));
    let writer = DualWriter::new(legacy.clone(), new.clone(), mode);

    Harness { writer, legacy, new, log }
}

pub fn feature(name: &str) -> Feature {
    Feature::new("default", name).with_spec(FeatureSpec {
        description: format!("{} feature", name),
        stage: "experimental".to_string(),
        ..Default::default()
    })
}

/// Puts the same object in both stores behind the writer's back, then clears the log.
pub async fn seed(h: &Harness, obj: Feature) -> Feature {
    let ctx = RequestContext::background();
    let in_legacy = h
        .legacy
        .create(&ctx, obj, None, &CreateOptions::default())
        .await
        .expect("seed legacy");
    let mut copy = in_legacy.clone();
    copy.metadata.resource_version.clear();
    h.new
        .create(&ctx, copy, None, &CreateOptions::default())
        .await
        .expect("seed new");
    h.log.clear();
    in_legacy
}
