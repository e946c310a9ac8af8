mod common;

use common::{feature, harness, seed};
use dual_writer::context::RequestContext;
use dual_writer::dualwriter::{DualWriteError, Mode, StoreKind};
use dual_writer::model::Feature;
use dual_writer::storage::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, ObjectKey, Preconditions, ReplaceObject, Resource, Storage,
    UpdateFn, UpdateOptions, ValidationError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_update_is_resolved_once_for_both_stores() {
    let h = harness(Mode::Mode2);
    let ctx = RequestContext::background();
    let existing = seed(&h, feature("counted")).await;

    let resolutions = Arc::new(AtomicUsize::new(0));
    let counter = resolutions.clone();
    let update = UpdateFn::new(move |old: Option<&Feature>| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let mut obj = old.cloned().ok_or_else(|| ValidationError::new("missing"))?;
        obj.spec.description = format!("resolution #{}", n);
        Ok(obj)
    });

    let (updated, created) = h
        .writer
        .update(&ctx, &existing.key(), &update, None, None, false, &UpdateOptions::default())
        .await
        .unwrap();

    assert!(!created);
    assert_eq!(resolutions.load(Ordering::SeqCst), 1);
    assert_eq!(updated.spec.description, "resolution #1");

    let in_new = h.new.get(&ctx, &existing.key(), &GetOptions::default()).await.unwrap();
    assert_eq!(in_new.spec.description, "resolution #1");
}

#[tokio::test]
async fn test_caller_version_refers_to_read_store() {
    let h = harness(Mode::Mode3);
    let ctx = RequestContext::background();

    // Push the legacy store's version counter ahead so the copies disagree on versions.
    h.legacy
        .create(&ctx, feature("padding"), None, &CreateOptions::default())
        .await
        .unwrap();
    let existing = seed(&h, feature("versioned")).await;

    let read = h.writer.get(&ctx, &existing.key(), &GetOptions::default()).await.unwrap();
    let in_legacy = h.legacy.get(&ctx, &existing.key(), &GetOptions::default()).await.unwrap();
    assert_ne!(read.resource_version(), in_legacy.resource_version());

    let mut changed = read.clone();
    changed.spec.stage = "GA".to_string();
    let (updated, _) = h
        .writer
        .update(&ctx, &read.key(), &ReplaceObject(changed), None, None, false, &UpdateOptions::default())
        .await
        .expect("version read from the authoritative store is accepted");

    assert_eq!(updated.spec.stage, "GA");
    let in_legacy = h.legacy.get(&ctx, &existing.key(), &GetOptions::default()).await.unwrap();
    assert_eq!(in_legacy.spec.stage, "GA");
}

#[tokio::test]
async fn test_update_validation_rejects_before_writes() {
    let h = harness(Mode::Mode2);
    let ctx = RequestContext::background();
    let existing = seed(&h, feature("guarded")).await;

    let update = UpdateFn::patch(|f: &mut Feature| f.spec.stage = "".to_string());
    let require_stage = |new: &Feature, _old: &Feature| {
        if new.spec.stage.is_empty() {
            Err(ValidationError::new("stage is required"))
        } else {
            Ok(())
        }
    };

    let err = h
        .writer
        .update(
            &ctx,
            &existing.key(),
            &update,
            None,
            Some(&require_stage),
            false,
            &UpdateOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err, DualWriteError::Validation(ValidationError::new("stage is required")));
    assert_eq!(h.log.calls(), vec!["LegacyStorage.Get"]);
}

#[tokio::test]
async fn test_update_missing_without_create_is_not_found() {
    let h = harness(Mode::Mode2);
    let ctx = RequestContext::background();
    let key = ObjectKey::new("default", "absent");

    let err = h
        .writer
        .update(&ctx, &key, &ReplaceObject(feature("absent")), None, None, false, &UpdateOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.failed_store(), Some(StoreKind::Legacy));
}

#[tokio::test]
async fn test_force_allow_create_creates_in_both_stores() {
    let h = harness(Mode::Mode2);
    let ctx = RequestContext::background();
    let key = ObjectKey::new("default", "upserted");

    let (obj, created) = h
        .writer
        .update(&ctx, &key, &ReplaceObject(feature("upserted")), None, None, true, &UpdateOptions::default())
        .await
        .unwrap();

    assert!(created);
    assert_eq!(obj.key(), key);
    assert!(h.legacy.get(&ctx, &key, &GetOptions::default()).await.is_ok());
    assert!(h.new.get(&ctx, &key, &GetOptions::default()).await.is_ok());
}

#[tokio::test]
async fn test_delete_precondition_checked_against_read_store() {
    let h = harness(Mode::Mode2);
    let ctx = RequestContext::background();
    let existing = seed(&h, feature("precise")).await;

    let stale = DeleteOptions {
        preconditions: Some(Preconditions {
            uid: None,
            resource_version: Some("999".to_string()),
        }),
        ..Default::default()
    };
    let err = h
        .writer
        .delete(&ctx, &existing.key(), None, &stale)
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let current = DeleteOptions {
        preconditions: Some(Preconditions {
            uid: Some(existing.metadata.uid.clone()),
            resource_version: Some(existing.resource_version().to_string()),
        }),
        ..Default::default()
    };
    let (deleted, done) = h.writer.delete(&ctx, &existing.key(), None, &current).await.unwrap();
    assert!(done);
    assert_eq!(deleted.key(), existing.key());
    assert!(h.new.get(&ctx, &existing.key(), &GetOptions::default()).await.is_err());
}

#[tokio::test]
async fn test_mode3_stale_delete_leaves_legacy_untouched() {
    let h = harness(Mode::Mode3);
    let ctx = RequestContext::background();
    let existing = seed(&h, feature("precise")).await;

    let stale = DeleteOptions {
        preconditions: Some(Preconditions {
            uid: None,
            resource_version: Some("999".to_string()),
        }),
        ..Default::default()
    };
    let err = h
        .writer
        .delete(&ctx, &existing.key(), None, &stale)
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert!(!err.is_partial());
    assert_eq!(err.failed_store(), Some(StoreKind::New));
    assert_eq!(h.log.calls(), vec!["Storage.Get"]);
    assert!(h.legacy.get(&ctx, &existing.key(), &GetOptions::default()).await.is_ok());
    assert!(h.new.get(&ctx, &existing.key(), &GetOptions::default()).await.is_ok());

    let in_new = h.new.get(&ctx, &existing.key(), &GetOptions::default()).await.unwrap();
    let current = DeleteOptions {
        preconditions: Some(Preconditions {
            uid: None,
            resource_version: Some(in_new.resource_version().to_string()),
        }),
        ..Default::default()
    };
    let (_, done) = h.writer.delete(&ctx, &existing.key(), None, &current).await.unwrap();
    assert!(done);
    assert!(h.legacy.get(&ctx, &existing.key(), &GetOptions::default()).await.is_err());
    assert!(h.new.get(&ctx, &existing.key(), &GetOptions::default()).await.is_err());
}

#[tokio::test]
async fn test_mode3_stale_delete_of_missing_object_is_not_found() {
    let h = harness(Mode::Mode3);
    let ctx = RequestContext::background();

    let stale = DeleteOptions {
        preconditions: Some(Preconditions {
            uid: None,
            resource_version: Some("999".to_string()),
        }),
        ..Default::default()
    };
    let err = h
        .writer
        .delete(&ctx, &ObjectKey::new("default", "ghost"), None, &stale)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(h.legacy.counts("LegacyStorage.Delete"), 0);
}

#[tokio::test]
async fn test_mode3_stale_delete_collection_leaves_both_stores() {
    let h = harness(Mode::Mode3);
    let ctx = RequestContext::background();
    for name in ["a", "b"] {
        seed(&h, feature(name)).await;
    }

    let stale = DeleteOptions {
        preconditions: Some(Preconditions {
            uid: None,
            resource_version: Some("999".to_string()),
        }),
        ..Default::default()
    };
    let err = h
        .writer
        .delete_collection(&ctx, None, &stale, &ListOptions::in_namespace("default"))
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert!(!err.is_partial());
    assert_eq!(h.log.calls(), vec!["Storage.List"]);
    for store in [&h.legacy, &h.new] {
        let left = store.list(&ctx, &ListOptions::default()).await.unwrap();
        assert_eq!(left.items.len(), 2);
    }
}

#[tokio::test]
async fn test_delete_collection_by_label() {
    let h = harness(Mode::Mode2);
    let ctx = RequestContext::background();
    for (name, team) in [("a", "search"), ("b", "search"), ("c", "alerting")] {
        let mut obj = feature(name);
        obj.metadata = obj.metadata.with_label("team", team);
        seed(&h, obj).await;
    }

    let mut selector = ListOptions::in_namespace("default");
    selector.label_selector.insert("team".to_string(), "search".to_string());
    let removed = h
        .writer
        .delete_collection(&ctx, None, &DeleteOptions::default(), &selector)
        .await
        .unwrap();

    assert_eq!(removed.items.len(), 2);
    for store in [&h.legacy, &h.new] {
        let left = store.list(&ctx, &ListOptions::default()).await.unwrap();
        assert_eq!(left.items.len(), 1);
        assert_eq!(left.items[0].metadata.name, "c");
    }
}
