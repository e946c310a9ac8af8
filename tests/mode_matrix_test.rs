mod common;

use common::{feature, harness, seed, Harness};
use dual_writer::context::RequestContext;
use dual_writer::dualwriter::Mode;
use dual_writer::storage::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, OperationKind, ReplaceObject, Resource, Storage,
    UpdateOptions,
};

/// Calls each store is expected to see, in order, for one operation.
fn expected_calls(mode: Mode, op: OperationKind) -> Vec<String> {
    let legacy = |op: &str| format!("LegacyStorage.{}", op);
    let new = |op: &str| format!("Storage.{}", op);
    let name = op.to_string();

    match (op, mode) {
        (OperationKind::Get | OperationKind::List, Mode::Mode0 | Mode::Mode1 | Mode::Mode2) => vec![legacy(&name)],
        (OperationKind::Get | OperationKind::List, Mode::Mode3 | Mode::Mode4) => vec![new(&name)],
        (_, Mode::Mode0) => vec![legacy(&name)],
        (_, Mode::Mode4) => vec![new(&name)],
        // Dual updates read their basis from the authoritative store first.
        (OperationKind::Update, Mode::Mode1 | Mode::Mode2) => vec![legacy("Get"), legacy(&name), new(&name)],
        (OperationKind::Update, Mode::Mode3) => vec![new("Get"), legacy(&name), new(&name)],
        (_, Mode::Mode1 | Mode::Mode2 | Mode::Mode3) => vec![legacy(&name), new(&name)],
    }
}

async fn run(h: &Harness, op: OperationKind) {
    let ctx = RequestContext::background();
    let existing = seed(h, feature("existing")).await;
    let key = existing.key();

    match op {
        OperationKind::Create => {
            h.writer
                .create(&ctx, feature("fresh"), None, &CreateOptions::default())
                .await
                .unwrap();
        }
        OperationKind::Get => {
            h.writer.get(&ctx, &key, &GetOptions::default()).await.unwrap();
        }
        OperationKind::List => {
            h.writer.list(&ctx, &ListOptions::default()).await.unwrap();
        }
        OperationKind::Update => {
            let mut changed = existing.clone();
            changed.metadata.resource_version.clear();
            changed.spec.description = "changed".to_string();
            h.writer
                .update(&ctx, &key, &ReplaceObject(changed), None, None, false, &UpdateOptions::default())
                .await
                .unwrap();
        }
        OperationKind::Delete => {
            h.writer
                .delete(&ctx, &key, None, &DeleteOptions::default())
                .await
                .unwrap();
        }
        OperationKind::DeleteCollection => {
            h.writer
                .delete_collection(&ctx, None, &DeleteOptions::default(), &ListOptions::default())
                .await
                .unwrap();
        }
    }
}

#[tokio::test]
async fn test_every_mode_routes_every_operation() {
    for mode in Mode::ALL {
        for op in OperationKind::ALL {
            let h = harness(mode);
            run(&h, op).await;
            assert_eq!(h.log.calls(), expected_calls(mode, op), "{} {}", mode, op);
        }
    }
}

#[tokio::test]
async fn test_get_is_idempotent() {
    for mode in Mode::ALL {
        let h = harness(mode);
        let ctx = RequestContext::background();
        let existing = seed(&h, feature("stable")).await;

        let first = h.writer.get(&ctx, &existing.key(), &GetOptions::default()).await.unwrap();
        let second = h.writer.get(&ctx, &existing.key(), &GetOptions::default()).await.unwrap();

        assert_eq!(first, second, "{}", mode);
        assert!(h.log.calls().iter().all(|c| c.ends_with(".Get")), "{}", mode);
    }
}

#[tokio::test]
async fn test_single_store_modes_leave_other_store_untouched() {
    let ctx = RequestContext::background();

    let h = harness(Mode::Mode0);
    let created = h
        .writer
        .create(&ctx, feature("legacy-only"), None, &CreateOptions::default())
        .await
        .unwrap();
    assert!(h.new.get(&ctx, &created.key(), &GetOptions::default()).await.is_err());

    let h = harness(Mode::Mode4);
    let created = h
        .writer
        .create(&ctx, feature("new-only"), None, &CreateOptions::default())
        .await
        .unwrap();
    assert!(h.legacy.get(&ctx, &created.key(), &GetOptions::default()).await.is_err());
    assert_eq!(created.metadata.uid, "unified-00000001");
}

#[tokio::test]
async fn test_dual_modes_converge_after_each_write() {
    for mode in [Mode::Mode1, Mode::Mode2, Mode::Mode3] {
        let h = harness(mode);
        let ctx = RequestContext::background();

        let created = h
            .writer
            .create(&ctx, feature("converged"), None, &CreateOptions::default())
            .await
            .unwrap();
        let mut changed = created.clone();
        changed.spec.requires_restart = true;
        h.writer
            .update(&ctx, &created.key(), &ReplaceObject(changed), None, None, false, &UpdateOptions::default())
            .await
            .unwrap();

        let in_legacy = h.legacy.get(&ctx, &created.key(), &GetOptions::default()).await.unwrap();
        let in_new = h.new.get(&ctx, &created.key(), &GetOptions::default()).await.unwrap();
        assert_eq!(in_legacy.spec, in_new.spec, "{}", mode);
        assert_eq!(in_legacy.metadata.uid, in_new.metadata.uid, "{}", mode);
        assert!(in_new.spec.requires_restart, "{}", mode);

        h.writer
            .delete(&ctx, &created.key(), None, &DeleteOptions::default())
            .await
            .unwrap();
        assert!(h.legacy.list(&ctx, &ListOptions::default()).await.unwrap().items.is_empty());
        assert!(h.new.list(&ctx, &ListOptions::default()).await.unwrap().items.is_empty());
    }
}
