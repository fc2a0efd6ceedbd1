//! Integration tests for SqliteMirrorStore and SqliteEntitySource
//!
//! Each test creates a fresh database to ensure isolation. The concurrency
//! tests use a file-backed pool so several connections really race.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use salesync_cache::{DatabasePool, SqliteEntitySource, SqliteMirrorStore};
use salesync_core::domain::{
    ChannelId, EntityKind, Fingerprint, LocalEntity, LocalEntityId, MirrorKey, MirrorStatus,
    RemoteId, TenantId, ViewId,
};
use salesync_core::ports::{ILocalEntitySource, IMirrorStore, MirrorFilter};

// ============================================================================
// Test helpers
// ============================================================================

async fn setup() -> SqliteMirrorStore {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteMirrorStore::new(pool.pool().clone())
}

fn key(entity: i64, channel: i64, view: Option<i64>) -> MirrorKey {
    MirrorKey::new(
        LocalEntityId::new(entity).unwrap(),
        ChannelId::new(channel).unwrap(),
        view.map(|v| ViewId::new(v).unwrap()),
    )
}

fn fp(seed: &str) -> Fingerprint {
    Fingerprint::of_bytes(seed.as_bytes())
}

// ============================================================================
// get_or_create
// ============================================================================

#[tokio::test]
async fn test_get_or_create_creates_pending_record() {
    let store = setup().await;
    let record = store.get_or_create(&key(1, 2, Some(3))).await.unwrap();

    assert_eq!(record.status(), MirrorStatus::Pending);
    assert!(record.remote_id().is_none());
    assert!(record.last_synced_hash().is_none());
    assert_eq!(record.key(), &key(1, 2, Some(3)));
}

#[tokio::test]
async fn test_get_or_create_returns_existing_row() {
    let store = setup().await;
    let first = store.get_or_create(&key(1, 2, Some(3))).await.unwrap();
    let second = store.get_or_create(&key(1, 2, Some(3))).await.unwrap();
    assert_eq!(first.id(), second.id());

    let other_view = store.get_or_create(&key(1, 2, Some(4))).await.unwrap();
    assert_ne!(first.id(), other_view.id());
}

#[tokio::test]
async fn test_default_view_is_unique_too() {
    let store = setup().await;
    let a = store.get_or_create(&key(7, 1, None)).await.unwrap();
    let b = store.get_or_create(&key(7, 1, None)).await.unwrap();
    assert_eq!(a.id(), b.id());
    assert_eq!(b.key().view_id, None);
}

#[tokio::test]
async fn test_concurrent_creators_converge_on_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let db = DatabasePool::new(&dir.path().join("state.db")).await.unwrap();
    let store = Arc::new(SqliteMirrorStore::new(db.pool().clone()));
    let target = key(42, 1, Some(5));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.get_or_create(&target).await.unwrap().id()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "all creators must observe the same row");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mirror_records")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

// ============================================================================
// update_after_push
// ============================================================================

#[tokio::test]
async fn test_successful_push_sets_remote_id_hash_and_status() {
    let store = setup().await;
    let record = store.get_or_create(&key(1, 1, None)).await.unwrap();
    let remote = RemoteId::new("REMOTE-123").unwrap();

    let updated = store
        .update_after_push(&record, Some(&remote), &fp("v1"), true, None)
        .await
        .unwrap();

    assert_eq!(updated.status(), MirrorStatus::Synced);
    assert_eq!(updated.remote_id().unwrap().as_str(), "REMOTE-123");
    assert_eq!(updated.last_synced_hash(), Some(&fp("v1")));
    assert!(updated.is_up_to_date(&fp("v1")));
}

#[tokio::test]
async fn test_remote_id_is_first_writer_wins() {
    let store = setup().await;
    let record = store.get_or_create(&key(1, 1, None)).await.unwrap();

    let first = RemoteId::new("FIRST").unwrap();
    let second = RemoteId::new("SECOND").unwrap();
    store
        .update_after_push(&record, Some(&first), &fp("v1"), true, None)
        .await
        .unwrap();
    let updated = store
        .update_after_push(&record, Some(&second), &fp("v2"), true, None)
        .await
        .unwrap();

    assert_eq!(updated.remote_id().unwrap().as_str(), "FIRST");
    // Non-key fields are last-writer-wins
    assert_eq!(updated.last_synced_hash(), Some(&fp("v2")));
}

#[tokio::test]
async fn test_failed_push_keeps_last_hash_and_records_detail() {
    let store = setup().await;
    let record = store.get_or_create(&key(1, 1, None)).await.unwrap();
    store
        .update_after_push(&record, None, &fp("v1"), true, None)
        .await
        .unwrap();

    let failed = store
        .update_after_push(&record, None, &fp("v2"), false, Some("invalid price"))
        .await
        .unwrap();

    assert_eq!(failed.status(), MirrorStatus::Failed);
    assert_eq!(failed.error_detail(), Some("invalid price"));
    assert_eq!(failed.last_synced_hash(), Some(&fp("v1")));

    let recovered = store
        .update_after_push(&record, None, &fp("v2"), true, None)
        .await
        .unwrap();
    assert_eq!(recovered.status(), MirrorStatus::Synced);
    assert!(recovered.error_detail().is_none());
}

#[tokio::test]
async fn test_mark_failed_without_push() {
    let store = setup().await;
    let record = store.get_or_create(&key(1, 1, None)).await.unwrap();
    store
        .mark_failed(record.id(), "missing required field 'sku' for amazon")
        .await
        .unwrap();

    let stored = store.get(record.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), MirrorStatus::Failed);
    assert!(stored.error_detail().unwrap().contains("sku"));
}

// ============================================================================
// Lookup, query, delete, link
// ============================================================================

#[tokio::test]
async fn test_find_does_not_create() {
    let store = setup().await;
    assert!(store.find(&key(9, 9, None)).await.unwrap().is_none());
    let count = store.query(&MirrorFilter::new()).await.unwrap().len();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_query_by_channel_and_status() {
    let store = setup().await;
    let a = store.get_or_create(&key(1, 1, None)).await.unwrap();
    let _b = store.get_or_create(&key(2, 1, None)).await.unwrap();
    let _c = store.get_or_create(&key(3, 2, None)).await.unwrap();
    store
        .update_after_push(&a, None, &fp("x"), false, Some("rejected"))
        .await
        .unwrap();

    let channel_one = store
        .query(&MirrorFilter::new().with_channel(ChannelId::new(1).unwrap()))
        .await
        .unwrap();
    assert_eq!(channel_one.len(), 2);

    let failed = store
        .query(&MirrorFilter::new().with_status(MirrorStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id(), a.id());

    let limited = store
        .query(&MirrorFilter::new().with_limit(1))
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn test_count_by_status() {
    let store = setup().await;
    let a = store.get_or_create(&key(1, 1, None)).await.unwrap();
    let b = store.get_or_create(&key(2, 1, None)).await.unwrap();
    store.get_or_create(&key(3, 1, None)).await.unwrap();
    store
        .update_after_push(&a, None, &fp("x"), true, None)
        .await
        .unwrap();
    store.mark_failed(b.id(), "missing sku").await.unwrap();

    let counts = store.count_by_status().await.unwrap();
    assert_eq!(counts.get("pending"), Some(&1));
    assert_eq!(counts.get("synced"), Some(&1));
    assert_eq!(counts.get("failed"), Some(&1));

    let empty = setup().await.count_by_status().await.unwrap();
    assert_eq!(empty.len(), 3);
    assert!(empty.values().all(|&n| n == 0));
}

#[tokio::test]
async fn test_mark_failed_missing_record_errors() {
    let store = setup().await;
    let record = store.get_or_create(&key(1, 1, None)).await.unwrap();
    store.delete(record.id()).await.unwrap();
    assert!(store.mark_failed(record.id(), "gone").await.is_err());
}

#[tokio::test]
async fn test_delete_record() {
    let store = setup().await;
    let record = store.get_or_create(&key(1, 1, None)).await.unwrap();
    assert!(store.delete(record.id()).await.unwrap());
    assert!(!store.delete(record.id()).await.unwrap());
    assert!(store.get(record.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_link_remote_adopts_once() {
    let store = setup().await;
    let k = key(5, 1, Some(2));
    assert!(store
        .link_remote(&k, &RemoteId::new("EXISTING-1").unwrap())
        .await
        .unwrap());
    assert!(!store
        .link_remote(&k, &RemoteId::new("EXISTING-2").unwrap())
        .await
        .unwrap());

    let record = store.find(&k).await.unwrap().unwrap();
    assert_eq!(record.remote_id().unwrap().as_str(), "EXISTING-1");
    assert_eq!(record.status(), MirrorStatus::Pending);
}

// ============================================================================
// Leases
// ============================================================================

#[tokio::test]
async fn test_lease_is_exclusive_until_released() {
    let store = setup().await;
    let record = store.get_or_create(&key(1, 1, None)).await.unwrap();
    let ttl = Duration::from_secs(60);

    assert!(store.try_acquire_lease(record.id(), "worker-a", ttl).await.unwrap());
    assert!(!store.try_acquire_lease(record.id(), "worker-b", ttl).await.unwrap());
    // Not re-entrant, even for the holder
    assert!(!store.try_acquire_lease(record.id(), "worker-a", ttl).await.unwrap());

    // Release by a non-holder is ignored
    store.release_lease(record.id(), "worker-b").await.unwrap();
    assert!(!store.try_acquire_lease(record.id(), "worker-b", ttl).await.unwrap());

    store.release_lease(record.id(), "worker-a").await.unwrap();
    assert!(store.try_acquire_lease(record.id(), "worker-b", ttl).await.unwrap());
}

#[tokio::test]
async fn test_expired_lease_can_be_stolen() {
    let store = setup().await;
    let record = store.get_or_create(&key(1, 1, None)).await.unwrap();

    assert!(store
        .try_acquire_lease(record.id(), "crashed-worker", Duration::ZERO)
        .await
        .unwrap());
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(store
        .try_acquire_lease(record.id(), "worker-b", Duration::from_secs(60))
        .await
        .unwrap());
}

// ============================================================================
// Entity source
// ============================================================================

#[tokio::test]
async fn test_entity_source_round_trip() {
    let db = DatabasePool::in_memory().await.unwrap();
    let source = SqliteEntitySource::new(db.pool().clone());

    let entity = LocalEntity::new(
        LocalEntityId::new(10).unwrap(),
        TenantId::new(1).unwrap(),
        EntityKind::PropertyAssignment,
    )
    .with_sku("CHAIR-01")
    .with_attribute("property", json!("color"))
    .with_attribute("value", json!("red"));
    source.save(&entity).await.unwrap();

    let loaded = source.load(entity.id()).await.unwrap().unwrap();
    assert_eq!(loaded.kind(), EntityKind::PropertyAssignment);
    assert_eq!(loaded.sku(), Some("CHAIR-01"));
    assert_eq!(loaded.str_attr("value"), Some("red"));
    assert!(!loaded.is_deleted());

    let mut deleted = loaded.clone();
    deleted.mark_deleted();
    source.save(&deleted).await.unwrap();
    assert!(source.load(entity.id()).await.unwrap().unwrap().is_deleted());

    let listed = source.list_by_tenant(TenantId::new(1).unwrap()).await.unwrap();
    assert_eq!(listed.len(), 1);

    assert!(source.remove(entity.id()).await.unwrap());
    assert!(source.load(entity.id()).await.unwrap().is_none());
}
