//! Integration tests for the record service.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable before running; without it they
//! return early.

use std::sync::Arc;
use std::time::Duration;

use cask_client::{
    ConnectivityMonitor, DrainOutcome, HttpRemote, RemoteError, RemoteService, SqliteStorage,
    SyncClient,
};
use cask_engine::{Record, Schema};
use cask_server::{app, db, AppState};
use serde_json::json;

/// Start the service on an ephemeral port and return its base URL.
async fn spawn_server() -> Option<String> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let pool = db::create_pool(&database_url).await.ok()?;
    db::run_migrations(&pool).await.ok()?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.ok()?;
    let addr = listener.local_addr().ok()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app(AppState::new(pool))).await;
    });

    Some(format!("http://{addr}"))
}

fn remote(base_url: &str) -> HttpRemote {
    HttpRemote::new(base_url, Duration::from_secs(10)).unwrap()
}

fn unique_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

fn rec(value: serde_json::Value) -> Record {
    Record::from_value(value).unwrap()
}

#[tokio::test]
async fn insert_update_delete_roundtrip() {
    let Some(base_url) = spawn_server().await else {
        return;
    };
    let remote = remote(&base_url);
    let id = unique_id("w");

    let created = remote
        .insert(
            "whiskeys",
            &rec(json!({"id": id, "name": "Bunnahabhain 12", "distillery": "Bunnahabhain"})),
        )
        .await
        .unwrap();
    assert_eq!(created.id(), id);

    let updated = remote
        .update("whiskeys", &id, &rec(json!({"id": id, "name": "Bunnahabhain 18"})))
        .await
        .unwrap();
    assert_eq!(updated.get("name"), Some(&json!("Bunnahabhain 18")));
    // Shallow merge keeps fields the patch does not mention.
    assert_eq!(updated.get("distillery"), Some(&json!("Bunnahabhain")));

    let listed = remote.list("whiskeys").await.unwrap();
    assert!(listed.iter().any(|r| r.id() == id));

    remote.delete("whiskeys", &id).await.unwrap();
    // Deleting again still succeeds.
    remote.delete("whiskeys", &id).await.unwrap();

    let listed = remote.list("whiskeys").await.unwrap();
    assert!(listed.iter().all(|r| r.id() != id));
}

#[tokio::test]
async fn reinsert_overwrites() {
    let Some(base_url) = spawn_server().await else {
        return;
    };
    let remote = remote(&base_url);
    let id = unique_id("p");

    remote
        .insert("purchases", &rec(json!({"id": id, "price": 80, "shop": "Old Shop"})))
        .await
        .unwrap();
    let again = remote
        .insert("purchases", &rec(json!({"id": id, "price": 75})))
        .await
        .unwrap();

    assert_eq!(again.get("price"), Some(&json!(75)));
    assert_eq!(again.get("shop"), None);
}

#[tokio::test]
async fn patching_missing_records_is_rejected() {
    let Some(base_url) = spawn_server().await else {
        return;
    };
    let remote = remote(&base_url);
    let id = unique_id("t");

    let result = remote
        .update("tasting_notes", &id, &rec(json!({"id": id, "nose": "peat"})))
        .await;

    assert!(matches!(result, Err(RemoteError::Rejected { status: 404, .. })));
}

#[tokio::test]
async fn local_markers_are_not_stored() {
    let Some(base_url) = spawn_server().await else {
        return;
    };
    let remote = remote(&base_url);
    let mut record = rec(json!({"id": unique_id("n"), "text": "Great with water"}));
    record.stamp_local(1_700_000_000_000);

    let stored = remote.insert("personal_notes", &record).await.unwrap();

    assert!(!stored.is_local());
    assert_eq!(stored.local_saved_at(), None);
}

#[tokio::test]
async fn offline_writes_reach_the_server() {
    let Some(base_url) = spawn_server().await else {
        return;
    };
    let storage = Arc::new(
        SqliteStorage::open_in_memory(Schema::whiskey_collection())
            .await
            .unwrap(),
    );
    let remote = Arc::new(remote(&base_url));
    let connectivity = ConnectivityMonitor::new(false);
    let client = SyncClient::new(storage, remote.clone(), connectivity.clone());

    let item = client
        .create("collection_items", json!({"whiskey_id": "w-1", "bottles": 2}))
        .await
        .unwrap();
    assert_eq!(client.sync_now().await, DrainOutcome::Offline);

    connectivity.set_online(true);
    let outcome = client.sync_now().await;

    assert!(matches!(outcome, DrainOutcome::Completed(r) if r.synced == 1 && r.failed == 0));
    assert_eq!(client.pending_count().await.unwrap(), 0);

    let listed = remote.list("collection_items").await.unwrap();
    let stored = listed.iter().find(|r| r.id() == item.id()).unwrap();
    assert_eq!(stored.get("bottles"), Some(&json!(2)));
    assert!(!stored.is_local());

    // The merged view still prefers the local copy.
    let merged = client.merged("collection_items", listed).await.unwrap();
    let shown = merged.iter().find(|r| r.id() == item.id()).unwrap();
    assert!(shown.is_local());
}
