//! Storage layer tests for the Lockwatch server.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use lockwatch_core::db::unix_timestamp;

use super::db::ServerDatabase;

async fn test_db() -> ServerDatabase {
    ServerDatabase::open_in_memory().await.unwrap()
}

// === User tests ===

#[tokio::test]
async fn create_and_get_user() {
    let db = test_db().await;
    let user = db
        .create_user("u1", "alice", "alice@example.com", "hash123")
        .await
        .unwrap();

    assert_eq!(user.id, "u1");
    assert_eq!(user.username, "alice");
    assert_eq!(user.email, "alice@example.com");
}

#[tokio::test]
async fn get_user_by_username() {
    let db = test_db().await;
    db.create_user("u1", "alice", "alice@example.com", "hash123")
        .await
        .unwrap();

    let user = db.get_user_by_username("alice").await.unwrap();
    assert_eq!(user.id, "u1");

    assert!(db.get_user_by_username("bob").await.is_err());
}

// === Token tests ===

#[tokio::test]
async fn find_token_by_hash() {
    let db = test_db().await;
    db.create_user("u1", "alice", "alice@example.com", "hash123")
        .await
        .unwrap();

    let future = unix_timestamp() + 3600;
    db.create_token("t1", "u1", "tokenhash", future)
        .await
        .unwrap();

    let found = db.get_token_by_hash("tokenhash").await.unwrap();
    assert!(found.is_some());

    db.create_token("t2", "u1", "expiredhash", unix_timestamp() - 1)
        .await
        .unwrap();
    let not_found = db.get_token_by_hash("expiredhash").await.unwrap();
    assert!(not_found.is_none());
}

#[tokio::test]
async fn revoke_token() {
    let db = test_db().await;
    db.create_user("u1", "alice", "alice@example.com", "hash123")
        .await
        .unwrap();

    let future = unix_timestamp() + 3600;
    db.create_token("t1", "u1", "tokenhash", future)
        .await
        .unwrap();

    assert!(db.revoke_token("t1").await.unwrap());

    let found = db.get_token_by_hash("tokenhash").await.unwrap();
    assert!(found.is_none());
}

// === Device tests ===

#[tokio::test]
async fn upsert_creates_then_updates() {
    let db = test_db().await;

    let device = db
        .upsert_device("pc1", Some("Lab-PC"), None, Some("10.0.0.5"), 100)
        .await
        .unwrap();
    assert_eq!(device.name, "Lab-PC");
    assert_eq!(device.owner_id, None);
    assert_eq!(device.last_status, "unknown");

    let device = db
        .upsert_device("pc1", Some("Lab-PC-2"), None, None, 200)
        .await
        .unwrap();
    assert_eq!(device.name, "Lab-PC-2");
    assert_eq!(device.last_seen, 200);
    // Null ip does not clear the stored one
    assert_eq!(device.ip.as_deref(), Some("10.0.0.5"));

    // Absent name does not clear the merge key either
    let device = db
        .upsert_device("pc1", None, None, None, 300)
        .await
        .unwrap();
    assert_eq!(device.name, "Lab-PC-2");
}

#[tokio::test]
async fn upsert_never_nulls_out_owner() {
    let db = test_db().await;
    db.create_user("u1", "alice", "alice@example.com", "hash123")
        .await
        .unwrap();

    db.upsert_device("pc1", Some("Lab-PC"), Some("u1"), None, 100)
        .await
        .unwrap();

    // Unauthenticated re-registration carries no owner
    let device = db
        .upsert_device("pc1", Some("Lab-PC"), None, None, 200)
        .await
        .unwrap();
    assert_eq!(device.owner_id.as_deref(), Some("u1"));
}

#[tokio::test]
async fn find_by_name_prefers_most_recently_seen() {
    let db = test_db().await;

    db.upsert_device("old", Some("Lab-PC"), None, None, 100)
        .await
        .unwrap();
    db.upsert_device("new", Some("Lab-PC"), None, None, 500)
        .await
        .unwrap();

    let found = db.find_device_by_name("Lab-PC").await.unwrap().unwrap();
    assert_eq!(found.id, "new");

    assert!(db.find_device_by_name("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn status_upsert_creates_missing_row() {
    let db = test_db().await;

    // Status report raced ahead of the announce
    db.upsert_device_status("pc1", "locked", 123).await.unwrap();

    let device = db.get_device("pc1").await.unwrap();
    assert_eq!(device.last_status, "locked");
    assert_eq!(device.last_status_at, Some(123));

    db.upsert_device_status("pc1", "unlocked", 456)
        .await
        .unwrap();
    let device = db.get_device("pc1").await.unwrap();
    assert_eq!(device.last_status, "unlocked");
    assert_eq!(device.last_status_at, Some(456));
}

#[tokio::test]
async fn list_devices_by_owner_excludes_others() {
    let db = test_db().await;
    db.create_user("u1", "alice", "alice@example.com", "h")
        .await
        .unwrap();
    db.create_user("u2", "bob", "bob@example.com", "h")
        .await
        .unwrap();

    db.upsert_device("pc1", Some("A"), Some("u1"), None, 1)
        .await
        .unwrap();
    db.upsert_device("pc2", Some("B"), Some("u2"), None, 2)
        .await
        .unwrap();
    db.upsert_device("pc3", Some("C"), None, None, 3).await.unwrap();

    let mine = db.list_devices_by_owner("u1").await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, "pc1");

    assert_eq!(db.list_all_devices().await.unwrap().len(), 3);
}

// === Block period tests ===

#[tokio::test]
async fn block_period_crud() {
    let db = test_db().await;
    db.create_user("u1", "alice", "alice@example.com", "h")
        .await
        .unwrap();

    let period = db
        .create_block_period("bp1", "u1", "08:00", "16:00", "mon,tue")
        .await
        .unwrap();
    assert_eq!(period.day_tokens(), vec!["mon", "tue"]);

    assert!(
        db.update_block_period("bp1", "u1", "09:00", "17:00", "")
            .await
            .unwrap()
    );
    let period = db.get_block_period("bp1").await.unwrap();
    assert_eq!(period.from_time, "09:00");
    assert!(period.day_tokens().is_empty());

    // Scoped to owner: another user cannot touch it
    assert!(
        !db.update_block_period("bp1", "u2", "10:00", "11:00", "")
            .await
            .unwrap()
    );
    assert!(!db.delete_block_period("bp1", "u2").await.unwrap());

    assert!(db.delete_block_period("bp1", "u1").await.unwrap());
    assert!(db.list_block_periods("u1").await.unwrap().is_empty());
}
