//! Integration tests for the session store
//!
//! Exercises the public store API end to end against a temporary data
//! directory: creation, eviction, search ordering, retention and backups.

mod common;

use chatvault::storage::{NewMessage, NewSession, SearchFilter, SessionUpdate};
use chrono::{Duration, TimeZone, Utc};
use std::collections::BTreeSet;

#[tokio::test]
async fn test_create_then_get_returns_equal_record() {
    let (store, _tmp) = common::create_temp_store().await;

    let created = store
        .create_session(NewSession::titled("Demo"))
        .await
        .expect("create failed");
    assert!(!created.id.is_empty());
    assert!(created.messages.is_empty());
    assert_eq!(created.metadata.total_messages, 0);

    let fetched = store.get_session(&created.id).await.unwrap();
    assert_eq!(fetched, Some(created.clone()));

    store
        .add_message(&created.id, NewMessage::user("hi"))
        .await
        .unwrap();
    let fetched = store.get_session(&created.id).await.unwrap().unwrap();
    assert_eq!(fetched.messages.len(), 1);
    assert_eq!(fetched.metadata.total_messages, 1);
}

#[tokio::test]
async fn test_cap_keeps_most_recent_messages() {
    let (store, _tmp) = common::create_temp_store_with(|c| c.max_messages_per_session = 2).await;
    let session = store.create_session(NewSession::titled("capped")).await.unwrap();

    let mut evicted = Vec::new();
    for content in ["A", "B", "C"] {
        let added = store
            .add_message(&session.id, NewMessage::user(content))
            .await
            .unwrap();
        evicted.push(added.evicted);
    }
    assert_eq!(evicted, vec![0, 0, 1]);

    let stored = store.get_session(&session.id).await.unwrap().unwrap();
    let contents: Vec<&str> = stored.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["B", "C"]);
}

#[tokio::test]
async fn test_search_all_is_newest_first_and_bounds_are_exclusive() {
    let (store, _tmp) = common::create_temp_store().await;
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    for (offset, title) in [(0, "first"), (1, "second"), (2, "third")] {
        store
            .create_session(NewSession {
                start_time: Some(base + Duration::days(offset)),
                ..NewSession::titled(title)
            })
            .await
            .unwrap();
    }

    let all = store.search_sessions(&SearchFilter::default()).await.unwrap();
    let titles: Vec<&str> = all.sessions.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["third", "second", "first"]);
    assert_eq!(all.total_count, 3);
    assert!(!all.has_more);

    let window = SearchFilter {
        start_date: Some(base),
        end_date: Some(base + Duration::days(2)),
        ..SearchFilter::default()
    };
    let within = store.search_sessions(&window).await.unwrap();
    let titles: Vec<&str> = within.sessions.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["second"]);
}

#[tokio::test]
async fn test_missing_ids_do_not_error() {
    let (store, _tmp) = common::create_temp_store().await;
    assert!(!store.delete_session("nope").await.unwrap());
    assert!(store.get_session("nope").await.unwrap().is_none());
    assert!(store
        .update_session("nope", SessionUpdate::default())
        .await
        .unwrap()
        .is_none());
    assert!(store
        .add_message("nope", NewMessage::user("hi"))
        .await
        .is_err());
}

#[tokio::test]
async fn test_cleanup_removes_only_expired_sessions() {
    let (store, _tmp) = common::create_temp_store().await;
    let old = store
        .create_session(NewSession {
            start_time: Some(Utc::now() - Duration::days(40)),
            ..NewSession::titled("old")
        })
        .await
        .unwrap();
    let fresh = store.create_session(NewSession::titled("fresh")).await.unwrap();

    assert_eq!(store.cleanup(Some(30)).await.unwrap(), 1);
    assert!(store.get_session(&old.id).await.unwrap().is_none());
    assert!(store.get_session(&fresh.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_backup_round_trip_after_wipe() {
    let (store, _tmp) = common::create_temp_store().await;
    for (title, count) in [("one", 1), ("two", 2), ("three", 3)] {
        let session = store.create_session(NewSession::titled(title)).await.unwrap();
        for n in 0..count {
            store
                .add_message(&session.id, NewMessage::assistant(format!("reply {}", n)))
                .await
                .unwrap();
        }
    }
    let before: BTreeSet<(String, usize)> = store
        .search_sessions(&SearchFilter::default())
        .await
        .unwrap()
        .sessions
        .into_iter()
        .map(|s| (s.id.clone(), s.message_count()))
        .collect();

    let backup = store.create_backup(None).await.unwrap();
    assert_eq!(backup.metadata.session_count, 3);
    assert_eq!(backup.metadata.total_messages, 6);

    for (id, _) in &before {
        assert!(store.delete_session(id).await.unwrap());
    }
    assert!(store.list_session_ids().await.unwrap().is_empty());

    let report = store.restore_from_backup(&backup.path).await.unwrap();
    assert_eq!(report.restored, 3);
    assert!(report.errors.is_empty());

    let after: BTreeSet<(String, usize)> = store
        .search_sessions(&SearchFilter::default())
        .await
        .unwrap()
        .sessions
        .into_iter()
        .map(|s| (s.id.clone(), s.message_count()))
        .collect();
    assert_eq!(before, after);

    let listed = store.get_backup_list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].path, backup.path);
}
