//! Blackbox tests of the store contract through a [`SharedStore`].

use std::sync::Arc;
use std::time::Duration;

use arenaload_store::{Command, InMemoryStore, Reply, SharedStore, StoreError};

fn shared() -> (InMemoryStore, SharedStore) {
    let store = InMemoryStore::new();
    (store.clone(), Arc::new(store))
}

#[tokio::test]
async fn concurrent_increments_are_not_lost() {
    let (_, store) = shared();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..50 {
                    let incr = Command::Incr { key: "hits".into() };
                    store.execute(incr).await.unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let reply = store.execute(Command::get("hits")).await.unwrap();
    assert_eq!(reply, Reply::Text("800".into()));
}

#[tokio::test]
async fn pipeline_replies_in_order() {
    let (_, store) = shared();

    let replies = store
        .pipeline(vec![
            Command::set("a", "1"),
            Command::Incr { key: "a".into() },
            Command::ListPush {
                key: "l".into(),
                value: "x".into(),
            },
            Command::get("a"),
            Command::DbSize,
        ])
        .await
        .unwrap();

    assert_eq!(
        replies,
        vec![
            Reply::Ok,
            Reply::Int(2),
            Reply::Int(1),
            Reply::Text("2".into()),
            Reply::Int(2),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn expiring_keys_leave_the_keyspace() {
    let (handle, store) = shared();

    store
        .execute(Command::set_ex("short", "v", Duration::from_secs(5)))
        .await
        .unwrap();
    store.execute(Command::set("long", "v")).await.unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(!handle.contains("short"));
    assert_eq!(store.execute(Command::DbSize).await.unwrap(), Reply::Int(1));
}

#[tokio::test]
async fn failing_batch_reports_aggregate_error() {
    let (_, store) = shared();
    store.execute(Command::set("text", "v")).await.unwrap();

    let err = store
        .pipeline(vec![
            Command::set("ok", "1"),
            Command::Incr { key: "text".into() },
            Command::ListPush {
                key: "text".into(),
                value: "x".into(),
            },
        ])
        .await
        .unwrap_err();

    assert!(!err.is_transient());
    match err {
        StoreError::Batch { total, failed, .. } => {
            assert_eq!(total, 3);
            assert_eq!(failed, 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn offline_store_is_transient() {
    let (handle, store) = shared();
    handle.set_offline(true);

    let err = store.execute(Command::Ping).await.unwrap_err();
    assert!(err.is_transient(), "{err}");

    handle.set_offline(false);
    assert!(store.execute(Command::Ping).await.is_ok());
}
