use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lib_telemetry::connections::MemoryBackend;
use lib_telemetry::core::{ReadingStore, StoreOptions, live_readings};
use project_tests::{recipient, temperature};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn store() -> ReadingStore {
    ReadingStore::new(Arc::new(MemoryBackend::new()), StoreOptions::default())
}

#[tokio::test]
async fn every_subscriber_gets_every_put_for_its_recipient() {
    let store = store();
    let cancel = CancellationToken::new();
    let mut subs = Vec::new();
    for _ in 0..3 {
        subs.push(store.notifier().subscribe(&recipient("R1"), cancel.clone()).await.unwrap());
    }

    let mut keys = Vec::new();
    for i in 0..10 {
        keys.push(store.put(&temperature(&format!("temperature-{i}"), i, "R1")).await.unwrap());
        store.put(&temperature(&format!("other-{i}"), i, "R2")).await.unwrap();
    }

    for sub in subs.iter_mut() {
        for key in &keys {
            assert_eq!(sub.next().await.as_ref(), Some(key));
        }
        assert!(tokio::time::timeout(Duration::from_millis(50), sub.next()).await.is_err());
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_subscriber_loses_the_newest_and_never_slows_the_writer() {
    let store = store();
    let mut stalled = store.notifier().subscribe(&recipient("R1"), CancellationToken::new()).await.unwrap();

    let started = Instant::now();
    let mut keys = Vec::new();
    for i in 0..150 {
        keys.push(store.put(&temperature(&format!("temperature-{i}"), i, "R1")).await.unwrap());
    }
    // Paused clock: any wait inside put would have advanced it.
    assert_eq!(started.elapsed(), Duration::ZERO);

    tokio::time::sleep(Duration::from_millis(10)).await;
    for key in keys.iter().take(100) {
        assert_eq!(stalled.next().await.as_ref(), Some(key));
    }
    assert!(tokio::time::timeout(Duration::from_millis(100), stalled.next()).await.is_err());

    // Storage is authoritative: every reading is still listed.
    assert_eq!(store.list_recent(&recipient("R1"), 200).await.unwrap().len(), 150);
}

#[tokio::test]
async fn shutdown_token_ends_live_feeds() {
    let store = store();
    let root = CancellationToken::new();
    let subscription = store.notifier().subscribe(&recipient("R2"), root.child_token()).await.unwrap();
    let mut feed = Box::pin(live_readings(store.clone(), subscription));

    let reading = temperature("temperature-9", 42, "R2");
    store.put(&reading).await.unwrap();
    assert_eq!(feed.next().await, Some(reading));

    root.cancel();
    assert_eq!(tokio::time::timeout(Duration::from_secs(1), feed.next()).await.unwrap(), None);
}

#[tokio::test]
async fn closing_the_store_ends_subscriptions() {
    let store = store();
    let mut sub = store.notifier().subscribe(&recipient("R1"), CancellationToken::new()).await.unwrap();
    store.close().await;
    assert_eq!(tokio::time::timeout(Duration::from_secs(1), sub.next()).await.unwrap(), None);
}
