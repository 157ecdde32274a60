use std::sync::Arc;
use std::time::Duration;

use lib_telemetry::core::{ReadingStore, StoreOptions};
use lib_telemetry::ingestors::{Disposition, IngestError, Ingestor};
use project_tests::{FlakyBackend, ScriptedMessage, Settlement, body_of, recipient, registry, temperature};
use tokio_util::sync::CancellationToken;

fn store_over(backend: &Arc<FlakyBackend>) -> ReadingStore {
    ReadingStore::new(backend.clone(), StoreOptions::default())
}

#[tokio::test]
async fn example_reading_is_stored_and_announced_to_its_recipient_only() {
    let backend = FlakyBackend::new();
    let store = store_over(&backend);
    let cancel = CancellationToken::new();
    let mut r1 = store.notifier().subscribe(&recipient("R1"), cancel.clone()).await.unwrap();
    let mut r2 = store.notifier().subscribe(&recipient("R2"), cancel.clone()).await.unwrap();

    let ingestor = Ingestor::new(store.clone(), registry(&["R1", "R2"]));
    let body = br#"{"sensorType":"temperature","value":21.5,"capturedAt":1700000000,"recipient":"R1"}"#;
    let message = ScriptedMessage::new(body.to_vec());
    assert_eq!(ingestor.process(&message).await, Disposition::Acked);
    assert_eq!(message.settlements(), vec![Settlement::Ack]);

    let key = tokio::time::timeout(Duration::from_secs(1), r1.next()).await.unwrap().unwrap();
    assert!(key.to_string().starts_with("sensor:temperature:"));
    assert!(key.to_string().ends_with(":1700000000"));

    let stored = store.get(&key).await.unwrap();
    assert_eq!(stored.value, 21.5);
    assert_eq!(stored.recipient, recipient("R1"));
    assert_eq!(stored.captured_at, 1_700_000_000);

    assert!(tokio::time::timeout(Duration::from_millis(100), r2.next()).await.is_err());
}

#[tokio::test]
async fn failed_write_is_never_acknowledged() {
    let backend = FlakyBackend::new();
    let store = store_over(&backend);
    let ingestor = Ingestor::new(store.clone(), registry(&["R1"]));
    let reading = temperature("temperature-1", 100, "R1");

    backend.set_fail_writes(true);
    let first = ScriptedMessage::new(body_of(&reading));
    assert_eq!(ingestor.process(&first).await, Disposition::Requeued);
    assert_eq!(first.settlements(), vec![Settlement::Requeue]);
    assert!(store.get(&reading.storage_key()).await.is_err());

    backend.set_fail_writes(false);
    let redelivered = ScriptedMessage::new(body_of(&reading));
    assert_eq!(ingestor.process(&redelivered).await, Disposition::Acked);
    assert_eq!(store.get(&reading.storage_key()).await.unwrap(), reading);
}

#[tokio::test]
async fn lost_ack_redelivery_lands_on_the_same_key() {
    let backend = FlakyBackend::new();
    let store = store_over(&backend);
    let ingestor = Ingestor::new(store.clone(), registry(&["R1"]));
    // No id on the wire: the fingerprint must be stable across deliveries.
    let body = br#"{"type":"humidity","value":48.0,"timestamp":1700000300,"recipient":"R1"}"#.to_vec();

    let crashed = ScriptedMessage::losing_ack(body.clone());
    ingestor.process(&crashed).await;
    assert!(crashed.settlements().is_empty());

    let again = ScriptedMessage::new(body);
    assert_eq!(ingestor.process(&again).await, Disposition::Acked);

    assert_eq!(backend.inner.live_entries(), 1);
    assert_eq!(backend.inner.index_len("recent:R1"), 1);
    assert_eq!(store.list_recent(&recipient("R1"), 10).await.unwrap().len(), 1);
    assert_eq!(ingestor.stats().snapshot().settle_failures, 1);
}

#[tokio::test]
async fn malformed_and_unroutable_messages() {
    let backend = FlakyBackend::new();
    let store = store_over(&backend);
    let ingestor = Ingestor::new(store, registry(&["R1"]));

    let garbage = ScriptedMessage::new(b"{\"sensorType\":\"temperature\"".to_vec());
    assert_eq!(ingestor.process(&garbage).await, Disposition::Requeued);

    let stranger = ScriptedMessage::new(body_of(&temperature("temperature-2", 5, "R7")));
    assert_eq!(ingestor.process(&stranger).await, Disposition::DeadLettered);
    assert_eq!(stranger.settlements(), vec![Settlement::DeadLetter]);

    assert_eq!(backend.inner.live_entries(), 0);
}

#[tokio::test]
async fn publish_failure_does_not_fail_the_write() {
    let backend = FlakyBackend::new();
    let store = store_over(&backend);
    let ingestor = Ingestor::new(store.clone(), registry(&["R1"]));
    backend.set_fail_publish(true);

    let reading = temperature("temperature-3", 9, "R1");
    let message = ScriptedMessage::new(body_of(&reading));
    assert_eq!(ingestor.process(&message).await, Disposition::Acked);
    assert_eq!(store.get(&reading.storage_key()).await.unwrap(), reading);
}

#[tokio::test]
async fn run_processes_in_order_until_the_source_ends() {
    let backend = FlakyBackend::new();
    let store = store_over(&backend);
    let ingestor = Ingestor::new(store.clone(), registry(&["R1"]));

    let messages: Vec<ScriptedMessage> = (0..5)
        .map(|i| ScriptedMessage::new(body_of(&temperature(&format!("temperature-{i}"), 1_000 + i, "R1"))))
        .collect();
    let source = futures_util::stream::iter(messages.clone().into_iter().map(Ok::<_, IngestError>));

    let snapshot = ingestor.run(source, CancellationToken::new()).await.unwrap();
    assert_eq!(snapshot.received, 5);
    assert_eq!(snapshot.acked, 5);
    assert!(messages.iter().all(|m| m.settlements() == vec![Settlement::Ack]));

    let recent = store.list_recent(&recipient("R1"), 10).await.unwrap();
    let stamps: Vec<i64> = recent.iter().map(|r| r.captured_at).collect();
    assert_eq!(stamps, vec![1_004, 1_003, 1_002, 1_001, 1_000]);
}

#[tokio::test]
async fn source_error_stops_the_loop() {
    let backend = FlakyBackend::new();
    let ingestor = Ingestor::new(store_over(&backend), registry(&["R1"]));
    let source = futures_util::stream::iter(vec![Err::<ScriptedMessage, _>(IngestError::Broker("connection reset".into()))]);
    assert!(matches!(ingestor.run(source, CancellationToken::new()).await, Err(IngestError::Broker(_))));
}
