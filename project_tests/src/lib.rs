//! Shared fixtures for the integration tests: scripted inbound messages,
//! a fault-injecting storage backend and local HTTP sinks.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use lib_telemetry::connections::{EntryWrite, MemoryBackend, MessageStream, StoreBackend, StoreError};
use lib_telemetry::ingestors::{IngestError, InboundMessage};
use lib_telemetry::models::Route;
use lib_telemetry::{Reading, Recipient, RecipientRegistry, SensorType};
use url::Url;

/// What the ingestor did with a [`ScriptedMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    Requeue,
    DeadLetter,
}

/// In-memory stand-in for a broker delivery.
#[derive(Clone)]
pub struct ScriptedMessage {
    body: Vec<u8>,
    settlements: Arc<Mutex<Vec<Settlement>>>,
    fail_ack: bool,
}

impl ScriptedMessage {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            settlements: Arc::default(),
            fail_ack: false,
        }
    }

    /// A delivery whose ack is lost, as if the consumer died right after
    /// the write.
    pub fn losing_ack(body: impl Into<Vec<u8>>) -> Self {
        Self {
            fail_ack: true,
            ..Self::new(body)
        }
    }

    pub fn settlements(&self) -> Vec<Settlement> {
        self.settlements.lock().unwrap().clone()
    }
}

#[async_trait]
impl InboundMessage for ScriptedMessage {
    fn body(&self) -> &[u8] {
        &self.body
    }

    async fn ack(&self) -> Result<(), IngestError> {
        if self.fail_ack {
            return Err(IngestError::Broker("channel closed before ack".into()));
        }
        self.settlements.lock().unwrap().push(Settlement::Ack);
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<(), IngestError> {
        let s = if requeue { Settlement::Requeue } else { Settlement::DeadLetter };
        self.settlements.lock().unwrap().push(s);
        Ok(())
    }
}

/// [`MemoryBackend`] with switchable write and publish failures.
#[derive(Default)]
pub struct FlakyBackend {
    pub inner: MemoryBackend,
    pub fail_writes: AtomicBool,
    pub fail_publish: AtomicBool,
}

impl FlakyBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreBackend for FlakyBackend {
    async fn put_entry(&self, write: &EntryWrite) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("connection refused".into()));
        }
        self.inner.put_entry(write).await
    }

    async fn get_entry(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_entry(key).await
    }

    async fn index_range(&self, index: &str, offset: usize, count: usize) -> Result<Vec<String>, StoreError> {
        self.inner.index_range(index, offset, count).await
    }

    async fn index_remove(&self, index: &str, members: &[String]) -> Result<(), StoreError> {
        self.inner.index_remove(index, members).await
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("publish refused".into()));
        }
        self.inner.publish(channel, message).await
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, StoreError> {
        self.inner.subscribe(channel).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

pub fn recipient(id: &str) -> Recipient {
    Recipient::new(id).unwrap()
}

/// Registry of the given recipients, without sinks.
pub fn registry(ids: &[&str]) -> Arc<RecipientRegistry> {
    Arc::new(RecipientRegistry::new(ids.iter().map(|id| (recipient(id), Route::default()))).unwrap())
}

pub fn temperature(id: &str, captured_at: i64, to: &str) -> Reading {
    Reading::new(SensorType::Temperature, 21.5, captured_at, recipient(to)).with_id(id)
}

pub fn body_of(reading: &Reading) -> Vec<u8> {
    reading.to_json().unwrap().into_bytes()
}

/// Readings received by a [`spawn_recording_sink`] server, in arrival order.
pub type Received = Arc<Mutex<Vec<Reading>>>;

/// Local HTTP sink that records every POSTed reading at `/data`.
pub async fn spawn_recording_sink() -> (Url, Received) {
    async fn record(State(received): State<Received>, Json(reading): Json<Reading>) -> StatusCode {
        received.lock().unwrap().push(reading);
        StatusCode::NO_CONTENT
    }

    let received: Received = Arc::default();
    let app = Router::new().route("/data", post(record)).with_state(Arc::clone(&received));
    let addr = serve(app).await;
    (Url::parse(&format!("http://{}/data", addr)).unwrap(), received)
}

/// Serves `app` on an ephemeral local port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// URL on a port nothing listens on.
pub async fn dead_url() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{}/data", addr)).unwrap()
}
