//! # Notifier
//!
//! Per-recipient publish/subscribe over the storage backend's pub/sub
//! channels. Each [`Subscription`] owns a relay task moving keys from the
//! backend stream into a bounded buffer. A slow consumer never blocks the
//! relay or the writers: when the buffer is full the incoming notification is
//! dropped and a warning is logged.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::connections::{MessageStream, StoreBackend, StoreError};
use crate::models::key::notification_channel;
use crate::models::{Recipient, StorageKey};

#[derive(Clone)]
pub struct Notifier {
    backend: Arc<dyn StoreBackend>,
    buffer: usize,
}

impl Notifier {
    pub fn new(backend: Arc<dyn StoreBackend>, buffer: usize) -> Self {
        Self {
            backend,
            buffer: buffer.max(1),
        }
    }

    pub async fn publish(&self, recipient: &Recipient, key: &StorageKey) -> Result<(), StoreError> {
        self.backend
            .publish(&notification_channel(recipient), &key.to_string())
            .await
    }

    /// Subscribes to `recipient`'s channel.
    ///
    /// The backend subscription is active before this returns, so nothing
    /// published afterwards is missed. The subscription ends when `cancel`
    /// fires, when the backend stream ends, or when it is dropped.
    pub async fn subscribe(&self, recipient: &Recipient, cancel: CancellationToken) -> Result<Subscription, StoreError> {
        let source = self.backend.subscribe(&notification_channel(recipient)).await?;
        let (tx, rx) = mpsc::channel(self.buffer);
        let token = cancel.child_token();

        tokio::spawn(relay(recipient.clone(), source, tx, token.clone()));
        debug!(%recipient, "subscription opened");

        Ok(Subscription {
            recipient: recipient.clone(),
            rx,
            _guard: token.drop_guard(),
        })
    }
}

async fn relay(recipient: Recipient, mut source: MessageStream, tx: mpsc::Sender<StorageKey>, cancel: CancellationToken) {
    let mut dropped: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = source.next() => {
                let Some(raw) = next else {
                    debug!(%recipient, "backend subscription ended");
                    break;
                };
                let key = match raw.parse::<StorageKey>() {
                    Ok(key) => key,
                    Err(e) => {
                        warn!(%recipient, payload = %raw, error = %e, "ignoring malformed notification");
                        continue;
                    }
                };
                match tx.try_send(key) {
                    Ok(()) => {}
                    Err(TrySendError::Full(key)) => {
                        dropped += 1;
                        warn!(%recipient, %key, dropped, "notification buffer full, dropping newest");
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        }
    }
    debug!(%recipient, dropped, "subscription relay stopped");
}

/// Live stream of storage keys announced for one recipient. Not restartable.
pub struct Subscription {
    recipient: Recipient,
    rx: mpsc::Receiver<StorageKey>,
    _guard: DropGuard,
}

impl Subscription {
    pub fn recipient(&self) -> &Recipient {
        &self.recipient
    }

    /// Next announced key, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<StorageKey> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = StorageKey;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
