use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::{Stream, StreamExt};
use lib_telemetry::core::live_readings;
use lib_telemetry::{Reading, StorageKey};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{AppError, AppState, DEFAULT_RECENT, MAX_RECENT};

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

/// `OK` while the store answers PING.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(e) => {
            warn!(error = %e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
        }
    }
}

pub async fn recipients(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.recipients().map(|r| r.to_string()).collect())
}

pub async fn reading(State(state): State<AppState>, Path(key): Path<String>) -> Result<Json<Reading>, AppError> {
    let key: StorageKey = key.parse().map_err(|_| AppError::BadKey(key.clone()))?;
    Ok(Json(state.store.get(&key).await?))
}

/// Newest readings first. `limit` defaults to 10 and is capped at 100.
pub async fn recent(
    State(state): State<AppState>,
    Path(recipient): Path<String>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<Reading>>, AppError> {
    let recipient = state.registry.lookup(&recipient)?;
    let limit = query.limit.unwrap_or(DEFAULT_RECENT).min(MAX_RECENT);
    Ok(Json(state.store.list_recent(recipient, limit).await?))
}

/// Live feed: one `data:` event with the JSON reading per notification.
pub async fn events(
    State(state): State<AppState>,
    Path(recipient): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let recipient = state.registry.lookup(&recipient)?.clone();
    let subscription = state
        .store
        .notifier()
        .subscribe(&recipient, state.shutdown.child_token())
        .await?;
    info!(%recipient, "SSE client subscribed");

    let stream = live_readings(state.store.clone(), subscription).filter_map(|reading| async move {
        match Event::default().json_data(&reading) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                warn!(id = %reading.id, error = %e, "failed to encode SSE event");
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Receiving side of the distributor topology.
pub async fn sink(
    State(state): State<AppState>,
    Path(recipient): Path<String>,
    Json(reading): Json<Reading>,
) -> Result<StatusCode, AppError> {
    let recipient = state.registry.lookup(&recipient)?;
    if &reading.recipient != recipient {
        return Err(AppError::RecipientMismatch {
            path: recipient.to_string(),
            body: reading.recipient.to_string(),
        });
    }
    info!(
        %recipient,
        id = %reading.id,
        sensor_type = %reading.sensor_type,
        value = reading.value,
        captured_at = reading.captured_at,
        "Received reading"
    );
    debug!(?reading, "sink payload");
    Ok(StatusCode::NO_CONTENT)
}
