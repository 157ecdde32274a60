//! # HTTP Delivery Sink
//!
//! Posts a reading as JSON to a fixed recipient URL. Only transport success
//! and a 2xx status count as delivered; the response body is ignored. There
//! is no retry layer: the distributor drops failed deliveries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tracing::debug;

use crate::models::Reading;

use super::{DeliveryError, DeliverySink};

pub struct HttpSink {
    inner: Client,
    url: Url,
}

impl HttpSink {
    /// # Arguments
    /// * `url` - The absolute endpoint receiving the POSTs.
    /// * `timeout` - Whole-request timeout, connect included.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, DeliveryError> {
        let inner = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("telemetry-distributor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self { inner, url })
    }
}

#[async_trait]
impl DeliverySink for HttpSink {
    async fn deliver(&self, reading: &Reading) -> Result<(), DeliveryError> {
        let body = reading.to_json().map_err(|e| DeliveryError::Encode(e.to_string()))?;
        let response: reqwest::Response = self
            .inner
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        debug!(url = %self.url, id = %reading.id, status = status.as_u16(), "delivered");
        Ok(())
    }
}
