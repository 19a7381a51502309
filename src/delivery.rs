use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use crate::error::DeliveryError;
use crate::types::{CanonicalEvent, Collector};

/// Sends canonical events to the configured collector.
///
/// Cloning is cheap: the underlying `reqwest::Client` is reference counted
/// and its connection pool is shared by every clone, so workers use it
/// concurrently without any locking.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    http: reqwest::Client,
    collector: Collector,
}

impl DeliveryClient {
    pub fn new(collector: Collector) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_client(http, collector))
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(http: reqwest::Client, collector: Collector) -> Self {
        Self { http, collector }
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Single delivery attempt. No retries happen here.
    ///
    /// Success is exactly HTTP 200. The response body is never read; the
    /// response is dropped on every path so the connection is released.
    pub async fn deliver(&self, event: &CanonicalEvent) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(event)?;

        let response = self
            .http
            .post(&self.collector.url)
            .timeout(self.collector.timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        drop(response);

        if status == StatusCode::OK {
            Ok(())
        } else {
            Err(DeliveryError::Status {
                status: status.as_u16(),
            })
        }
    }
}
