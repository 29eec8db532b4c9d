//! Webhook signal sink.
//!
//! POSTs each signal as JSON to a configured endpoint (a dashboard or an
//! alerting relay). Failures are reported to the caller, which logs and
//! moves on; the scoring pipeline never waits on retries.

use async_trait::async_trait;

use crate::domain::InstitutionalSignal;
use crate::ports::signal_sink::{SignalSink, SinkError};

pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SignalSink for WebhookSink {
    async fn deliver(&self, signal: &InstitutionalSignal) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(signal)
            .send()
            .await
            .map_err(|e| SinkError::Delivery(e.to_string()))?;

        response
            .error_for_status()
            .map_err(|e| SinkError::Delivery(e.to_string()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
