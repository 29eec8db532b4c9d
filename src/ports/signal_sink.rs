use async_trait::async_trait;
use thiserror::Error;

use crate::domain::InstitutionalSignal;

/// Signal delivery error type
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("sink I/O error: {0}")]
    Io(String),
}

/// Push interface toward the external signal consumer.
///
/// Delivery failures are logged by the caller and never propagate into the
/// scoring pipeline.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn deliver(&self, signal: &InstitutionalSignal) -> Result<(), SinkError>;

    /// Short name used in delivery-failure logs
    fn name(&self) -> &'static str {
        "sink"
    }
}
