use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{EventSchema, Instrument, OrderEvent};

/// Market data error type
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("missing data entitlement: {0}")]
    MissingEntitlement(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("backfill error: {0}")]
    Backfill(String),

    #[error("malformed event: {0}")]
    Malformed(String),

    /// The source has no more data to serve (finite captures)
    #[error("end of stream")]
    EndOfStream,
}

impl FeedError {
    /// Configuration errors that must abort startup rather than be retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FeedError::InvalidCredentials(_) | FeedError::MissingEntitlement(_)
        )
    }
}

/// Market data port trait.
///
/// A subscription covers every tracked instrument of one underlying and
/// yields an ordered, per-instrument-sequenced event stream. The historical
/// range query is bounded and used only for gap recovery.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Subscribe to live order events for all instruments of `underlying`
    async fn subscribe(
        &self,
        underlying: &str,
        schemas: &[EventSchema],
    ) -> Result<mpsc::Receiver<OrderEvent>, FeedError>;

    /// Fetch the events of one instrument in `[start_seq, end_seq]` inclusive
    async fn backfill(
        &self,
        instrument: &Instrument,
        start_seq: u64,
        end_seq: u64,
    ) -> Result<Vec<OrderEvent>, FeedError>;
}
