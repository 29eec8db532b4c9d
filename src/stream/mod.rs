//! Stream Reliability Layer - gap-free ingestion under a budget

pub mod connection;
pub mod gap;
pub mod supervisor;

pub use connection::{BackoffPolicy, ConnectionState, ConnectionStatus, StreamStats};
pub use gap::{merge_recovered, SeqOutcome};
pub use supervisor::{IngestError, StreamSettings, StreamSupervisor};
