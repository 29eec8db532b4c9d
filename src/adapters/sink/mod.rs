//! Outbound signal sink adapters

pub mod jsonl_sink;
pub mod log_sink;
pub mod webhook;

pub use jsonl_sink::JsonlSink;
pub use log_sink::LogSink;
pub use webhook::WebhookSink;
