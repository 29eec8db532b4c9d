//! JSONL capture sink: one signal per line, append-only.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::InstitutionalSignal;
use crate::ports::signal_sink::{SignalSink, SinkError};

pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SignalSink for JsonlSink {
    async fn deliver(&self, signal: &InstitutionalSignal) -> Result<(), SinkError> {
        let line = serde_json::to_string(signal)
            .map_err(|e| SinkError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SinkError::Io(e.to_string()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SinkError::Io(e.to_string()))?;

        writeln!(file, "{}", line).map_err(|e| SinkError::Io(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}
