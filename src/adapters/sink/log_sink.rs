//! Structured-log signal sink.

use async_trait::async_trait;

use crate::domain::InstitutionalSignal;
use crate::ports::signal_sink::{SignalSink, SinkError};

/// Emits every signal as a structured log line; always configured so a run
/// without external sinks still surfaces its output.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SignalSink for LogSink {
    async fn deliver(&self, signal: &InstitutionalSignal) -> Result<(), SinkError> {
        tracing::info!(
            "SIGNAL {} {} {} | ratio {:.2} vol {} | z {:.2} pct {:.0} | conf {:.3} ({}) | mm {:.2} risk {:.2}",
            signal.instrument,
            signal.action,
            signal.dominant_side,
            signal.pressure_ratio,
            signal.total_volume,
            signal.z_score,
            signal.percentile,
            signal.confidence,
            signal.tier,
            signal.mm_probability,
            signal.risk_score
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
