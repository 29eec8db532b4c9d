pub mod engine;

pub use engine::{EngineCounters, EngineError, EngineStatus, FlowEngine};
