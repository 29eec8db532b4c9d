//! Configuration Loader
//!
//! Loads and validates configuration from TOML files. Every section falls
//! back to documented defaults, and validation runs at startup: an invalid
//! configuration is a fatal error, never a silently patched one.

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use chrono::{NaiveTime, Weekday};

use crate::domain::{EventSchema, IngestionBudget, SessionCalendar};

/// Tolerance when checking that the confidence weights sum to 1
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Main configuration structure matching flowscope.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamSection,
    pub pressure: PressureSection,
    pub signal: SignalSection,
    pub weights: WeightsSection,
    pub baseline: BaselineSection,
    pub market_making: MarketMakingSection,
    pub budget: BudgetSection,
    pub session: SessionSection,
    pub store: StoreSection,
    pub sinks: SinksSection,
    pub logging: LoggingSection,
}

/// Stream reliability configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    /// Underlying symbol whose option chain is subscribed
    pub underlying: String,
    /// Bound of the event channel between stream layer and aggregator
    pub channel_buffer: usize,
    /// Bound of the pressure-record ring toward the scoring worker
    pub record_buffer: usize,
    /// Reconnect backoff base in milliseconds
    pub backoff_base_ms: u64,
    /// Reconnect backoff cap in milliseconds
    pub backoff_max_ms: u64,
    /// Uniform jitter added to every backoff delay
    pub jitter_ms: u64,
    /// Consecutive failures within the window that are fatal
    pub max_failures: u32,
    /// Failure-counting window in seconds
    pub failure_window_secs: u64,
    /// Poll interval while the session is closed or the budget is spent
    pub idle_poll_secs: u64,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            underlying: "ES".to_string(),
            channel_buffer: 1024,
            record_buffer: 256,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
            jitter_ms: 250,
            max_failures: 5,
            failure_window_secs: 300,
            idle_poll_secs: 30,
        }
    }
}

/// Window aggregation configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PressureSection {
    /// Fixed aggregation window in seconds
    pub window_secs: u64,
    /// Trade count at which aggregation confidence saturates
    pub full_confidence_trades: u32,
}

impl Default for PressureSection {
    fn default() -> Self {
        Self {
            window_secs: 300,
            full_confidence_trades: 10,
        }
    }
}

/// Signal gating and classification section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalSection {
    /// Minimum directional pressure ratio to consider a window
    pub min_ratio: f64,
    /// Minimum combined bid+ask volume
    pub min_volume: u64,
    /// Minimum aggregation confidence
    pub min_aggregation_confidence: f64,
    /// Final-confidence emission floor
    pub min_final_confidence: f64,
    /// Confidence needed for STRONG_BUY / STRONG_SELL
    pub strong_action_confidence: f64,
    /// Log anomalous windows that fall below the emission floor
    pub log_suppressed_anomalies: bool,
}

impl Default for SignalSection {
    fn default() -> Self {
        Self {
            min_ratio: 2.0,
            min_volume: 100,
            min_aggregation_confidence: 0.8,
            min_final_confidence: 0.6,
            strong_action_confidence: 0.85,
            log_suppressed_anomalies: true,
        }
    }
}

/// Confidence composition weights; must sum to 1
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeightsSection {
    pub pressure: f64,
    pub baseline: f64,
    pub market_making: f64,
    pub coordination: f64,
}

impl Default for WeightsSection {
    fn default() -> Self {
        Self {
            pressure: 0.4,
            baseline: 0.3,
            market_making: 0.2,
            coordination: 0.1,
        }
    }
}

impl WeightsSection {
    pub fn sum(&self) -> f64 {
        self.pressure + self.baseline + self.market_making + self.coordination
    }
}

/// Baseline engine configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BaselineSection {
    /// Sessions in the rolling lookback window
    pub lookback_days: usize,
    /// |z| above which a window is anomalous
    pub z_threshold: f64,
    /// Samples required before anomaly calls are made
    pub min_samples: usize,
    /// Below this standard deviation the z-score is forced to 0
    pub stddev_epsilon: f64,
    /// Cached stats older than this are recomputed
    pub stale_after_hours: i64,
}

impl Default for BaselineSection {
    fn default() -> Self {
        Self {
            lookback_days: 20,
            z_threshold: 2.0,
            min_samples: 5,
            stddev_epsilon: 1e-9,
            stale_after_hours: 24,
        }
    }
}

/// Market-making detector configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketMakingSection {
    /// How far apart two windows may be and still count as simultaneous
    pub window_secs: u64,
    /// Probability above which the recommended action is forced to IGNORE
    pub max_probability: f64,
    /// Volume a window needs before it can look like market making
    pub straddle_min_volume: u64,
    /// Minority-side share that counts as two-sided flow
    pub two_sided_share: f64,
    /// Ratio band (band⁻¹ .. band) treated as directionless
    pub crush_ratio_band: f64,
}

impl Default for MarketMakingSection {
    fn default() -> Self {
        Self {
            window_secs: 300,
            max_probability: 0.5,
            straddle_min_volume: 100,
            two_sided_share: 0.25,
            crush_ratio_band: 1.5,
        }
    }
}

/// Ingestion budget configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BudgetSection {
    pub daily_usd: f64,
    /// Fraction of the budget past which backfills stop
    pub soft_threshold: f64,
    pub live_cost_per_hour_usd: f64,
    pub backfill_cost_per_thousand_usd: f64,
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            daily_usd: 25.0,
            soft_threshold: 0.8,
            live_cost_per_hour_usd: 0.5,
            backfill_cost_per_thousand_usd: 0.1,
        }
    }
}

/// Weekly session calendar section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub venue_utc_offset_hours: i32,
    /// Weekday names ("Sun") and times ("17:00") in venue local time.
    /// Equal open and close bounds mean a continuous session.
    pub open_day: String,
    pub open_time: String,
    pub close_day: String,
    pub close_time: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            venue_utc_offset_hours: -6,
            open_day: "Sun".to_string(),
            open_time: "17:00".to_string(),
            close_day: "Fri".to_string(),
            close_time: "16:00".to_string(),
        }
    }
}

/// Durable store configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Directory holding baseline samples and cached stats
    pub data_dir: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            data_dir: "data/baseline".to_string(),
        }
    }
}

impl StoreSection {
    /// Data directory with environment variable override
    /// Checks FLOWSCOPE_DATA_DIR first, falls back to the config value
    pub fn get_data_dir(&self) -> String {
        std::env::var("FLOWSCOPE_DATA_DIR").unwrap_or_else(|_| self.data_dir.clone())
    }
}

/// Outbound sinks configuration section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SinksSection {
    /// Append every emitted signal to this JSONL file (empty = disabled)
    pub jsonl_path: String,
    /// POST every emitted signal to a webhook
    pub webhook_enabled: bool,
    pub webhook_url: String,
}

impl SinksSection {
    /// Webhook URL with environment variable override
    /// Checks FLOWSCOPE_WEBHOOK_URL first, falls back to the config value
    pub fn get_webhook_url(&self) -> String {
        std::env::var("FLOWSCOPE_WEBHOOK_URL").unwrap_or_else(|_| self.webhook_url.clone())
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Weights: non-negative, summing to 1 across the additive terms
        for (name, w) in [
            ("weights.pressure", self.weights.pressure),
            ("weights.baseline", self.weights.baseline),
            ("weights.market_making", self.weights.market_making),
            ("weights.coordination", self.weights.coordination),
        ] {
            if w < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be >= 0, got {}",
                    name, w
                )));
            }
        }
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::ValidationError(format!(
                "confidence weights must sum to 1, got {}",
                sum
            )));
        }

        // Signal thresholds
        if self.signal.min_ratio < 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "signal.min_ratio must be >= 1, got {}",
                self.signal.min_ratio
            )));
        }
        for (name, v) in [
            (
                "signal.min_aggregation_confidence",
                self.signal.min_aggregation_confidence,
            ),
            (
                "signal.min_final_confidence",
                self.signal.min_final_confidence,
            ),
            (
                "signal.strong_action_confidence",
                self.signal.strong_action_confidence,
            ),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be in 0..=1, got {}",
                    name, v
                )));
            }
        }

        // Window aggregation
        if self.pressure.window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pressure.window_secs must be > 0".to_string(),
            ));
        }
        if self.pressure.full_confidence_trades == 0 {
            return Err(ConfigError::ValidationError(
                "pressure.full_confidence_trades must be > 0".to_string(),
            ));
        }

        // Baseline
        if self.baseline.lookback_days == 0 {
            return Err(ConfigError::ValidationError(
                "baseline.lookback_days must be > 0".to_string(),
            ));
        }
        if self.baseline.z_threshold <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "baseline.z_threshold must be > 0, got {}",
                self.baseline.z_threshold
            )));
        }
        if self.baseline.min_samples == 0 {
            return Err(ConfigError::ValidationError(
                "baseline.min_samples must be >= 1".to_string(),
            ));
        }
        if self.baseline.stddev_epsilon <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "baseline.stddev_epsilon must be > 0, got {}",
                self.baseline.stddev_epsilon
            )));
        }
        if self.baseline.stale_after_hours <= 0 {
            return Err(ConfigError::ValidationError(
                "baseline.stale_after_hours must be > 0".to_string(),
            ));
        }

        // Market making
        if !(0.0..=1.0).contains(&self.market_making.max_probability) {
            return Err(ConfigError::ValidationError(format!(
                "market_making.max_probability must be in 0..=1, got {}",
                self.market_making.max_probability
            )));
        }
        if !(0.0..=0.5).contains(&self.market_making.two_sided_share) {
            return Err(ConfigError::ValidationError(format!(
                "market_making.two_sided_share must be in 0..=0.5, got {}",
                self.market_making.two_sided_share
            )));
        }
        if self.market_making.crush_ratio_band < 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "market_making.crush_ratio_band must be >= 1, got {}",
                self.market_making.crush_ratio_band
            )));
        }
        if self.market_making.window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "market_making.window_secs must be > 0".to_string(),
            ));
        }

        // Budget
        if self.budget.daily_usd <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "budget.daily_usd must be > 0, got {}",
                self.budget.daily_usd
            )));
        }
        if !(0.0..=1.0).contains(&self.budget.soft_threshold) || self.budget.soft_threshold == 0.0
        {
            return Err(ConfigError::ValidationError(format!(
                "budget.soft_threshold must be in (0, 1], got {}",
                self.budget.soft_threshold
            )));
        }
        if self.budget.live_cost_per_hour_usd < 0.0
            || self.budget.backfill_cost_per_thousand_usd < 0.0
        {
            return Err(ConfigError::ValidationError(
                "budget cost rates must be >= 0".to_string(),
            ));
        }

        // Stream
        if self.stream.underlying.is_empty() {
            return Err(ConfigError::ValidationError(
                "stream.underlying cannot be empty".to_string(),
            ));
        }
        if self.stream.channel_buffer == 0 || self.stream.record_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "stream channel buffers must be > 0".to_string(),
            ));
        }
        if self.stream.backoff_max_ms < self.stream.backoff_base_ms {
            return Err(ConfigError::ValidationError(format!(
                "stream.backoff_max_ms ({}) must be >= backoff_base_ms ({})",
                self.stream.backoff_max_ms, self.stream.backoff_base_ms
            )));
        }
        if self.stream.max_failures == 0 {
            return Err(ConfigError::ValidationError(
                "stream.max_failures must be >= 1".to_string(),
            ));
        }

        // Session calendar must parse
        self.session_calendar()?;

        // Sinks
        if self.sinks.webhook_enabled && self.sinks.get_webhook_url().is_empty() {
            return Err(ConfigError::ValidationError(
                "sinks.webhook_url required when webhook_enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the session gate from the session section
    pub fn session_calendar(&self) -> Result<SessionCalendar, ConfigError> {
        let open_day = parse_weekday("session.open_day", &self.session.open_day)?;
        let close_day = parse_weekday("session.close_day", &self.session.close_day)?;
        let open_time = parse_time("session.open_time", &self.session.open_time)?;
        let close_time = parse_time("session.close_time", &self.session.close_time)?;

        SessionCalendar::new(
            self.session.venue_utc_offset_hours,
            open_day,
            open_time,
            close_day,
            close_time,
        )
        .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn parse_weekday(field: &str, value: &str) -> Result<Weekday, ConfigError> {
    Weekday::from_str(value)
        .map_err(|_| ConfigError::ValidationError(format!("{}: unknown weekday '{}'", field, value)))
}

fn parse_time(field: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| ConfigError::ValidationError(format!("{}: expected HH:MM, got '{}'", field, value)))
}

// Conversions from Config to the engine parameter structs

impl From<&Config> for crate::baseline::engine::BaselineParams {
    fn from(config: &Config) -> Self {
        Self {
            lookback_days: config.baseline.lookback_days,
            z_threshold: config.baseline.z_threshold,
            min_samples: config.baseline.min_samples,
            stddev_epsilon: config.baseline.stddev_epsilon,
            stale_after_hours: config.baseline.stale_after_hours,
        }
    }
}

impl From<&Config> for crate::signal::market_making::MarketMakingParams {
    fn from(config: &Config) -> Self {
        Self {
            window_secs: config.market_making.window_secs,
            max_probability: config.market_making.max_probability,
            straddle_min_volume: config.market_making.straddle_min_volume,
            two_sided_share: config.market_making.two_sided_share,
            crush_ratio_band: config.market_making.crush_ratio_band,
        }
    }
}

impl From<&Config> for crate::signal::engine::SignalParams {
    fn from(config: &Config) -> Self {
        use crate::signal::engine::Weights;

        Self {
            min_ratio: config.signal.min_ratio,
            min_volume: config.signal.min_volume,
            min_aggregation_confidence: config.signal.min_aggregation_confidence,
            min_final_confidence: config.signal.min_final_confidence,
            strong_action_confidence: config.signal.strong_action_confidence,
            log_suppressed_anomalies: config.signal.log_suppressed_anomalies,
            weights: Weights {
                pressure: config.weights.pressure,
                baseline: config.weights.baseline,
                market_making: config.weights.market_making,
                coordination: config.weights.coordination,
            },
            mm: config.into(),
        }
    }
}

impl From<&Config> for IngestionBudget {
    fn from(config: &Config) -> Self {
        IngestionBudget::new(
            config.budget.daily_usd,
            config.budget.soft_threshold,
            config.budget.live_cost_per_hour_usd,
            config.budget.backfill_cost_per_thousand_usd,
        )
    }
}

impl From<&Config> for crate::stream::supervisor::StreamSettings {
    fn from(config: &Config) -> Self {
        use crate::stream::connection::BackoffPolicy;

        Self {
            underlying: config.stream.underlying.clone(),
            schemas: vec![EventSchema::Mbo, EventSchema::Trades],
            backoff: BackoffPolicy::new(
                config.stream.backoff_base_ms,
                config.stream.backoff_max_ms,
                config.stream.jitter_ms,
            ),
            max_failures: config.stream.max_failures,
            failure_window_secs: config.stream.failure_window_secs,
            idle_poll_secs: config.stream.idle_poll_secs,
        }
    }
}
