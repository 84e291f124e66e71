//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Tunables of the question supply pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Items generated inline before a request returns.
    pub sync_slice: u32,
    /// Items generated speculatively for a predicted tier.
    pub preemptive_slice: u32,
    /// Unanswered questions of the current tier kept queued ahead of the player.
    pub backlog_window: u32,
    pub buffer_ratio: f64,
    pub buffer_min_extra: u32,
    /// Number of recent question texts passed to the generator.
    pub recent_sample: usize,
    pub generator_timeout: Duration,
    pub background_workers: usize,
    pub worker_queue_depth: usize,
    pub prefetch_ttl: Duration,
    pub delivery_wait: Duration,
    pub delivery_poll_interval: Duration,
    /// Outstanding questions at or below which a session is draining.
    pub draining_window: u32,
    pub orphan_sweep_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sync_slice: 3,
            preemptive_slice: 3,
            backlog_window: 5,
            buffer_ratio: 1.1,
            buffer_min_extra: 1,
            recent_sample: 15,
            generator_timeout: Duration::from_secs(30),
            background_workers: 4,
            worker_queue_depth: 32,
            prefetch_ttl: Duration::from_secs(120),
            delivery_wait: Duration::from_millis(2000),
            delivery_poll_interval: Duration::from_millis(250),
            draining_window: 1,
            orphan_sweep_interval: Duration::from_secs(600),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When absent the service runs against the in-memory store.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub generator_model: String,
    /// Largest quiz a single session may ask for.
    pub max_target_count: u32,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Generator Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let openai_base_url = lookup("OPENAI_BASE_URL");
        let generator_model = lookup("GENERATOR_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());

        let max_target_count = parse_or(&lookup, "MAX_TARGET_COUNT", 100)?;

        // --- Pipeline Tuning ---
        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            sync_slice: parse_or(&lookup, "SYNC_SLICE", defaults.sync_slice)?,
            preemptive_slice: parse_or(&lookup, "PREEMPTIVE_SLICE", defaults.preemptive_slice)?,
            backlog_window: parse_or(&lookup, "BACKLOG_WINDOW", defaults.backlog_window)?,
            buffer_ratio: parse_or(&lookup, "BUFFER_RATIO", defaults.buffer_ratio)?,
            buffer_min_extra: parse_or(&lookup, "BUFFER_MIN_EXTRA", defaults.buffer_min_extra)?,
            recent_sample: parse_or(&lookup, "RECENT_SAMPLE", defaults.recent_sample)?,
            generator_timeout: Duration::from_secs(parse_or(
                &lookup,
                "GENERATOR_TIMEOUT_SECS",
                defaults.generator_timeout.as_secs(),
            )?),
            background_workers: parse_or(&lookup, "BACKGROUND_WORKERS", defaults.background_workers)?,
            worker_queue_depth: parse_or(&lookup, "WORKER_QUEUE_DEPTH", defaults.worker_queue_depth)?,
            prefetch_ttl: Duration::from_secs(parse_or(
                &lookup,
                "PREFETCH_TTL_SECS",
                defaults.prefetch_ttl.as_secs(),
            )?),
            delivery_wait: Duration::from_millis(parse_or(
                &lookup,
                "DELIVERY_WAIT_MS",
                defaults.delivery_wait.as_millis() as u64,
            )?),
            delivery_poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "DELIVERY_POLL_MS",
                defaults.delivery_poll_interval.as_millis() as u64,
            )?),
            draining_window: parse_or(&lookup, "DRAINING_WINDOW", defaults.draining_window)?,
            orphan_sweep_interval: Duration::from_secs(parse_or(
                &lookup,
                "ORPHAN_SWEEP_SECS",
                defaults.orphan_sweep_interval.as_secs(),
            )?),
        };

        if pipeline.background_workers == 0 {
            return Err(ConfigError::InvalidValue(
                "BACKGROUND_WORKERS".to_string(),
                "at least one worker is required".to_string(),
            ));
        }
        if pipeline.backlog_window == 0 {
            return Err(ConfigError::InvalidValue(
                "BACKLOG_WINDOW".to_string(),
                "the backlog window must hold at least one question".to_string(),
            ));
        }
        if pipeline.delivery_poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "DELIVERY_POLL_MS".to_string(),
                "poll interval must be positive".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            openai_base_url,
            generator_model,
            max_target_count,
            pipeline,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
