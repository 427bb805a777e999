//! Configuration loading and representation.
//!
//! All settings come from the environment. Parsing happens here, once, so the
//! components themselves only ever see typed values.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use courier_events::PublisherConfig;

use crate::expiry::ExpiryProcessorConfig;
use crate::retry::BackoffPolicy;

pub const EVENT_BUS_VAR: &str = "EVENT_PUBLISHER_EVENT_BUS_ARN";
pub const DLQ_URL_VAR: &str = "EVENT_PUBLISHER_DLQ_URL";
pub const SHARD_COUNT_VAR: &str = "TTL_SHARD_COUNT";
pub const LOOKBACK_DAYS_VAR: &str = "TTL_LOOKBACK_DAYS";
pub const CONCURRENCY_VAR: &str = "CONCURRENCY";
pub const MAX_PROCESS_SECONDS_VAR: &str = "MAX_PROCESS_SECONDS";
pub const DELETE_MAX_ROUNDS_VAR: &str = "DELETE_MAX_ROUNDS";
pub const RETRY_INITIAL_INTERVAL_MS_VAR: &str = "RETRY_INITIAL_INTERVAL_MS";
pub const RETRY_EXPONENTIAL_RATE_VAR: &str = "RETRY_EXPONENTIAL_RATE";
pub const RETRY_MAX_DELAY_MS_VAR: &str = "RETRY_MAX_DELAY_MS";
pub const RETRY_MAX_ATTEMPTS_VAR: &str = "RETRY_MAX_ATTEMPTS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Typed settings for one pipeline process.
///
/// Every stage publishes and may call out with retries; only the expiry stage
/// needs `expiry`, which is loaded when `TTL_SHARD_COUNT` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub publisher: PublisherConfig,
    pub backoff: BackoffPolicy,
    pub expiry: Option<ExpiryConfig>,
}

/// Settings of the expiry index and its poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryConfig {
    pub shard_count: u32,
    pub processor: ExpiryProcessorConfig,
}

impl PipelineConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup` (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = Settings { lookup };

        let publisher = PublisherConfig::new(
            settings.required(EVENT_BUS_VAR)?,
            settings.required(DLQ_URL_VAR)?,
        );
        let backoff = backoff(&settings)?;
        let expiry = match settings.get(SHARD_COUNT_VAR) {
            Some(_) => Some(expiry(&settings)?),
            None => None,
        };

        Ok(Self {
            publisher,
            backoff,
            expiry,
        })
    }

    /// Expiry settings, for the stage that runs the poller.
    pub fn expiry(&self) -> Result<&ExpiryConfig, ConfigError> {
        self.expiry.as_ref().ok_or(ConfigError::Missing(SHARD_COUNT_VAR))
    }
}

impl ExpiryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        expiry(&Settings { lookup })
    }
}

fn at_least_one<T>(name: &'static str, value: T) -> Result<T, ConfigError>
where
    T: PartialOrd + From<u8>,
{
    if value < T::from(1) {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be at least 1".into(),
        });
    }
    Ok(value)
}

fn expiry<F>(settings: &Settings<F>) -> Result<ExpiryConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let shard_count: u32 = at_least_one(SHARD_COUNT_VAR, settings.parse_required(SHARD_COUNT_VAR)?)?;

    let defaults = ExpiryProcessorConfig::default();
    let concurrency: usize =
        at_least_one(CONCURRENCY_VAR, settings.parse_or(CONCURRENCY_VAR, defaults.concurrency)?)?;
    let max_process_secs: u64 =
        settings.parse_or(MAX_PROCESS_SECONDS_VAR, defaults.max_process_time.as_secs())?;
    let max_delete_rounds: u32 = at_least_one(
        DELETE_MAX_ROUNDS_VAR,
        settings.parse_or(DELETE_MAX_ROUNDS_VAR, defaults.max_delete_rounds)?,
    )?;
    let lookback_days: u32 = settings.parse_or(LOOKBACK_DAYS_VAR, defaults.lookback_days)?;

    Ok(ExpiryConfig {
        shard_count,
        processor: ExpiryProcessorConfig {
            concurrency,
            max_delete_rounds,
            max_process_time: Duration::from_secs(max_process_secs),
            lookback_days,
            ..defaults
        },
    })
}

fn backoff<F>(settings: &Settings<F>) -> Result<BackoffPolicy, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = BackoffPolicy::default();
    let exponential_rate: f64 =
        settings.parse_or(RETRY_EXPONENTIAL_RATE_VAR, defaults.exponential_rate)?;
    if !exponential_rate.is_finite() || exponential_rate < 1.0 {
        return Err(ConfigError::Invalid {
            name: RETRY_EXPONENTIAL_RATE_VAR,
            reason: "must be a finite number >= 1".into(),
        });
    }

    Ok(BackoffPolicy {
        initial_interval: Duration::from_millis(settings.parse_or(
            RETRY_INITIAL_INTERVAL_MS_VAR,
            defaults.initial_interval.as_millis() as u64,
        )?),
        exponential_rate,
        max_delay: Duration::from_millis(settings.parse_or(
            RETRY_MAX_DELAY_MS_VAR,
            defaults.max_delay.as_millis() as u64,
        )?),
        max_attempts: settings.parse_or(RETRY_MAX_ATTEMPTS_VAR, defaults.max_attempts)?,
    })
}

struct Settings<F> {
    lookup: F,
}

impl<F> Settings<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn parse_required<T>(&self, name: &'static str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: core::fmt::Display,
    {
        parse(name, &self.required(name)?)
    }

    fn parse_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: core::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => parse(name, &raw),
            None => Ok(default),
        }
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse::<T>().map_err(|e| {
        warn!(setting = name, value = raw, "unparseable setting");
        ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }
    })
}
