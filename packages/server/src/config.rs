use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Backoff algorithm applied between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffAlgorithm {
    Linear,
    Exponential,
}

impl BackoffAlgorithm {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "linear" => Ok(BackoffAlgorithm::Linear),
            "exponential" => Ok(BackoffAlgorithm::Exponential),
            other => bail!("NTORQUE_BACKOFF must be linear or exponential, got {other:?}"),
        }
    }
}

/// Retry scheduling parameters shared by the due-date and status policies.
#[derive(Debug, Clone)]
pub struct DueConfig {
    pub algorithm: BackoffAlgorithm,
    /// Seconds added to every execution window.
    pub min_delay: u32,
    /// Hard ceiling on any scheduling delay, in seconds.
    pub max_delay: u32,
    /// Retry counts beyond this mark the task failed.
    pub max_retries: i32,
}

impl Default for DueConfig {
    fn default() -> Self {
        Self {
            algorithm: BackoffAlgorithm::Exponential,
            min_delay: 2,
            max_delay: 7200,
            max_retries: 36,
        }
    }
}

/// Enqueue-path settings.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub default_timeout: i32,
    /// Case-insensitive header prefix marking pass-through headers.
    pub passthrough_prefix: String,
    pub channel: String,
}

/// Notification-consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub channels: Vec<String>,
    /// Blocking-pop timeout; also the sleep after a channel error.
    pub timeout: Duration,
    /// Pause between performer spawns to smooth burst arrival.
    pub connect_delay: Duration,
}

/// Web-hook delivery settings.
#[derive(Debug, Clone)]
pub struct PerformerConfig {
    /// Response codes treated as transient besides the 5xx range.
    pub transient_codes: Vec<u16>,
    /// Advertised to the remote endpoint in the retry-limit header.
    pub retry_limit: i32,
}

/// Overdue-task scanner settings.
#[derive(Debug, Clone)]
pub struct RequeuerConfig {
    pub channel: String,
    pub interval: Duration,
    /// Pause between pushes within one tick.
    pub delay: Duration,
    pub limit: i64,
}

/// Old-task janitor settings.
#[derive(Debug, Clone)]
pub struct CleanerConfig {
    pub after_days: i64,
    pub interval: Duration,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub authenticate: bool,
    pub due: DueConfig,
    pub intake: IntakeConfig,
    pub consumer: ConsumerConfig,
    pub performer: PerformerConfig,
    pub requeuer: RequeuerConfig,
    pub cleaner: CleanerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let channel = env::var("NTORQUE_REDIS_CHANNEL").unwrap_or_else(|_| "ntorque".to_string());
        let channels: Vec<String> = channel.split_whitespace().map(str::to_owned).collect();
        let primary_channel = channels
            .first()
            .cloned()
            .context("NTORQUE_REDIS_CHANNEL must name at least one channel")?;

        let due = DueConfig {
            algorithm: BackoffAlgorithm::parse(
                &env::var("NTORQUE_BACKOFF").unwrap_or_else(|_| "exponential".to_string()),
            )?,
            min_delay: env_or("NTORQUE_MIN_DUE_DELAY", 2)?,
            max_delay: env_or("NTORQUE_MAX_DUE_DELAY", 7200)?,
            max_retries: env_or("NTORQUE_MAX_RETRIES", 36)?,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            port: env_or("PORT", 8080)?,
            authenticate: env_bool("NTORQUE_AUTHENTICATE", true)?,
            intake: IntakeConfig {
                default_timeout: env_or("NTORQUE_DEFAULT_TIMEOUT", 20)?,
                passthrough_prefix: env::var("NTORQUE_PASSTHROUGH_PREFIX")
                    .unwrap_or_else(|_| "NTORQUE-PASSTHROUGH-".to_string()),
                channel: primary_channel.clone(),
            },
            consumer: ConsumerConfig {
                channels,
                timeout: Duration::from_secs(env_or("NTORQUE_CONSUME_TIMEOUT", 10u64)?),
                connect_delay: Duration::from_secs_f64(env_or("NTORQUE_CONSUME_DELAY", 0.001)?),
            },
            performer: PerformerConfig {
                transient_codes: parse_transient_codes(
                    &env::var("NTORQUE_TRANSIENT_REQUEST_ERRORS")
                        .unwrap_or_else(|_| "408,423,429,449".to_string()),
                )?,
                retry_limit: due.max_retries,
            },
            requeuer: RequeuerConfig {
                channel: primary_channel,
                interval: Duration::from_secs(env_or("NTORQUE_REQUEUE_INTERVAL", 5u64)?),
                delay: Duration::from_secs_f64(env_or("NTORQUE_REQUEUE_DELAY", 0.001)?),
                limit: env_or("NTORQUE_REQUEUE_LIMIT", 99)?,
            },
            cleaner: CleanerConfig {
                after_days: env_or("NTORQUE_CLEANUP_AFTER_DAYS", 7)?,
                interval: Duration::from_secs(env_or("NTORQUE_CLEANUP_INTERVAL", 7200u64)?),
            },
            due,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => bail!("{key} must be a boolean, got {other:?}"),
        },
        Err(_) => Ok(default),
    }
}

fn parse_transient_codes(raw: &str) -> Result<Vec<u16>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u16>().map_err(|e| {
                anyhow::anyhow!("NTORQUE_TRANSIENT_REQUEST_ERRORS entry {s:?} is invalid: {e}")
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transient_codes() {
        assert_eq!(
            parse_transient_codes("408,423,429,449").unwrap(),
            vec![408, 423, 429, 449]
        );
        assert_eq!(parse_transient_codes("400").unwrap(), vec![400]);
        assert!(parse_transient_codes("408,nope").is_err());
    }

    #[test]
    fn test_backoff_algorithm_parse() {
        assert_eq!(
            BackoffAlgorithm::parse("linear").unwrap(),
            BackoffAlgorithm::Linear
        );
        assert_eq!(
            BackoffAlgorithm::parse("exponential").unwrap(),
            BackoffAlgorithm::Exponential
        );
        assert!(BackoffAlgorithm::parse("fibonacci").is_err());
    }
}
