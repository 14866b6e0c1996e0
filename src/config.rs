//! Configuration types.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Users per message-listing call.
pub const DEFAULT_BATCH_SIZE: usize = 2;

/// Concurrent spam checks.
pub const DEFAULT_CLASSIFY_WORKERS: usize = 5;

/// Concurrent identity lookups in the dedup stage.
pub const DEFAULT_MAX_CONCURRENT_LOOKUPS: usize = 64;

/// What the classify stage emits when the spam check fails for a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClassifyErrorPolicy {
    /// Emit the record as not spam (the checker's zero value).
    #[default]
    ReportClean,
    /// Drop the message from the report.
    Exclude,
    /// Emit the record as spam.
    ReportSpam,
}

impl ClassifyErrorPolicy {
    /// Flag to report for a failed check, or `None` to drop the record.
    pub fn fallback(self) -> Option<bool> {
        match self {
            Self::ReportClean => Some(false),
            Self::Exclude => None,
            Self::ReportSpam => Some(true),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReportClean => "report-clean",
            Self::Exclude => "exclude",
            Self::ReportSpam => "report-spam",
        }
    }
}

impl fmt::Display for ClassifyErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifyErrorPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "report-clean" | "clean" => Ok(Self::ReportClean),
            "exclude" | "skip" => Ok(Self::Exclude),
            "report-spam" | "spam" => Ok(Self::ReportSpam),
            other => Err(ConfigError::InvalidValue {
                key: ENV_ON_CLASSIFY_ERROR.to_string(),
                message: format!(
                    "unknown policy '{other}', expected report-clean, exclude or report-spam"
                ),
            }),
        }
    }
}

const ENV_BATCH_SIZE: &str = "SPAMCHECK_BATCH_SIZE";
const ENV_CLASSIFY_WORKERS: &str = "SPAMCHECK_CLASSIFY_WORKERS";
const ENV_MAX_CONCURRENT_LOOKUPS: &str = "SPAMCHECK_MAX_CONCURRENT_LOOKUPS";
const ENV_ON_CLASSIFY_ERROR: &str = "SPAMCHECK_ON_CLASSIFY_ERROR";

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum users per message-listing call. Only the last batch may be smaller.
    pub batch_size: usize,
    /// Size of the spam-check worker pool.
    pub classify_workers: usize,
    /// Upper bound on in-flight identity lookups.
    pub max_concurrent_lookups: usize,
    /// Behaviour when a spam check fails.
    pub classify_error_policy: ClassifyErrorPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            classify_workers: DEFAULT_CLASSIFY_WORKERS,
            max_concurrent_lookups: DEFAULT_MAX_CONCURRENT_LOOKUPS,
            classify_error_policy: ClassifyErrorPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Build a config from `SPAMCHECK_*` environment variables, defaulting unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            batch_size: parse_size(&lookup, ENV_BATCH_SIZE, defaults.batch_size)?,
            classify_workers: parse_size(&lookup, ENV_CLASSIFY_WORKERS, defaults.classify_workers)?,
            max_concurrent_lookups: parse_size(
                &lookup,
                ENV_MAX_CONCURRENT_LOOKUPS,
                defaults.max_concurrent_lookups,
            )?,
            classify_error_policy: match lookup(ENV_ON_CLASSIFY_ERROR) {
                Some(raw) => raw.parse()?,
                None => defaults.classify_error_policy,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject sizes that would stall the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            (ENV_BATCH_SIZE, self.batch_size),
            (ENV_CLASSIFY_WORKERS, self.classify_workers),
            (ENV_MAX_CONCURRENT_LOOKUPS, self.max_concurrent_lookups),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn parse_size<F>(lookup: &F, key: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}' is not a valid count: {e}"),
            }),
    }
}
