use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SEGMENT_LEN_SECS: f64 = 600.0;
pub const DEFAULT_OVERLAP_SECS: f64 = 1.0;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_RETRIES: u8 = 2;
pub const DEFAULT_RETRY_BASE_SECS: u64 = 2;
pub const DEFAULT_SEGMENT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_FAILURE_RATIO: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Segment length must be positive, got {0}")]
    InvalidSegmentLength(f64),

    #[error("Overlap must satisfy 0 <= overlap < segment length, got overlap={overlap} length={length}")]
    InvalidOverlap { overlap: f64, length: f64 },

    #[error("Concurrency bound must be at least 1")]
    InvalidConcurrency,

    #[error("Failure ratio threshold must be within [0, 1], got {0}")]
    InvalidFailureRatio(f64),

    #[error("Asset duration must be positive, got {0}")]
    InvalidDuration(f64),

    #[error("Manifest contains no segments")]
    EmptyManifest,

    #[error("Invalid value for {key}: {value}")]
    InvalidEnvValue { key: String, value: String },
}

/// Tunables for one transcription job. Validated once before any dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Target segment length in seconds.
    pub segment_len_secs: f64,
    /// Overlap added on each side of an internal segment boundary.
    pub overlap_secs: f64,
    /// Maximum segments in flight at once.
    pub max_concurrency: usize,
    /// Retries after the first attempt for a transiently failing segment.
    pub max_retries: u8,
    /// Base delay for exponential retry backoff, in seconds.
    pub retry_base_secs: u64,
    /// Per-attempt timeout; an elapsed timeout counts as a transient failure.
    pub segment_timeout_secs: u64,
    /// Fraction of failed segments above which the whole job is Failed.
    pub failure_ratio_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segment_len_secs: DEFAULT_SEGMENT_LEN_SECS,
            overlap_secs: DEFAULT_OVERLAP_SECS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_secs: DEFAULT_RETRY_BASE_SECS,
            segment_timeout_secs: DEFAULT_SEGMENT_TIMEOUT_SECS,
            failure_ratio_threshold: DEFAULT_FAILURE_RATIO,
        }
    }
}

impl PipelineConfig {
    /// Build a config from `XCRIBE_*` environment variables, falling back to
    /// defaults. A `.env` file is honored when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        config.segment_len_secs = env_parse("XCRIBE_SEGMENT_LEN_SECS", config.segment_len_secs)?;
        config.overlap_secs = env_parse("XCRIBE_OVERLAP_SECS", config.overlap_secs)?;
        config.max_concurrency = env_parse("XCRIBE_MAX_CONCURRENCY", config.max_concurrency)?;
        config.max_retries = env_parse("XCRIBE_MAX_RETRIES", config.max_retries)?;
        config.retry_base_secs = env_parse("XCRIBE_RETRY_BASE_SECS", config.retry_base_secs)?;
        config.segment_timeout_secs =
            env_parse("XCRIBE_SEGMENT_TIMEOUT_SECS", config.segment_timeout_secs)?;
        config.failure_ratio_threshold =
            env_parse("XCRIBE_FAILURE_RATIO", config.failure_ratio_threshold)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.segment_len_secs.is_finite() || self.segment_len_secs <= 0.0 {
            return Err(ConfigError::InvalidSegmentLength(self.segment_len_secs));
        }
        if !self.overlap_secs.is_finite()
            || self.overlap_secs < 0.0
            || self.overlap_secs >= self.segment_len_secs
        {
            return Err(ConfigError::InvalidOverlap {
                overlap: self.overlap_secs,
                length: self.segment_len_secs,
            });
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if !self.failure_ratio_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.failure_ratio_threshold)
        {
            return Err(ConfigError::InvalidFailureRatio(self.failure_ratio_threshold));
        }
        Ok(())
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_secs(self.segment_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidEnvValue {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}
