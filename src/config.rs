/*!
 * Configuration types for Rampart
 *
 * A resilience profile is a TOML document with one optional section per
 * primitive plus logging. Durations are written in milliseconds.
 */

use rampart_core_resilience::{CircuitBreakerConfig, RateLimiterConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RampartError, Result};

/// Complete configuration for the resilience stack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResilienceProfile {
    /// Circuit breaker settings
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Rate limiter settings (capacity and rate have no defaults)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limiter: Option<RateLimiterSettings>,

    /// Retry settings
    #[serde(default)]
    pub retry: RetrySettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LogSettings,
}

/// `[circuit_breaker]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    /// Consecutive half-open successes that close the circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: usize,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Time the circuit stays open before probing, in milliseconds
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            call_timeout_ms: default_call_timeout_ms(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

/// `[rate_limiter]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterSettings {
    /// Bucket size
    pub capacity: u32,

    /// Tokens added per second
    pub refill_rate_per_second: f64,

    /// Background refill period in milliseconds
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,

    /// Wait-loop polling period in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Start the background refill task when the stack is built
    #[serde(default)]
    pub auto_refill: bool,
}

/// `[retry]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Backoff cap in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    /// Log level for diagnostic output
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for level = debug)
    #[serde(default)]
    pub verbose: bool,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_failure_threshold() -> usize {
    5
}

fn default_success_threshold() -> usize {
    2
}

fn default_call_timeout_ms() -> u64 {
    60_000
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_refill_interval_ms() -> u64 {
    1_000
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_exponential_base() -> f64 {
    2.0
}

impl ResilienceProfile {
    /// Load and validate a profile from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| RampartError::io(path, e))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a profile from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let profile: ResilienceProfile = toml::from_str(contents)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Render the profile as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save the profile to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = self.to_toml_string()?;
        std::fs::write(path, contents).map_err(|e| RampartError::io(path, e))
    }

    /// Check every section against the primitives' own rules
    pub fn validate(&self) -> Result<()> {
        self.circuit_breaker_config()
            .validate()
            .map_err(|e| RampartError::config("circuit_breaker", e))?;

        if let Some(limiter) = self.rate_limiter_config() {
            limiter
                .validate()
                .map_err(|e| RampartError::config("rate_limiter", e))?;
        }

        self.retry_config()
            .validate()
            .map_err(|e| RampartError::config("retry", e))?;

        Ok(())
    }

    /// Circuit breaker configuration for this profile
    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        let settings = &self.circuit_breaker;
        CircuitBreakerConfig {
            failure_threshold: settings.failure_threshold,
            success_threshold: settings.success_threshold,
            call_timeout: Duration::from_millis(settings.call_timeout_ms),
            reset_timeout: Duration::from_millis(settings.reset_timeout_ms),
        }
    }

    /// Rate limiter configuration, if the profile has a `[rate_limiter]` section
    pub fn rate_limiter_config(&self) -> Option<RateLimiterConfig> {
        self.rate_limiter.as_ref().map(|settings| RateLimiterConfig {
            capacity: settings.capacity,
            refill_rate_per_second: settings.refill_rate_per_second,
            refill_interval: Duration::from_millis(settings.refill_interval_ms),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
        })
    }

    /// Retry configuration for this profile
    pub fn retry_config(&self) -> RetryConfig {
        let settings = &self.retry;
        RetryConfig {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            exponential_base: settings.exponential_base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core_resilience::ConfigError;

    #[test]
    fn test_defaults_match_primitives() {
        let profile = ResilienceProfile::default();

        assert_eq!(
            profile.circuit_breaker_config(),
            CircuitBreakerConfig::default()
        );
        assert_eq!(profile.retry_config(), RetryConfig::default());
        assert!(profile.rate_limiter_config().is_none());
        assert_eq!(profile.logging.level, LogLevel::Info);
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let profile = ResilienceProfile::from_toml_str("").unwrap();
        assert_eq!(profile, ResilienceProfile::default());
    }

    #[test]
    fn test_partial_sections() {
        let toml_str = r#"
            [circuit_breaker]
            failure_threshold = 1
            reset_timeout_ms = 50

            [rate_limiter]
            capacity = 5
            refill_rate_per_second = 10.0

            [logging]
            level = "debug"
        "#;

        let profile = ResilienceProfile::from_toml_str(toml_str).unwrap();
        let breaker = profile.circuit_breaker_config();
        assert_eq!(breaker.failure_threshold, 1);
        assert_eq!(breaker.success_threshold, 2);
        assert_eq!(breaker.reset_timeout, Duration::from_millis(50));

        let limiter = profile.rate_limiter_config().unwrap();
        assert_eq!(limiter.capacity, 5);
        assert_eq!(limiter.refill_interval, Duration::from_secs(1));
        assert_eq!(limiter.poll_interval, Duration::from_millis(10));
        assert!(!profile.rate_limiter.as_ref().unwrap().auto_refill);

        assert_eq!(profile.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_rate_limiter_requires_capacity_and_rate() {
        let err = ResilienceProfile::from_toml_str("[rate_limiter]\ncapacity = 5\n").unwrap_err();
        assert!(matches!(err, RampartError::Parse(_)));
    }

    #[test]
    fn test_invalid_values_name_their_section() {
        let err = ResilienceProfile::from_toml_str("[retry]\nexponential_base = 0.5\n").unwrap_err();
        match err {
            RampartError::Config { section, source } => {
                assert_eq!(section, "retry");
                assert_eq!(source, ConfigError::InvalidBase(0.5));
            }
            other => panic!("Expected Config error, got {:?}", other),
        }

        let err =
            ResilienceProfile::from_toml_str("[circuit_breaker]\nsuccess_threshold = 0\n").unwrap_err();
        assert!(err.to_string().contains("circuit_breaker"));
    }

    #[test]
    fn test_toml_serialization() {
        let mut profile = ResilienceProfile::default();
        profile.rate_limiter = Some(RateLimiterSettings {
            capacity: 20,
            refill_rate_per_second: 2.5,
            refill_interval_ms: 500,
            poll_interval_ms: 5,
            auto_refill: true,
        });
        profile.logging.verbose = true;

        let rendered = profile.to_toml_string().unwrap();
        assert!(rendered.contains("[rate_limiter]"));
        assert_eq!(ResilienceProfile::from_toml_str(&rendered).unwrap(), profile);
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
