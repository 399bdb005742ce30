//! Configuration management for CCS credential rotation

use config::ConfigError;
use serde::Deserialize;
use std::env;
use std::fmt;

/// Default region used when none is configured. IAM requests are signed for
/// the partition's home region regardless of this value.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Upper bound on the rotation timeout (one week)
pub const MAX_ROTATION_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Service account whose keys are rotated unless overridden.
pub const DEFAULT_IDENTITY_NAME: &str = "osdCcsAdmin";

/// Static AWS credentials used to build the IAM session
#[derive(Clone, Deserialize)]
pub struct AwsCredentialsConfig {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl fmt::Debug for AwsCredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentialsConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Key rotation tuning
#[derive(Debug, Clone, Deserialize)]
pub struct RotationConfig {
    /// Identity whose access keys are listed, deleted and created
    pub identity_name: String,
    pub poll_interval_secs: u64,
    /// Overall ceiling for waiting on key capacity
    pub timeout_secs: u64,
    /// Keys younger than this are never deleted
    pub min_key_age_secs: u64,
    /// Service-imposed access key quota per identity
    pub max_keys_per_identity: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            identity_name: DEFAULT_IDENTITY_NAME.to_string(),
            poll_interval_secs: 120,
            timeout_secs: 90 * 60,
            min_key_age_secs: 5 * 60,
            max_keys_per_identity: 2,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub aws: AwsCredentialsConfig,
    pub rotation: RotationConfig,
    pub log_level: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_key = first_of(&lookup, &["OCM_AWS_ACCESS_KEY", "AWS_ACCESS_KEY_ID"])
            .ok_or_else(|| ConfigError::NotFound("OCM_AWS_ACCESS_KEY".to_string()))?;
        let secret_key = first_of(&lookup, &["OCM_AWS_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"])
            .ok_or_else(|| ConfigError::NotFound("OCM_AWS_SECRET_KEY".to_string()))?;
        let region = first_of(&lookup, &["CLOUD_PROVIDER_REGION", "AWS_REGION"])
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let defaults = RotationConfig::default();
        let rotation = RotationConfig {
            identity_name: first_of(&lookup, &["CCS_IDENTITY_NAME"])
                .unwrap_or(defaults.identity_name),
            poll_interval_secs: parse_or(
                &lookup,
                "CCS_ROTATION_POLL_INTERVAL_SECS",
                defaults.poll_interval_secs,
            )?,
            timeout_secs: parse_or(&lookup, "CCS_ROTATION_TIMEOUT_SECS", defaults.timeout_secs)?,
            min_key_age_secs: parse_or(
                &lookup,
                "CCS_ROTATION_MIN_KEY_AGE_SECS",
                defaults.min_key_age_secs,
            )?,
            max_keys_per_identity: parse_or(
                &lookup,
                "CCS_ROTATION_MAX_KEYS",
                defaults.max_keys_per_identity,
            )?,
        };

        if rotation.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "CCS_ROTATION_POLL_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        if rotation.timeout_secs > MAX_ROTATION_TIMEOUT_SECS {
            return Err(ConfigError::Message(format!(
                "CCS_ROTATION_TIMEOUT_SECS must not exceed {}",
                MAX_ROTATION_TIMEOUT_SECS
            )));
        }
        if rotation.max_keys_per_identity == 0 {
            return Err(ConfigError::Message(
                "CCS_ROTATION_MAX_KEYS must be greater than zero".to_string(),
            ));
        }

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            aws: AwsCredentialsConfig {
                access_key,
                secret_key,
                region,
            },
            rotation,
            log_level: Some(log_level),
        })
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

/// First non-empty value among `names`, in order
fn first_of<F>(lookup: &F, names: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .filter_map(|&name| lookup(name))
        .find(|value| !value.trim().is_empty())
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Message(format!("{} has an invalid value: {}", name, raw))),
        _ => Ok(default),
    }
}
