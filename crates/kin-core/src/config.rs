//! Editor configuration
//!
//! Every field has a default; a TOML file only needs the sections it changes.
//!
//! ```toml
//! [mutation]
//! retry_attempts = 3
//! retry_backoff_ms = 200
//!
//! [signals]
//! legacy_message_matching = false
//!
//! [abandon]
//! policy = "reverse"
//! ```

use kin_media::{AbandonPolicy, DEFAULT_KEY_PREFIX, DEFAULT_MAX_BYTES};
use kin_mutation::{RecordCache, RetryPolicy, SignalClassifier, SignalConfig};
use kin_permission::DEFAULT_RESOLVE_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level editor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub mutation: MutationSettings,
    pub signals: SignalConfig,
    pub permission: PermissionSettings,
    pub cache: CacheSettings,
    pub media: MediaSettings,
    pub abandon: AbandonSettings,
}

/// Compare-and-swap submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationSettings {
    /// Total attempts for retryable transport failures (1 = no retry)
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Re-read the record on conflict to report a current snapshot
    pub snapshot_on_conflict: bool,
}

impl Default for MutationSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_backoff_ms: 200,
            snapshot_on_conflict: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionSettings {
    pub resolve_timeout_ms: u64,
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: u64::try_from(DEFAULT_RESOLVE_TIMEOUT.as_millis()).unwrap_or(5_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub capacity: u64,
    /// Entry lifetime; unset keeps entries until invalidated or evicted
    pub ttl_secs: Option<u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            ttl_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub key_prefix: String,
    pub max_bytes: u64,
    /// Total attempts for the compensating delete
    pub cleanup_attempts: u32,
    pub cleanup_backoff_ms: u64,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_bytes: DEFAULT_MAX_BYTES,
            cleanup_attempts: 2,
            cleanup_backoff_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbandonSettings {
    pub policy: AbandonPolicy,
}

impl EditorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    /// Returns an error if the TOML is invalid or a value is out of range
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded editor config from {}", path.display());
        Ok(config)
    }

    /// Serialize configuration to TOML
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mutation.retry_attempts == 0 {
            return Err(ConfigError::Invalid("mutation.retry_attempts must be >= 1".to_string()));
        }
        if self.media.cleanup_attempts == 0 {
            return Err(ConfigError::Invalid("media.cleanup_attempts must be >= 1".to_string()));
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid("cache.capacity must be > 0".to_string()));
        }
        if self.permission.resolve_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "permission.resolve_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.signals.conflict_codes.iter().any(|c| self.signals.permission_codes.contains(c)) {
            return Err(ConfigError::Invalid(
                "signals: a code cannot mean both conflict and permission".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.mutation.retry_attempts = attempts;
        self.mutation.retry_backoff_ms = duration_ms(backoff);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_snapshot_on_conflict(mut self, enabled: bool) -> Self {
        self.mutation.snapshot_on_conflict = enabled;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_legacy_message_matching(mut self, enabled: bool) -> Self {
        self.signals.legacy_message_matching = enabled;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.permission.resolve_timeout_ms = duration_ms(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.media.key_prefix = prefix.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_cleanup_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.media.cleanup_attempts = attempts;
        self.media.cleanup_backoff_ms = duration_ms(backoff);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_abandon_policy(mut self, policy: AbandonPolicy) -> Self {
        self.abandon.policy = policy;
        self
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.mutation.retry_attempts,
            Duration::from_millis(self.mutation.retry_backoff_ms),
        )
    }

    #[must_use]
    pub fn cleanup_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.media.cleanup_attempts,
            Duration::from_millis(self.media.cleanup_backoff_ms),
        )
    }

    #[must_use]
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.permission.resolve_timeout_ms)
    }

    #[must_use]
    pub fn classifier(&self) -> SignalClassifier {
        SignalClassifier::new(self.signals.clone())
    }

    #[must_use]
    pub fn record_cache(&self) -> RecordCache {
        match self.cache.ttl_secs {
            Some(ttl) => RecordCache::with_ttl(self.cache.capacity, Duration::from_secs(ttl)),
            None => RecordCache::new(self.cache.capacity),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize config: {0}")]
    Serialize(#[source] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(EditorConfig::from_toml_str("").unwrap(), EditorConfig::default());
    }

    #[test]
    fn partial_sections_override_defaults() {
        let config = EditorConfig::from_toml_str(
            r#"
            [mutation]
            retry_attempts = 5

            [signals]
            legacy_message_matching = false

            [cache]
            ttl_secs = 30

            [abandon]
            policy = "reverse"
            "#,
        )
        .unwrap();

        assert_eq!(config.mutation.retry_attempts, 5);
        assert_eq!(config.mutation.retry_backoff_ms, 200);
        assert!(!config.signals.legacy_message_matching);
        assert_eq!(config.signals.conflict_codes, vec!["P0409".to_string()]);
        assert_eq!(config.cache.ttl_secs, Some(30));
        assert_eq!(config.abandon.policy, AbandonPolicy::Reverse);
    }

    #[test]
    fn rejects_zero_attempts_and_overlapping_codes() {
        assert!(matches!(
            EditorConfig::from_toml_str("[mutation]\nretry_attempts = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EditorConfig::from_toml_str("[signals]\nconflict_codes = [\"42501\"]"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EditorConfig::from_toml_str("[mutation\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_round_trips_through_file() {
        let config = EditorConfig::new()
            .with_retry(4, Duration::from_millis(50))
            .with_key_prefix("media")
            .with_abandon_policy(AbandonPolicy::Reverse);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();

        let loaded = EditorConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.retry_policy(), RetryPolicy::new(4, Duration::from_millis(50)));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            EditorConfig::load("/nonexistent/kin.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
