//! Error-signal classification
//!
//! Structured error codes are the contract. Message matching exists only for
//! backends that predate the conflict code and is a known compatibility risk:
//! it can be switched off once every backend sends codes.

use crate::rpc::RpcError;
use kin_record::Version;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Reserved application code for a stale expected version
pub const VERSION_CONFLICT_CODE: &str = "P0409";

/// Insufficient-privilege code
pub const PERMISSION_DENIED_CODE: &str = "42501";

static PERMISSION_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)permission denied|not authori[sz]ed|forbidden|row-level security")
        .expect("static regex")
});

static CONFLICT_MESSAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)version|stale").expect("static regex"));

/// Which codes and messages identify which failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub conflict_codes: Vec<String>,
    pub permission_codes: Vec<String>,
    /// Fall back to message matching when no known code is present
    pub legacy_message_matching: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            conflict_codes: vec![VERSION_CONFLICT_CODE.to_string()],
            permission_codes: vec![PERMISSION_DENIED_CODE.to_string()],
            legacy_message_matching: true,
        }
    }
}

/// Classified RPC failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// Stale expected version; `reported` is the stored version if the backend sent it
    Conflict { reported: Option<Version> },
    PermissionDenied,
    NotFound,
    Invalid(String),
    Transport { retryable: bool },
}

/// Maps raw [`RpcError`]s onto [`ErrorClass`]
#[derive(Debug, Clone, Default)]
pub struct SignalClassifier {
    config: SignalConfig,
}

impl SignalClassifier {
    #[inline]
    #[must_use]
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Classify one failure
    ///
    /// Codes are checked before messages; permission before conflict, so a
    /// denial is never mistaken for a race.
    #[must_use]
    pub fn classify(&self, error: &RpcError) -> ErrorClass {
        match error {
            RpcError::Transport { retryable, .. } => ErrorClass::Transport {
                retryable: *retryable,
            },
            RpcError::NotFound(_) => ErrorClass::NotFound,
            RpcError::Application {
                code,
                message,
                current_version,
            } => {
                if let Some(code) = code.as_deref() {
                    if self.config.permission_codes.iter().any(|c| c == code) {
                        return ErrorClass::PermissionDenied;
                    }
                    if self.config.conflict_codes.iter().any(|c| c == code) {
                        return ErrorClass::Conflict {
                            reported: *current_version,
                        };
                    }
                }

                if self.config.legacy_message_matching {
                    if PERMISSION_MESSAGE.is_match(message) {
                        tracing::debug!("Permission denial inferred from message: {}", message);
                        return ErrorClass::PermissionDenied;
                    }
                    if CONFLICT_MESSAGE.is_match(message) {
                        tracing::warn!(
                            "Version conflict inferred from message (no conflict code): {}",
                            message
                        );
                        return ErrorClass::Conflict {
                            reported: *current_version,
                        };
                    }
                }

                ErrorClass::Invalid(message.clone())
            }
        }
    }
}
