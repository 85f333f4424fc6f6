//! Mutation RPC seam
//!
//! The backend exposes a compare-and-swap endpoint that atomically checks
//! `stored_version == expected_version`, applies the whole patch and bumps the
//! version, or refuses without applying anything.

use async_trait::async_trait;
use kin_record::{MutationRequest, ProfileRecord, RecordId, Version};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Successful compare-and-swap acknowledgement
///
/// Backends may return `{}` (new version implied) or `{ newVersion }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasAck {
    #[serde(default)]
    pub new_version: Option<Version>,
}

impl CasAck {
    /// Ack with an explicit new version
    #[inline]
    #[must_use]
    pub fn explicit(new_version: Version) -> Self {
        Self {
            new_version: Some(new_version),
        }
    }

    /// New version, defaulting to `expected + 1`
    #[inline]
    #[must_use]
    pub fn resolve(&self, expected: Version) -> Version {
        self.new_version.unwrap_or_else(|| expected.next())
    }
}

/// Remote mutation endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MutationRpc: Send + Sync {
    /// Atomic check-then-set of the whole patch
    async fn compare_and_swap(&self, request: &MutationRequest) -> Result<CasAck, RpcError>;

    /// Current authoritative record
    async fn fetch_record(&self, id: &RecordId) -> Result<ProfileRecord, RpcError>;
}

#[async_trait]
impl<T: MutationRpc + ?Sized> MutationRpc for Arc<T> {
    async fn compare_and_swap(&self, request: &MutationRequest) -> Result<CasAck, RpcError> {
        (**self).compare_and_swap(request).await
    }

    async fn fetch_record(&self, id: &RecordId) -> Result<ProfileRecord, RpcError> {
        (**self).fetch_record(id).await
    }
}

/// Raw RPC failure, before classification
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    /// Backend answered with an application error
    #[error("application error {}: {message}", .code.as_deref().unwrap_or("-"))]
    Application {
        code: Option<String>,
        message: String,
        /// Stored version, when the backend reports it
        current_version: Option<Version>,
    },

    /// Call did not complete; server state unknown
    #[error("transport failure: {message}")]
    Transport { message: String, retryable: bool },

    /// Record does not exist
    #[error("record not found: {0}")]
    NotFound(RecordId),
}

impl RpcError {
    /// Application error with a code
    #[must_use]
    pub fn coded(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Application {
            code: Some(code.into()),
            message: message.into(),
            current_version: None,
        }
    }

    /// Application error identified only by its message
    #[must_use]
    pub fn message_only(message: impl Into<String>) -> Self {
        Self::Application {
            code: None,
            message: message.into(),
            current_version: None,
        }
    }

    /// Attach the stored version reported by the backend
    #[must_use]
    pub fn with_current_version(mut self, version: Version) -> Self {
        if let Self::Application {
            current_version, ..
        } = &mut self
        {
            *current_version = Some(version);
        }
        self
    }

    #[must_use]
    pub fn transport(message: impl Into<String>, retryable: bool) -> Self {
        Self::Transport {
            message: message.into(),
            retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ack_implies_next_version() {
        let ack: CasAck = serde_json::from_str("{}").unwrap();
        assert_eq!(ack.resolve(Version::new(3)), Version::new(4));
    }

    #[test]
    fn explicit_ack_wins() {
        let ack: CasAck = serde_json::from_str(r#"{"newVersion": 9}"#).unwrap();
        assert_eq!(ack.resolve(Version::new(3)), Version::new(9));
    }

    #[test]
    fn display_includes_code() {
        let err = RpcError::coded("P0409", "stale");
        assert_eq!(err.to_string(), "application error P0409: stale");
        assert_eq!(
            RpcError::message_only("boom").to_string(),
            "application error -: boom"
        );
    }
}
