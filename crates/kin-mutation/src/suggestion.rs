//! Pending suggestions
//!
//! Actors without direct write access file suggestions. A suggestion never
//! touches the record's version; approval happens elsewhere.

use crate::rpc::RpcError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kin_record::{ActorId, FieldPatch, RecordId, SuggestionId, Version};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A proposed patch awaiting approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub target_id: RecordId,
    pub author: ActorId,
    /// Version the author was looking at
    pub base_version: Version,
    pub patch: FieldPatch,
    pub created_at: DateTime<Utc>,
}

impl Suggestion {
    #[must_use]
    pub fn new(
        target_id: RecordId,
        author: ActorId,
        base_version: Version,
        patch: FieldPatch,
    ) -> Self {
        Self {
            target_id,
            author,
            base_version,
            patch,
            created_at: Utc::now(),
        }
    }
}

/// Where suggestions are filed
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SuggestionSink: Send + Sync {
    async fn propose(&self, suggestion: &Suggestion) -> Result<SuggestionId, RpcError>;
}

#[async_trait]
impl<T: SuggestionSink + ?Sized> SuggestionSink for Arc<T> {
    async fn propose(&self, suggestion: &Suggestion) -> Result<SuggestionId, RpcError> {
        (**self).propose(suggestion).await
    }
}
