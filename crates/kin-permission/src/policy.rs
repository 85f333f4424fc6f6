//! Relationship-derived access modes
//!
//! Family trees grant write access by relationship: a person edits their own
//! profile and those they created, close relatives may edit directly, the
//! wider tree may only suggest.

use crate::gate::{Authorizer, AuthorizerError};
use crate::mode::AccessMode;
use async_trait::async_trait;
use kin_record::{ActorId, RecordId};
use serde::{Deserialize, Serialize};

/// How an actor relates to the record being edited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    /// The record is the actor's own profile
    SelfProfile,
    /// The actor created the record
    Creator,
    /// Parent, child, sibling or spouse
    InnerCircle,
    /// Anyone else in the same tree
    TreeMember,
    /// Not in the tree
    Outsider,
}

/// What the relationship source knows about an (actor, record) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipFacts {
    pub relationship: Relationship,
    /// Record is locked against edits (e.g. claimed by a living owner)
    pub locked: bool,
}

/// Source of relationship data, usually the tree backend
#[async_trait]
pub trait RelationshipSource: Send + Sync {
    async fn facts(
        &self,
        actor: &ActorId,
        target: &RecordId,
    ) -> Result<RelationshipFacts, AuthorizerError>;
}

/// Mapping from relationship to access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPolicy {
    pub self_profile: AccessMode,
    pub creator: AccessMode,
    pub inner_circle: AccessMode,
    pub tree_member: AccessMode,
    pub outsider: AccessMode,
    /// Mode for locked records, unless the actor owns the profile
    pub locked: AccessMode,
}

impl AccessPolicy {
    /// Mode for the given facts
    #[must_use]
    pub fn mode_for(&self, facts: RelationshipFacts) -> AccessMode {
        if facts.locked && facts.relationship != Relationship::SelfProfile {
            return self.locked;
        }
        match facts.relationship {
            Relationship::SelfProfile => self.self_profile,
            Relationship::Creator => self.creator,
            Relationship::InnerCircle => self.inner_circle,
            Relationship::TreeMember => self.tree_member,
            Relationship::Outsider => self.outsider,
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            self_profile: AccessMode::Direct,
            creator: AccessMode::Direct,
            inner_circle: AccessMode::Direct,
            tree_member: AccessMode::Suggest,
            outsider: AccessMode::Blocked,
            locked: AccessMode::ReadOnly,
        }
    }
}

/// [`Authorizer`] backed by relationship facts and an [`AccessPolicy`]
#[derive(Debug, Clone)]
pub struct RelationshipAuthorizer<S> {
    source: S,
    policy: AccessPolicy,
}

impl<S: RelationshipSource> RelationshipAuthorizer<S> {
    #[inline]
    #[must_use]
    pub fn new(source: S, policy: AccessPolicy) -> Self {
        Self { source, policy }
    }

    #[inline]
    #[must_use]
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }
}

#[async_trait]
impl<S: RelationshipSource> Authorizer for RelationshipAuthorizer<S> {
    async fn access_mode(
        &self,
        actor: &ActorId,
        target: &RecordId,
    ) -> Result<AccessMode, AuthorizerError> {
        let facts = self.source.facts(actor, target).await?;
        let mode = self.policy.mode_for(facts);
        tracing::debug!(
            "Relationship {:?} (locked: {}) grants {}",
            facts.relationship,
            facts.locked,
            mode
        );
        Ok(mode)
    }
}
