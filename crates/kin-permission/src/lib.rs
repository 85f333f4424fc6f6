//! Kinship permission routing
//!
//! Decides, per attempted mutation, whether an actor writes directly, files a
//! suggestion, or is refused before any network write is made.
//!
//! - [`PermissionGate`]: resolves a [`PermissionDecision`], defaulting to `Blocked`
//! - [`Authorizer`]: external authorization collaborator
//! - [`RelationshipAuthorizer`]: authorizer derived from family relationships

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod gate;
mod mode;
mod policy;

pub use gate::{Authorizer, AuthorizerError, PermissionGate, DEFAULT_RESOLVE_TIMEOUT};
pub use mode::{AccessMode, DecisionSource, PermissionDecision};
pub use policy::{
    AccessPolicy, Relationship, RelationshipAuthorizer, RelationshipFacts, RelationshipSource,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
