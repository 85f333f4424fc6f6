//! Kinship versioned mutation
//!
//! Optimistic concurrency over a compare-and-swap RPC. Every write carries the
//! version the client last observed; the backend applies it only if the stored
//! version still matches.
//!
//! # Core Concepts
//!
//! - [`VersionedMutationController`]: submits requests and classifies outcomes
//! - [`SignalClassifier`]: maps raw backend errors to conflict / permission / transport
//! - [`RecordCache`]: client-side copies, dropped or replaced after each write
//! - [`SuggestionSink`]: where non-direct editors file their patches
//!
//! # Example
//!
//! ```rust,ignore
//! use kin_mutation::VersionedMutationController;
//!
//! let controller = VersionedMutationController::new(rpc);
//! match controller.submit(&request).await {
//!     MutationOutcome::Applied { new_version } => { /* adopt new_version */ }
//!     MutationOutcome::Conflict { .. } => { /* reload, re-derive the patch */ }
//!     _ => {}
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod cache;
mod classify;
mod controller;
mod retry;
mod rpc;
mod suggestion;

pub use cache::RecordCache;
pub use classify::{
    ErrorClass, SignalClassifier, SignalConfig, PERMISSION_DENIED_CODE, VERSION_CONFLICT_CODE,
};
pub use controller::VersionedMutationController;
pub use retry::RetryPolicy;
pub use rpc::{CasAck, MutationRpc, RpcError};
pub use suggestion::{Suggestion, SuggestionSink};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
