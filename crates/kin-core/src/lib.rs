//! Kinship profile editing core
//!
//! Ties permission routing, versioned mutation and the media commit saga into
//! one editing surface.
//!
//! # Core Concepts
//!
//! - [`ProfileEditor`]: gate, then suggest or write; media uploaded before linking
//! - [`EditSession`]: baseline tracking with reload-after-conflict
//! - [`EditError`]: typed failures with a [`SideEffect`] and user-facing text
//! - [`EditorConfig`]: TOML-loadable settings for every component
//!
//! # Example
//!
//! ```rust,ignore
//! use kin_core::prelude::*;
//!
//! let editor = ProfileEditor::new(EditorConfig::load("kin.toml")?, collaborators);
//! let mut session = editor.open(actor, record_id).await?;
//! match session.submit(FieldPatch::new().name("Ada")).await {
//!     Ok(outcome) => println!("saved: {:?}", outcome),
//!     Err(e) if e.requires_reload() => { session.reload().await?; }
//!     Err(e) => println!("{}", e.user_message()),
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod editor;
pub mod error;
pub mod session;
pub mod types;

pub use config::{
    AbandonSettings, CacheSettings, ConfigError, EditorConfig, MediaSettings, MutationSettings,
    PermissionSettings,
};
pub use editor::{Collaborators, Controller, Pipeline, ProfileEditor};
pub use error::EditError;
pub use session::EditSession;
pub use types::{EditOutcome, EditRequest};

pub use kin_media::{AbandonHandle, AbandonPolicy, LocalMedia, SideEffect};
pub use kin_permission::AccessMode;
pub use kin_record::{ActorId, CropCoordinates, FieldPatch, ProfileRecord, RecordId, Version};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the editing core
    pub use crate::{
        AbandonHandle, AccessMode, ActorId, Collaborators, CropCoordinates, EditError,
        EditOutcome, EditRequest, EditSession, EditorConfig, FieldPatch, LocalMedia,
        ProfileEditor, RecordId, SideEffect, Version,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
