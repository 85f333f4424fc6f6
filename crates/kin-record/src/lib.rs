//! Kinship record model
//!
//! Versioned profile records and the values that flow through the editing core.
//!
//! # Core Concepts
//!
//! - [`ProfileRecord`]: backend-owned record carrying a monotonic [`Version`]
//! - [`MutationRequest`]: a [`FieldPatch`] submitted against an expected version
//! - [`MutationOutcome`]: applied / conflict / rejected / transport failure
//! - [`MediaAsset`]: an image moving through `Staged -> Uploaded -> Linked`
//! - [`CropCoordinates`]: non-destructive fractional crop insets
//!
//! # Example
//!
//! ```rust,ignore
//! use kin_record::{FieldPatch, MutationRequest, RecordId, Version};
//!
//! let request = MutationRequest::new(
//!     RecordId::new("p-17"),
//!     Version::new(3),
//!     FieldPatch::new().name("Ada"),
//! )?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod crop;
mod field;
mod hash;
mod ids;
mod media;
mod record;
mod request;
mod version;

pub use crop::{CropCoordinates, CropError, ImageDimensions, PixelRect};
pub use field::{FieldPatch, ProfileField};
pub use hash::{ContentHash, HashError};
pub use ids::{ActorId, AssetId, RecordId, SuggestionId};
pub use media::{LinkState, LinkStateError, MediaAsset, MediaVariant};
pub use record::ProfileRecord;
pub use request::{MutationOutcome, MutationRequest, RejectReason, RequestError};
pub use version::Version;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn crop_patch_applies_to_record() {
        let crop = CropCoordinates::new(0.0, 0.1, 0.05, 0.05).unwrap();
        let record = ProfileRecord::new(RecordId::new("p1"));
        let request = MutationRequest::new(
            record.id.clone(),
            record.version,
            FieldPatch::new().photo("mem://derived").crop(&crop),
        )
        .unwrap();

        let next = record.apply(request.patch());
        assert_eq!(next.version, record.version.next());
        assert_eq!(next.photo_url(), Some("mem://derived"));
        assert_eq!(next.crop(), Some(crop));
    }
}
