//! Profile records as held by the backend (and cached, possibly stale, by clients)

use crate::crop::CropCoordinates;
use crate::field::{FieldPatch, ProfileField};
use crate::ids::RecordId;
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A versioned profile record
///
/// # Invariants
/// - `version` only increases, by exactly one per accepted write
/// - Absent fields and `null` fields are equivalent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: RecordId,
    pub version: Version,
    #[serde(default)]
    pub fields: BTreeMap<ProfileField, Value>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileRecord {
    /// New record at [`Version::INITIAL`] with no fields
    #[must_use]
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            version: Version::INITIAL,
            fields: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Builder: preset a field
    #[must_use]
    pub fn with_field(mut self, field: ProfileField, value: impl Into<Value>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    /// Builder: preset the version
    #[must_use]
    pub fn at_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Field value, if set and not null
    #[must_use]
    pub fn get(&self, field: &ProfileField) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// Field value as string
    #[must_use]
    pub fn get_str(&self, field: &ProfileField) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Currently displayed photo reference
    #[must_use]
    pub fn photo_url(&self) -> Option<&str> {
        self.get_str(&ProfileField::PhotoUrl)
    }

    /// Whether `url` is referenced by any media field
    #[must_use]
    pub fn references(&self, url: &str) -> bool {
        self.get_str(&ProfileField::PhotoUrl) == Some(url)
            || self.get_str(&ProfileField::PhotoOriginalUrl) == Some(url)
    }

    /// Stored crop metadata, if complete and valid
    #[must_use]
    pub fn crop(&self) -> Option<CropCoordinates> {
        let read = |field: ProfileField| self.get(&field).and_then(Value::as_f64);
        CropCoordinates::new(
            read(ProfileField::CropTop)?,
            read(ProfileField::CropBottom)?,
            read(ProfileField::CropLeft)?,
            read(ProfileField::CropRight)?,
        )
        .ok()
    }

    /// Record produced by committing `patch`: all fields applied, version + 1
    ///
    /// Only the authoritative store calls this; clients never apply patches locally.
    #[must_use]
    pub fn apply(&self, patch: &FieldPatch) -> Self {
        let mut next = self.clone();
        for (field, value) in patch.iter() {
            if value.is_null() {
                next.fields.remove(field);
            } else {
                next.fields.insert(field.clone(), value.clone());
            }
        }
        next.version = self.version.next();
        next.updated_at = Utc::now();
        next
    }
}
