//! Testing utilities for the kinship workspace
//!
//! In-memory collaborators (backend, object storage, authorizer) and fixtures.

#![allow(missing_docs)]

mod authorizer;
mod backend;
mod storage;

pub use authorizer::StaticAuthorizer;
pub use backend::{ConflictSignal, InMemoryBackend};
pub use storage::{InMemoryStorage, StoredObject, MEM_SCHEME};

use kin_record::{ProfileField, ProfileRecord, RecordId, Version};
use std::path::{Path, PathBuf};

/// Bare record at `version`
pub fn record_at(id: &str, version: u64) -> ProfileRecord {
    ProfileRecord::new(RecordId::new(id)).at_version(Version::new(version))
}

/// Record with a name, gender and an existing photo
pub fn sample_record(id: &str, version: u64) -> ProfileRecord {
    record_at(id, version)
        .with_field(ProfileField::Name, "Ada Lovelace")
        .with_field(ProfileField::Gender, "female")
        .with_field(ProfileField::PhotoUrl, "mem://profiles/existing.jpg")
        .with_field(ProfileField::PhotoOriginalUrl, "mem://profiles/existing.jpg")
}

/// Write a small fake image named `name` into `dir`
pub fn write_image(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("image bytes for {name}")).unwrap();
    path
}

/// Photo reference currently on `record`, as a JSON value
pub fn photo_of(record: &ProfileRecord) -> Option<serde_json::Value> {
    record.get(&ProfileField::PhotoUrl).cloned()
}
