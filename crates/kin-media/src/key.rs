//! Destination keys
//!
//! Keys are unique per commit attempt: content hash prefix, wall-clock millis
//! and a ULID. An upload therefore never lands on an existing object, and a
//! retried upload uses a fresh key.

use chrono::Utc;
use kin_record::{ContentHash, MediaVariant, RecordId};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Default key prefix
pub const DEFAULT_KEY_PREFIX: &str = "profiles";

/// Object storage key for one upload attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationKey(String);

impl DestinationKey {
    /// `{prefix}/{owner}/{variant}/{hash16}-{millis}-{ulid}.{ext}`
    #[must_use]
    pub fn generate(
        prefix: &str,
        owner: &RecordId,
        variant: &MediaVariant,
        hash: &ContentHash,
        extension: &str,
    ) -> Self {
        Self(format!(
            "{}/{}/{}/{}-{}-{}.{}",
            prefix.trim_end_matches('/'),
            path_segment(owner.as_str()),
            variant.as_str(),
            hash.short(),
            Utc::now().timestamp_millis(),
            Ulid::new(),
            extension
        ))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DestinationKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn path_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_layout() {
        let hash = ContentHash::compute(b"img");
        let key = DestinationKey::generate(
            "profiles/",
            &RecordId::new("tree/7"),
            &MediaVariant::Original,
            &hash,
            "jpg",
        );
        let parts: Vec<&str> = key.as_str().split('/').collect();
        assert_eq!(parts[0], "profiles");
        assert_eq!(parts[1], "tree_7");
        assert_eq!(parts[2], "original");
        assert!(parts[3].starts_with(&hash.short()));
        assert!(parts[3].ends_with(".jpg"));
    }

    #[test]
    fn same_content_gets_fresh_keys() {
        let hash = ContentHash::compute(b"img");
        let owner = RecordId::new("p1");
        let keys: HashSet<_> = (0..100)
            .map(|_| DestinationKey::generate("p", &owner, &MediaVariant::Original, &hash, "png"))
            .collect();
        assert_eq!(keys.len(), 100);
    }
}
