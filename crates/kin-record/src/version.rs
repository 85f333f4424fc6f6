//! Record version, the optimistic lock token

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Monotonic record version
///
/// Starts at 1 and increases by exactly one per accepted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version of a freshly created record
    pub const INITIAL: Self = Self(1);

    /// Wrap a raw version number
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw version number
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Version produced by the next accepted write
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether this version can serve as an expected version (>= 1)
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 1
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
