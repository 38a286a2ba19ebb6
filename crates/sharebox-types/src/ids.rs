//! Typed identifiers for identities and share records.
//!
//! Both wrap the SQLite rowid the registry assigns. They're opaque to
//! clients except where the canonical `/config` document exposes them as
//! plain integers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An identity identifier (registry rowid, monotonically assigned).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

/// A share record identifier (registry rowid, never reused).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareId(i64);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Wrap a raw rowid.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw rowid, for binding into SQL.
            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $T {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$T> for i64 {
            fn from(id: $T) -> i64 {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($name, "({})"), self.0)
            }
        }

        impl std::str::FromStr for $T {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<i64>().map(Self)
            }
        }
    };
}

impl_typed_id!(UserId, "UserId");
impl_typed_id!(ShareId, "ShareId");
