//! Domain identifiers (strongly-typed IDs).
//!
//! Work ids are ULIDs: sortable by creation time and generated without
//! coordination, so an external enqueue API can mint them anywhere.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

const PREFIX: &str = "work-";

/// Identifier of a single work record.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(Ulid);

impl WorkId {
    /// Mint a fresh id from the current time.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Ulid> for WorkId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.0)
    }
}

/// Error returned when a string is not a valid `work-<ULID>` id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid work id: {0}")]
pub struct ParseWorkIdError(String);

impl FromStr for WorkId {
    type Err = ParseWorkIdError;

    /// Accepts both `work-<ULID>` and a bare ULID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(PREFIX).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self)
            .map_err(|_| ParseWorkIdError(s.to_string()))
    }
}
