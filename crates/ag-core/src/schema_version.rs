//! Storage schema version marker.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Integer marker of the database's expected structural shape.
///
/// Versions are totally ordered and only ever move forward. Version 0 is the
/// state of a brand-new database before any migration step has run. The
/// persisted form is the plain decimal string produced by [`fmt::Display`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    /// The version of a database no migration has touched.
    pub const ZERO: SchemaVersion = SchemaVersion(0);

    /// Wrap a raw version number.
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Return the raw version number.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The version immediately after this one.
    ///
    /// Returns `None` on overflow.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Iterate the versions in `(self, target]`, ascending.
    ///
    /// Empty when `target <= self`.
    pub fn upgrades_to(self, target: SchemaVersion) -> impl Iterator<Item = SchemaVersion> {
        (self.0.saturating_add(1)..=target.0)
            .filter(move |_| target.0 > self.0)
            .map(SchemaVersion)
    }

    /// Parse the persisted string form of a version.
    pub fn parse(value: &str) -> CoreResult<Self> {
        value.parse()
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SchemaVersion {
    type Err = CoreError;

    /// Only the exact form [`fmt::Display`] writes is accepted: no sign,
    /// padding or leading zeros.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| CoreError::InvalidSchemaVersion {
            value: s.to_string(),
            reason,
        };
        let version = s.parse::<u32>().map(Self).map_err(|e| invalid(e.to_string()))?;
        if version.to_string() != s {
            return Err(invalid("not in canonical decimal form".to_string()));
        }
        Ok(version)
    }
}

impl From<u32> for SchemaVersion {
    fn from(version: u32) -> Self {
        Self(version)
    }
}

#[cfg(test)]
#[path = "schema_version_test.rs"]
mod tests;
