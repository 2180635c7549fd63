//! Backend capability descriptor.
//!
//! Migration steps never compare backend names themselves; they ask the
//! descriptor whether a dialect feature is available. Adding a backend means
//! adding one row to [`KNOWN_BACKENDS`].

/// Dialect features a migration step may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `CREATE INDEX IF NOT EXISTS` is accepted.
    pub conditional_index: bool,

    /// DDL participates in the surrounding transaction instead of committing
    /// implicitly.
    pub transactional_ddl: bool,
}

impl Capabilities {
    /// The most restrictive set, assumed for any backend we do not recognise.
    pub const CONSERVATIVE: Capabilities = Capabilities {
        conditional_index: false,
        transactional_ddl: false,
    };

    /// Every feature available.
    pub const FULL: Capabilities = Capabilities {
        conditional_index: true,
        transactional_ddl: true,
    };

    /// Look up the capabilities of a backend identity (case-insensitive).
    pub fn for_backend(identity: &str) -> Self {
        KNOWN_BACKENDS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(identity.trim()))
            .map(|(_, caps)| *caps)
            .unwrap_or(Self::CONSERVATIVE)
    }
}

/// Backend identity -> capabilities.
const KNOWN_BACKENDS: &[(&str, Capabilities)] = &[
    ("sqlite", Capabilities::FULL),
    ("duckdb", Capabilities::FULL),
    ("postgres", Capabilities::FULL),
    ("postgresql", Capabilities::FULL),
    // No CREATE INDEX IF NOT EXISTS, and DDL commits implicitly.
    ("mysql", Capabilities::CONSERVATIVE),
    ("mariadb", Capabilities::CONSERVATIVE),
];

#[cfg(test)]
#[path = "capabilities_test.rs"]
mod tests;
