//! The gateway's storage schema, one [`MigrationStep`] per version.
//!
//! The `config` table holding the version record is not listed here; the
//! engine bootstraps it (see [`crate::version`]).
//!
//! Steps are append-only: once a version has shipped its step must never
//! change, because databases in the field already record it as applied.

use crate::registry::MigrationStep;

/// Second-factor method chosen by each user.
pub const USER_PREFERENCES_TABLE: &str = "user_preferences";
/// Outstanding identity verification tokens (password reset, device registration).
pub const IDENTITY_VERIFICATION_TOKENS_TABLE: &str = "identity_verification_tokens";
/// TOTP shared secrets.
pub const TOTP_SECRETS_TABLE: &str = "totp_secrets";
/// Registered U2F device handles.
pub const U2F_DEVICES_TABLE: &str = "u2f_devices";
/// First and second factor attempts, used for regulation.
pub const AUTHENTICATION_LOGS_TABLE: &str = "authentication_logs";

/// Index backing the per-user regulation lookups.
pub const AUTHENTICATION_LOGS_USER_TIME_INDEX: &str = "usr_time_idx";

/// Every built-in migration step, in version order.
pub fn builtin_steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep::new(1)
            .table(
                USER_PREFERENCES_TABLE,
                "CREATE TABLE {table} (username VARCHAR(100) PRIMARY KEY, second_factor_method VARCHAR(11))",
            )
            .table(
                IDENTITY_VERIFICATION_TOKENS_TABLE,
                "CREATE TABLE {table} (token VARCHAR(512))",
            )
            .table(
                TOTP_SECRETS_TABLE,
                "CREATE TABLE {table} (username VARCHAR(100) PRIMARY KEY, secret VARCHAR(64))",
            )
            .table(
                U2F_DEVICES_TABLE,
                "CREATE TABLE {table} (username VARCHAR(100) PRIMARY KEY, keyHandle TEXT, publicKey TEXT)",
            )
            .table(
                AUTHENTICATION_LOGS_TABLE,
                "CREATE TABLE {table} (username VARCHAR(100), successful BOOLEAN, time INTEGER)",
            )
            .index(
                AUTHENTICATION_LOGS_USER_TIME_INDEX,
                AUTHENTICATION_LOGS_TABLE,
                &["username", "time"],
            ),
        // Reserved version: no structural change.
        MigrationStep::new(2),
    ]
}
