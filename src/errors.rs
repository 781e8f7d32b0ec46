//! Unified error types for the session-to-revenue ledger.
//!
//! Capacity and eligibility variants are expected business conditions and are
//! surfaced verbatim to the caller; token variants are terminal and
//! user-facing; configuration variants are setup defects that must fail
//! loudly at computation time instead of silently defaulting.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Crate-wide error enum covering business conditions, configuration defects,
/// and store failures.
#[derive(Debug, Error)]
pub enum Error {
    /// The package has no unlocked-and-available capacity left.
    #[error(
        "package {package_id} has no available capacity ({used} of {unlocked} unlocked sessions used)"
    )]
    CapacityExceeded {
        /// Package that rejected the session
        package_id: i64,
        /// Sessions unlocked by payments received so far
        unlocked: i32,
        /// Non-cancelled sessions already logged
        used: i32,
    },

    /// The package's expiry date has passed.
    #[error("package {package_id} expired at {expired_at}")]
    PackageExpired {
        /// Package that rejected the session
        package_id: i64,
        /// When the package expired
        expired_at: DateTime<Utc>,
    },

    /// The package has been deactivated.
    #[error("package {package_id} is inactive")]
    PackageInactive {
        /// The deactivated package
        package_id: i64,
    },

    /// No package exists with the given id.
    #[error("package {package_id} not found")]
    PackageNotFound {
        /// The missing package id
        package_id: i64,
    },

    /// No payment exists with the given id.
    #[error("payment {payment_id} not found")]
    PaymentNotFound {
        /// The missing payment id
        payment_id: i64,
    },

    /// No session exists with the given id.
    #[error("session {session_id} not found")]
    SessionNotFound {
        /// The missing session id
        session_id: i64,
    },

    /// The target row belongs to a different organization than the caller.
    #[error("cross-tenant mismatch: caller organization {expected}, record organization {found}")]
    CrossTenantMismatch {
        /// Organization id supplied by the tenant context
        expected: i64,
        /// Organization id on the record
        found: i64,
    },

    /// The validation token is unknown, malformed, or no longer reachable.
    #[error("validation token not found; request a new confirmation link")]
    TokenNotFound,

    /// The validation token's confirmation window has closed.
    #[error("validation token expired at {expired_at}; the session can no longer be confirmed")]
    TokenExpired {
        /// When the token expired
        expired_at: DateTime<Utc>,
    },

    /// The session was already confirmed and cannot be cancelled.
    #[error("session {session_id} is already validated")]
    SessionAlreadyValidated {
        /// The validated session
        session_id: i64,
    },

    /// The payment would push the package past its total value.
    #[error("payment of {amount} exceeds remaining balance of {remaining}")]
    ExceedsRemainingBalance {
        /// Amount offered
        amount: f64,
        /// Balance still owed on the package
        remaining: f64,
    },

    /// A money amount is non-positive, NaN, or infinite.
    #[error("invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// No commission tier contains the given session count. Tier tables are
    /// gap-free by construction, so this is a configuration defect.
    #[error("no commission tier matches a session count of {sessions}")]
    NoTierMatch {
        /// The unmatched validated-session count
        sessions: i64,
    },

    /// The tier table failed structural validation.
    #[error("invalid tier table: {message}")]
    InvalidTierTable {
        /// What the constructor rejected
        message: String,
    },

    /// Configuration loading or parsing failed.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the defect
        message: String,
    },

    /// Integer conversion error (row counts into domain integers).
    #[error("integer conversion error: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),

    /// Database error from the underlying store.
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
