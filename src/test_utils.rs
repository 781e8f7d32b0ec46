//! Shared test utilities for the session ledger.
//!
//! This module provides common helper functions for setting up test
//! databases and creating test entities with sensible defaults.

use crate::{
    core::{
        TenantContext,
        commission::{CommissionTier, TierTable},
        package::{self, NewPackage, NewPayment, PaymentRecorded},
        session::{self, NewSession},
    },
    entities,
    entities::PaymentMethod,
    errors::Result,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// The tenant context every fixture is created under (organization 1).
#[must_use]
pub fn test_ctx() -> TenantContext {
    TenantContext::new(1)
}

/// Creates a test package with sensible defaults: $1200 over 12 sessions
/// ($100/session), no expiry, for client 20.
pub async fn create_test_package(db: &DatabaseConnection) -> Result<entities::package::Model> {
    create_custom_package(db, 1200.0, 12).await
}

/// Creates a test package with custom pricing.
pub async fn create_custom_package(
    db: &DatabaseConnection,
    total_value: f64,
    total_sessions: i32,
) -> Result<entities::package::Model> {
    package::create_package(
        db,
        &test_ctx(),
        NewPackage {
            client_id: 20,
            total_value,
            total_sessions,
            start_date: Some(Utc::now()),
            expires_at: None,
        },
    )
    .await
}

/// Records a card payment of `amount` against a package, dated now.
pub async fn pay(
    db: &DatabaseConnection,
    package_id: i64,
    amount: f64,
) -> Result<PaymentRecorded> {
    package::record_payment(
        db,
        &test_ctx(),
        NewPayment {
            package_id,
            amount,
            payment_date: Utc::now(),
            payment_method: PaymentMethod::Card,
            attribution: None,
        },
    )
    .await
}

/// Creates a default session request against the given package:
/// trainer 10, client 20, location 1, dated now, not a no-show.
#[must_use]
pub fn new_session_request(package_id: i64) -> NewSession {
    NewSession {
        trainer_id: 10,
        client_id: 20,
        package_id,
        location_id: 1,
        session_date: Utc::now(),
        notes: None,
        is_no_show: false,
    }
}

/// Logs a default awaiting-confirmation session against the package.
pub async fn create_pending_session(
    db: &DatabaseConnection,
    package_id: i64,
) -> Result<entities::session::Model> {
    session::create_session(db, &test_ctx(), new_session_request(package_id)).await
}

/// Sets up the standard test package with `paid` dollars already received.
/// Returns (package, recorded payment) for capacity-sensitive tests.
pub async fn setup_funded_package(
    db: &DatabaseConnection,
    paid: f64,
) -> Result<(entities::package::Model, PaymentRecorded)> {
    let package = create_test_package(db).await?;
    let recorded = pay(db, package.id, paid).await?;
    Ok((package, recorded))
}

/// The tier table used throughout the commission tests:
/// `[1-30] = 25%, [31-60] = 30%, [61+] = 35%`.
///
/// # Panics
/// Never - the table is statically valid.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn sample_tiers() -> TierTable {
    TierTable::new(vec![
        CommissionTier {
            min_sessions: 1,
            max_sessions: Some(30),
            percentage: 0.25,
            flat_fee: None,
        },
        CommissionTier {
            min_sessions: 31,
            max_sessions: Some(60),
            percentage: 0.30,
            flat_fee: None,
        },
        CommissionTier {
            min_sessions: 61,
            max_sessions: None,
            percentage: 0.35,
            flat_fee: None,
        },
    ])
    .unwrap()
}
