//! Package and payment-ledger business logic.
//!
//! Owns package creation and deactivation, capacity snapshots, and the
//! payment ledger. Available capacity is always derived from money actually
//! received plus the count of non-cancelled sessions actually logged; the
//! `remaining_sessions` counter is display bookkeeping and is never trusted
//! as authoritative.

use crate::{
    core::{TenantContext, ensure_tenant, integrity, unlock::unlocked_sessions},
    entities::{AlertKind, Package, Payment, Session, package, payment, session},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{info, warn};

/// Tolerance for currency rounding when comparing payment sums to package
/// prices.
pub const CURRENCY_EPSILON: f64 = 0.01;

/// Parameters for creating a package at sale time.
#[derive(Debug, Clone)]
pub struct NewPackage {
    /// Client the package is sold to
    pub client_id: i64,
    /// Total sale price in dollars
    pub total_value: f64,
    /// Number of sessions sold
    pub total_sessions: i32,
    /// When the package becomes usable
    pub start_date: Option<DateTimeUtc>,
    /// Hard cutoff after which no session may be created
    pub expires_at: Option<DateTimeUtc>,
}

/// Point-in-time capacity derivation for one package.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacitySnapshot {
    /// Cumulative payments received
    pub paid_amount: f64,
    /// Sessions unlocked by those payments
    pub unlocked_sessions: i32,
    /// Non-cancelled sessions actually logged
    pub used_sessions: i32,
    /// `max(0, unlocked - used)`
    pub available_sessions: i32,
}

/// Sales attribution for a payment, for separate sales-commission accounting.
#[derive(Debug, Clone, Copy)]
pub struct SalesAttribution {
    /// Staff member credited with the sale
    pub primary: i64,
    /// Second staff member on a split sale
    pub secondary: Option<i64>,
}

/// Parameters for recording a payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    /// Package the money was received against
    pub package_id: i64,
    /// Amount received in dollars
    pub amount: f64,
    /// When the money was received
    pub payment_date: DateTimeUtc,
    /// How the money was received
    pub payment_method: payment::PaymentMethod,
    /// Optional sales attribution
    pub attribution: Option<SalesAttribution>,
}

/// Result of recording a payment: the stored row plus how many sessions the
/// payment just made available, so the caller can notify the trainer.
#[derive(Debug, Clone)]
pub struct PaymentRecorded {
    /// The stored payment
    pub payment: payment::Model,
    /// Unlock delta caused by this payment
    pub newly_unlocked_sessions: i32,
}

/// Result of deleting a payment.
#[derive(Debug, Clone)]
pub struct PaymentDeleted {
    /// The removed payment
    pub payment: payment::Model,
    /// Whether the package now has more sessions delivered than paid for
    pub over_delivered: bool,
}

/// Creates a new package at sale time, deriving the per-session value.
///
/// # Errors
/// Returns an error if `total_sessions` is not positive, or `total_value` is
/// negative or not finite.
pub async fn create_package(
    db: &DatabaseConnection,
    ctx: &TenantContext,
    new_package: NewPackage,
) -> Result<package::Model> {
    if new_package.total_sessions <= 0 {
        return Err(Error::Config {
            message: format!(
                "package must contain at least one session, got {}",
                new_package.total_sessions
            ),
        });
    }
    if !new_package.total_value.is_finite() || new_package.total_value < 0.0 {
        return Err(Error::InvalidAmount {
            amount: new_package.total_value,
        });
    }

    let session_value = new_package.total_value / f64::from(new_package.total_sessions);

    let package = package::ActiveModel {
        organization_id: Set(ctx.organization_id),
        client_id: Set(new_package.client_id),
        total_value: Set(new_package.total_value),
        total_sessions: Set(new_package.total_sessions),
        session_value: Set(session_value),
        remaining_sessions: Set(new_package.total_sessions),
        start_date: Set(new_package.start_date),
        expires_at: Set(new_package.expires_at),
        active: Set(true),
        ..Default::default()
    };

    let result = package.insert(db).await?;
    info!(package_id = result.id, total_sessions = result.total_sessions, "package created");
    Ok(result)
}

/// Finds a package by its unique ID.
pub async fn get_package_by_id<C>(db: &C, package_id: i64) -> Result<Option<package::Model>>
where
    C: ConnectionTrait,
{
    Package::find_by_id(package_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Soft-deactivates a package. History is preserved; new sessions are
/// rejected with `PackageInactive`.
pub async fn deactivate_package(
    db: &DatabaseConnection,
    ctx: &TenantContext,
    package_id: i64,
) -> Result<package::Model> {
    let package = get_package_by_id(db, package_id)
        .await?
        .ok_or(Error::PackageNotFound { package_id })?;
    ensure_tenant(ctx, package.organization_id)?;

    let mut active_model: package::ActiveModel = package.into();
    active_model.active = Set(false);
    active_model.update(db).await.map_err(Into::into)
}

/// Sums the payments received against a package.
pub async fn paid_amount<C>(db: &C, package_id: i64) -> Result<f64>
where
    C: ConnectionTrait,
{
    let payments = Payment::find()
        .filter(payment::Column::PackageId.eq(package_id))
        .all(db)
        .await?;
    Ok(payments.iter().map(|p| p.amount).sum())
}

/// Counts the non-cancelled sessions actually logged against a package.
///
/// This is the authoritative usage figure. It is deliberately NOT
/// `total_sessions - remaining_sessions`; the two are reconciled elsewhere
/// and a divergence is an integrity defect.
pub async fn used_sessions<C>(db: &C, package_id: i64) -> Result<i32>
where
    C: ConnectionTrait,
{
    let used = Session::find()
        .filter(session::Column::PackageId.eq(package_id))
        .filter(session::Column::Cancelled.eq(false))
        .count(db)
        .await?;
    Ok(i32::try_from(used)?)
}

/// Derives the current capacity of a package from the payment ledger and the
/// logged-session count.
pub async fn capacity_snapshot<C>(db: &C, package: &package::Model) -> Result<CapacitySnapshot>
where
    C: ConnectionTrait,
{
    let paid = paid_amount(db, package.id).await?;
    let unlocked = unlocked_sessions(paid, package.total_value, package.total_sessions);
    let used = used_sessions(db, package.id).await?;

    Ok(CapacitySnapshot {
        paid_amount: paid,
        unlocked_sessions: unlocked,
        used_sessions: used,
        available_sessions: (unlocked - used).max(0),
    })
}

/// Records a payment against a package and reports how many sessions it
/// unlocked.
///
/// The balance check, the insert, and the unlock recompute all happen inside
/// one transaction. The over-payment check runs before any write.
///
/// # Errors
/// Returns `InvalidAmount` for non-positive or non-finite amounts,
/// `ExceedsRemainingBalance` if the payment would push the package past its
/// total value (beyond the currency epsilon), and `CrossTenantMismatch` /
/// `PackageNotFound` for bad targets.
pub async fn record_payment(
    db: &DatabaseConnection,
    ctx: &TenantContext,
    new_payment: NewPayment,
) -> Result<PaymentRecorded> {
    if !new_payment.amount.is_finite() || new_payment.amount <= 0.0 {
        return Err(Error::InvalidAmount {
            amount: new_payment.amount,
        });
    }

    // Use a transaction to ensure atomicity
    let txn = db.begin().await?;

    let package = get_package_by_id(&txn, new_payment.package_id)
        .await?
        .ok_or(Error::PackageNotFound {
            package_id: new_payment.package_id,
        })?;
    ensure_tenant(ctx, package.organization_id)?;

    let paid_before = paid_amount(&txn, package.id).await?;
    let remaining_balance = package.total_value - paid_before;
    if new_payment.amount > remaining_balance + CURRENCY_EPSILON {
        return Err(Error::ExceedsRemainingBalance {
            amount: new_payment.amount,
            remaining: remaining_balance.max(0.0),
        });
    }

    let unlocked_before =
        unlocked_sessions(paid_before, package.total_value, package.total_sessions);

    let (sold_by, sold_by_secondary) = match new_payment.attribution {
        Some(attribution) => (Some(attribution.primary), attribution.secondary),
        None => (None, None),
    };

    let payment_model = payment::ActiveModel {
        organization_id: Set(package.organization_id),
        package_id: Set(package.id),
        amount: Set(new_payment.amount),
        payment_date: Set(new_payment.payment_date),
        payment_method: Set(new_payment.payment_method),
        sold_by: Set(sold_by),
        sold_by_secondary: Set(sold_by_secondary),
        ..Default::default()
    };
    let payment = payment_model.insert(&txn).await?;

    let unlocked_after = unlocked_sessions(
        paid_before + new_payment.amount,
        package.total_value,
        package.total_sessions,
    );

    txn.commit().await?;

    let newly_unlocked_sessions = unlocked_after - unlocked_before;
    info!(
        package_id = package.id,
        amount = new_payment.amount,
        newly_unlocked_sessions,
        "payment recorded"
    );

    Ok(PaymentRecorded {
        payment,
        newly_unlocked_sessions,
    })
}

/// Deletes a payment and re-runs the unlock calculation.
///
/// Deletion is always permitted - the money was in fact not received - but
/// if the package has now delivered more sessions than the remaining
/// payments unlock, it is flagged over-delivered rather than silently
/// accepted. Delivered sessions cannot be un-delivered, so this surfaces as
/// a warning and an integrity alert, not a hard failure.
pub async fn delete_payment(
    db: &DatabaseConnection,
    ctx: &TenantContext,
    payment_id: i64,
) -> Result<PaymentDeleted> {
    // Use a transaction to ensure atomicity
    let txn = db.begin().await?;

    let payment = Payment::find_by_id(payment_id)
        .one(&txn)
        .await?
        .ok_or(Error::PaymentNotFound { payment_id })?;
    ensure_tenant(ctx, payment.organization_id)?;

    let package = get_package_by_id(&txn, payment.package_id)
        .await?
        .ok_or(Error::PackageNotFound {
            package_id: payment.package_id,
        })?;

    let removed = payment.clone();
    payment.delete(&txn).await?;

    let snapshot = capacity_snapshot(&txn, &package).await?;
    let over_delivered = snapshot.used_sessions > snapshot.unlocked_sessions;
    if over_delivered {
        warn!(
            package_id = package.id,
            used = snapshot.used_sessions,
            unlocked = snapshot.unlocked_sessions,
            "package over-delivered after payment deletion"
        );
        integrity::record_alert(
            &txn,
            package.organization_id,
            package.id,
            AlertKind::OverDelivered,
            format!(
                "payment {} deleted: {} sessions delivered but only {} unlocked",
                removed.id, snapshot.used_sessions, snapshot.unlocked_sessions
            ),
        )
        .await?;
    }

    txn.commit().await?;

    Ok(PaymentDeleted {
        payment: removed,
        over_delivered,
    })
}

/// Retrieves the payment history for a package, newest first.
pub async fn list_payments(
    db: &DatabaseConnection,
    ctx: &TenantContext,
    package_id: i64,
) -> Result<Vec<payment::Model>> {
    let package = get_package_by_id(db, package_id)
        .await?
        .ok_or(Error::PackageNotFound { package_id })?;
    ensure_tenant(ctx, package.organization_id)?;

    Payment::find()
        .filter(payment::Column::PackageId.eq(package_id))
        .order_by_desc(payment::Column::PaymentDate)
        .all(db)
        .await
        .map_err(Into::into)
}
