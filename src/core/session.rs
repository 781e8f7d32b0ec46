//! Session lifecycle business logic - the validation state machine.
//!
//! A logged session starts awaiting client confirmation, holding an opaque
//! random token with a fixed expiry window, and ends in exactly one terminal
//! state: validated, expired (derived lazily from the timestamp, no sweep),
//! or cancelled. No-shows are created directly in the cancelled state with
//! no confirmation round-trip. There is deliberately no client-side reject
//! transition - non-response simply expires.
//!
//! Session creation is gated on the package's unlocked-and-available
//! capacity derived from the payment ledger, not on the bookkeeping counter;
//! that distinction is what keeps a package from delivering sessions the
//! client has not paid for.

use crate::{
    core::{
        TenantContext, ensure_tenant, integrity,
        package::{capacity_snapshot, get_package_by_id, used_sessions},
    },
    entities::{AlertKind, Package, Session, package, session},
    errors::{Error, Result},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{Set, TransactionTrait, prelude::*};
use tracing::info;

/// How long a client has to confirm a session before the token lapses.
pub const VALIDATION_EXPIRY_DAYS: i64 = 30;

/// Parameters for logging a session against a package.
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Trainer who delivered the session
    pub trainer_id: i64,
    /// Client who received the session
    pub client_id: i64,
    /// Package to log the session against
    pub package_id: i64,
    /// Location where the session took place
    pub location_id: i64,
    /// When the session occurred
    pub session_date: DateTimeUtc,
    /// Optional free-form trainer notes
    pub notes: Option<String>,
    /// Whether the client failed to show; no-shows are cancelled immediately
    /// and no confirmation token is issued
    pub is_no_show: bool,
}

/// Read-only confirmation status for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    /// The session is awaiting confirmation
    Pending {
        /// Confirmation deadline
        expires_at: DateTimeUtc,
    },
    /// The session was already confirmed
    AlreadyValidated {
        /// When it was confirmed
        validated_at: DateTimeUtc,
    },
    /// The confirmation window has closed
    Expired,
    /// The token is unknown, malformed, or no longer reachable
    NotFound,
}

/// Result of a successful `validate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validated {
    /// The confirmed session
    pub session_id: i64,
    /// When it was confirmed (the original instant on repeated calls)
    pub validated_at: DateTimeUtc,
}

/// Generates an opaque confirmation token (32 random bytes,
/// base64url-encoded without padding).
fn generate_validation_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Logs a session against a package with unlocked capacity.
///
/// The capacity check, the insert, and the counter decrement all happen
/// inside one transaction, so two concurrent creations racing for the last
/// unit of capacity yield exactly one success. Capacity comes from
/// [`capacity_snapshot`] - money received and sessions actually logged -
/// never from `remaining_sessions > 0`.
///
/// # Errors
/// Returns `PackageNotFound`, `CrossTenantMismatch`, `PackageInactive`,
/// `PackageExpired`, or `CapacityExceeded`.
pub async fn create_session(
    db: &DatabaseConnection,
    ctx: &TenantContext,
    new_session: NewSession,
) -> Result<session::Model> {
    // Use a transaction to ensure atomicity
    let txn = db.begin().await?;

    let package = get_package_by_id(&txn, new_session.package_id)
        .await?
        .ok_or(Error::PackageNotFound {
            package_id: new_session.package_id,
        })?;
    ensure_tenant(ctx, package.organization_id)?;

    if !package.active {
        return Err(Error::PackageInactive {
            package_id: package.id,
        });
    }

    let now = Utc::now();
    if let Some(expires_at) = package.expires_at {
        if now > expires_at {
            return Err(Error::PackageExpired {
                package_id: package.id,
                expired_at: expires_at,
            });
        }
    }

    let snapshot = capacity_snapshot(&txn, &package).await?;

    // Reconcile the bookkeeping counter against the authoritative count;
    // surface drift, don't block on it
    let expected_remaining = package.total_sessions - snapshot.used_sessions;
    if package.remaining_sessions != expected_remaining {
        integrity::record_alert(
            &txn,
            package.organization_id,
            package.id,
            AlertKind::CounterDrift,
            format!(
                "remaining_sessions={} but total={} - used={} gives {}",
                package.remaining_sessions,
                package.total_sessions,
                snapshot.used_sessions,
                expected_remaining
            ),
        )
        .await?;
    }

    if snapshot.available_sessions <= 0 {
        return Err(Error::CapacityExceeded {
            package_id: package.id,
            unlocked: snapshot.unlocked_sessions,
            used: snapshot.used_sessions,
        });
    }

    let (cancelled, cancelled_at, validation_token, validation_expiry) = if new_session.is_no_show {
        (true, Some(now), None, None)
    } else {
        (
            false,
            None,
            Some(generate_validation_token()),
            Some(now + Duration::days(VALIDATION_EXPIRY_DAYS)),
        )
    };

    let session_model = session::ActiveModel {
        organization_id: Set(package.organization_id),
        trainer_id: Set(new_session.trainer_id),
        client_id: Set(new_session.client_id),
        package_id: Set(package.id),
        location_id: Set(new_session.location_id),
        session_date: Set(new_session.session_date),
        session_value: Set(package.session_value),
        notes: Set(new_session.notes),
        validated: Set(false),
        validated_at: Set(None),
        cancelled: Set(cancelled),
        cancelled_at: Set(cancelled_at),
        validation_token: Set(validation_token),
        validation_expiry: Set(validation_expiry),
        ..Default::default()
    };
    let created = session_model.insert(&txn).await?;

    // Cancelled sessions never consume capacity, so a no-show leaves the
    // display counter alone
    if !created.cancelled {
        Package::update_many()
            .col_expr(
                package::Column::RemainingSessions,
                Expr::col(package::Column::RemainingSessions).sub(1),
            )
            .filter(package::Column::Id.eq(package.id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    info!(
        session_id = created.id,
        package_id = package.id,
        no_show = created.cancelled,
        "session logged"
    );
    Ok(created)
}

/// Finds a session by its unique ID.
pub async fn get_session_by_id(
    db: &DatabaseConnection,
    session_id: i64,
) -> Result<Option<session::Model>> {
    Session::find_by_id(session_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Reports the confirmation status for a token. Idempotent and
/// side-effect-free; unknown or malformed tokens come back as `NotFound`,
/// never as an internal error.
pub async fn check_status(db: &DatabaseConnection, token: &str) -> Result<ValidationStatus> {
    let Some(found) = Session::find()
        .filter(session::Column::ValidationToken.eq(token))
        .one(db)
        .await?
    else {
        return Ok(ValidationStatus::NotFound);
    };

    // Cancelled sessions are never reachable by token
    if found.cancelled {
        return Ok(ValidationStatus::NotFound);
    }

    if found.validated {
        return found.validated_at.map_or_else(
            || {
                Err(Error::Config {
                    message: format!("session {} validated without a timestamp", found.id),
                })
            },
            |validated_at| Ok(ValidationStatus::AlreadyValidated { validated_at }),
        );
    }

    match found.validation_expiry {
        Some(expires_at) if Utc::now() <= expires_at => {
            Ok(ValidationStatus::Pending { expires_at })
        }
        _ => Ok(ValidationStatus::Expired),
    }
}

/// Confirms a session by token. The only state-mutating confirmation
/// operation.
///
/// The transition is a single atomic conditional update - set validated
/// where the token matches, the session is still unvalidated and
/// uncancelled, and the window is open - never a read-then-write pair, so
/// two concurrent calls produce exactly one transition and downstream
/// billing effects fire once. Repeated calls return the original
/// `validated_at` without re-mutating.
///
/// # Errors
/// Returns `TokenExpired` when the window has closed (expiry is evaluated
/// lazily against the stored timestamp) and `TokenNotFound` for unknown
/// tokens.
pub async fn validate(db: &DatabaseConnection, token: &str) -> Result<Validated> {
    let now = Utc::now();

    let updated = Session::update_many()
        .col_expr(session::Column::Validated, Expr::value(true))
        .col_expr(session::Column::ValidatedAt, Expr::value(Some(now)))
        .col_expr(
            session::Column::ValidationExpiry,
            Expr::value(Option::<DateTimeUtc>::None),
        )
        .filter(session::Column::ValidationToken.eq(token))
        .filter(session::Column::Validated.eq(false))
        .filter(session::Column::Cancelled.eq(false))
        .filter(session::Column::ValidationExpiry.gt(now))
        .exec(db)
        .await?;

    let found = Session::find()
        .filter(session::Column::ValidationToken.eq(token))
        .one(db)
        .await?
        .ok_or(Error::TokenNotFound)?;

    if updated.rows_affected >= 1 {
        info!(session_id = found.id, "session validated");
        return Ok(Validated {
            session_id: found.id,
            validated_at: found.validated_at.unwrap_or(now),
        });
    }

    // The conditional update did not fire; report why
    if found.cancelled {
        return Err(Error::TokenNotFound);
    }
    if found.validated {
        // Already confirmed earlier - idempotent success with the original
        // timestamp
        return Ok(Validated {
            session_id: found.id,
            validated_at: found.validated_at.unwrap_or(now),
        });
    }
    match found.validation_expiry {
        Some(expires_at) if now > expires_at => Err(Error::TokenExpired {
            expired_at: expires_at,
        }),
        _ => Err(Error::TokenNotFound),
    }
}

/// Cancels an awaiting session (e.g. a no-show marked after the fact).
///
/// Cancellation is a tombstone, not a deletion: the row stays for audit
/// history, stops counting toward capacity and commission, and its token is
/// withdrawn. The display counter is recomputed from the authoritative
/// non-cancelled count. Cancelling twice is a no-op; cancelling a validated
/// session is rejected.
pub async fn cancel_session(
    db: &DatabaseConnection,
    ctx: &TenantContext,
    session_id: i64,
) -> Result<session::Model> {
    // Use a transaction to ensure atomicity
    let txn = db.begin().await?;

    let found = Session::find_by_id(session_id)
        .one(&txn)
        .await?
        .ok_or(Error::SessionNotFound { session_id })?;
    ensure_tenant(ctx, found.organization_id)?;

    if found.cancelled {
        return Ok(found);
    }
    if found.validated {
        return Err(Error::SessionAlreadyValidated { session_id });
    }

    let now = Utc::now();
    let package_id = found.package_id;

    let mut active_model: session::ActiveModel = found.into();
    active_model.cancelled = Set(true);
    active_model.cancelled_at = Set(Some(now));
    active_model.validation_token = Set(None);
    active_model.validation_expiry = Set(None);
    let cancelled = active_model.update(&txn).await?;

    // The freed slot goes back into the display counter, recomputed from
    // the authoritative count rather than incremented
    let package = get_package_by_id(&txn, package_id)
        .await?
        .ok_or(Error::PackageNotFound { package_id })?;
    let used = used_sessions(&txn, package_id).await?;
    let mut package_model: package::ActiveModel = package.clone().into();
    package_model.remaining_sessions =
        Set((package.total_sessions - used).clamp(0, package.total_sessions));
    package_model.update(&txn).await?;

    txn.commit().await?;

    info!(session_id, package_id, "session cancelled");
    Ok(cancelled)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_create_session_issues_token_and_decrements_counter() -> Result<()> {
        let db = setup_test_db().await?;
        let (package, _) = setup_funded_package(&db, 500.0).await?;

        let created = create_pending_session(&db, package.id).await?;

        assert!(!created.validated);
        assert!(!created.cancelled);
        assert_eq!(created.session_value, 100.0);
        let token = created.validation_token.clone().unwrap();
        assert!(token.len() >= 43); // 32 bytes base64url

        let expiry = created.validation_expiry.unwrap();
        let window = expiry - created.session_date;
        assert!(window >= Duration::days(VALIDATION_EXPIRY_DAYS - 1));

        let package = crate::core::package::get_package_by_id(&db, package.id)
            .await?
            .unwrap();
        assert_eq!(package.remaining_sessions, 11);

        Ok(())
    }

    #[tokio::test]
    async fn test_create_session_capacity_scenario() -> Result<()> {
        // $1200 / 12 sessions, $500 paid => 5 unlocked; the 6th must fail
        let db = setup_test_db().await?;
        let (package, _) = setup_funded_package(&db, 500.0).await?;

        for _ in 0..5 {
            create_pending_session(&db, package.id).await?;
        }

        let result = create_pending_session(&db, package.id).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::CapacityExceeded {
                unlocked: 5,
                used: 5,
                ..
            }
        ));

        // More money reopens the gate
        pay(&db, package.id, 100.0).await?;
        create_pending_session(&db, package.id).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_session_requires_payment() -> Result<()> {
        let db = setup_test_db().await?;
        let package = create_test_package(&db).await?;

        // remaining_sessions is 12, but nothing is paid for yet
        let result = create_pending_session(&db, package.id).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::CapacityExceeded {
                unlocked: 0,
                used: 0,
                ..
            }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_session_no_show() -> Result<()> {
        let db = setup_test_db().await?;
        let (package, _) = setup_funded_package(&db, 500.0).await?;

        let ctx = test_ctx();
        let mut request = new_session_request(package.id);
        request.is_no_show = true;
        let created = create_session(&db, &ctx, request).await?;

        assert!(created.cancelled);
        assert!(created.cancelled_at.is_some());
        assert!(created.validation_token.is_none());
        assert!(created.validation_expiry.is_none());

        // No-shows never consume capacity or the display counter
        let package = crate::core::package::get_package_by_id(&db, package.id)
            .await?
            .unwrap();
        assert_eq!(package.remaining_sessions, 12);
        let snapshot = crate::core::package::capacity_snapshot(&db, &package).await?;
        assert_eq!(snapshot.used_sessions, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_create_session_inactive_package() -> Result<()> {
        let db = setup_test_db().await?;
        let ctx = test_ctx();
        let (package, _) = setup_funded_package(&db, 1200.0).await?;
        crate::core::package::deactivate_package(&db, &ctx, package.id).await?;

        let result = create_pending_session(&db, package.id).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::PackageInactive { package_id: _ }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_session_expired_package() -> Result<()> {
        let db = setup_test_db().await?;
        let ctx = test_ctx();
        let package = crate::core::package::create_package(
            &db,
            &ctx,
            crate::core::package::NewPackage {
                client_id: 20,
                total_value: 1200.0,
                total_sessions: 12,
                start_date: None,
                expires_at: Some(Utc::now() - Duration::days(1)),
            },
        )
        .await?;
        pay(&db, package.id, 1200.0).await?;

        let result = create_pending_session(&db, package.id).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::PackageExpired { package_id: _, .. }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_session_cross_tenant() -> Result<()> {
        let db = setup_test_db().await?;
        let (package, _) = setup_funded_package(&db, 1200.0).await?;

        let foreign_ctx = TenantContext::new(999);
        let result = create_session(&db, &foreign_ctx, new_session_request(package.id)).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::CrossTenantMismatch { .. }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_session_surfaces_counter_drift() -> Result<()> {
        let db = setup_test_db().await?;
        let ctx = test_ctx();
        let (package, _) = setup_funded_package(&db, 1200.0).await?;

        // Corrupt the display counter; creation must still go through
        let mut active_model: crate::entities::package::ActiveModel = package.clone().into();
        active_model.remaining_sessions = Set(2);
        active_model.update(&db).await?;

        create_pending_session(&db, package.id).await?;

        let alerts = crate::core::integrity::open_alerts(&db, &ctx).await?;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::CounterDrift);

        Ok(())
    }

    #[tokio::test]
    async fn test_check_status_lifecycle() -> Result<()> {
        let db = setup_test_db().await?;
        let (package, _) = setup_funded_package(&db, 500.0).await?;
        let created = create_pending_session(&db, package.id).await?;
        let token = created.validation_token.clone().unwrap();

        assert!(matches!(
            check_status(&db, &token).await?,
            ValidationStatus::Pending { expires_at: _ }
        ));

        let confirmed = validate(&db, &token).await?;
        assert!(matches!(
            check_status(&db, &token).await?,
            ValidationStatus::AlreadyValidated { validated_at } if validated_at == confirmed.validated_at
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_check_status_unknown_token() -> Result<()> {
        let db = setup_test_db().await?;

        assert_eq!(
            check_status(&db, "no-such-token").await?,
            ValidationStatus::NotFound
        );
        // Malformed input is still just NotFound, never an internal error
        assert_eq!(
            check_status(&db, "!!не токен!!").await?,
            ValidationStatus::NotFound
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_expired_token_lazy_evaluation() -> Result<()> {
        let db = setup_test_db().await?;
        let (package, _) = setup_funded_package(&db, 500.0).await?;
        let created = create_pending_session(&db, package.id).await?;
        let token = created.validation_token.clone().unwrap();

        // Push the deadline into the past; no sweep exists, expiry is derived
        let mut active_model: session::ActiveModel = created.into();
        active_model.validation_expiry = Set(Some(Utc::now() - Duration::hours(1)));
        active_model.update(&db).await?;

        assert_eq!(check_status(&db, &token).await?, ValidationStatus::Expired);

        let result = validate(&db, &token).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::TokenExpired { expired_at: _ }
        ));

        // The session never transitioned to validated
        let found = Session::find()
            .filter(session::Column::ValidationToken.eq(token.as_str()))
            .one(&db)
            .await?
            .unwrap();
        assert!(!found.validated);

        Ok(())
    }

    #[tokio::test]
    async fn test_validate_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let (package, _) = setup_funded_package(&db, 500.0).await?;
        let created = create_pending_session(&db, package.id).await?;
        let token = created.validation_token.clone().unwrap();

        let first = validate(&db, &token).await?;
        let second = validate(&db, &token).await?;
        let third = validate(&db, &token).await?;

        assert_eq!(first, second);
        assert_eq!(first, third);

        let found = get_session_by_id(&db, created.id).await?.unwrap();
        assert!(found.validated);
        assert_eq!(found.validated_at, Some(first.validated_at));
        assert!(found.validation_expiry.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_validate_unknown_token() -> Result<()> {
        let db = setup_test_db().await?;

        let result = validate(&db, "no-such-token").await;
        assert!(matches!(result.unwrap_err(), Error::TokenNotFound));

        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_session_frees_capacity() -> Result<()> {
        let db = setup_test_db().await?;
        let ctx = test_ctx();
        let (package, _) = setup_funded_package(&db, 500.0).await?;

        for _ in 0..4 {
            create_pending_session(&db, package.id).await?;
        }
        let fifth = create_pending_session(&db, package.id).await?;

        // Package is at its unlock limit
        let result = create_pending_session(&db, package.id).await;
        assert!(matches!(result.unwrap_err(), Error::CapacityExceeded { .. }));

        let cancelled = cancel_session(&db, &ctx, fifth.id).await?;
        assert!(cancelled.cancelled);
        assert!(cancelled.validation_token.is_none());

        let package_row = crate::core::package::get_package_by_id(&db, package.id)
            .await?
            .unwrap();
        assert_eq!(package_row.remaining_sessions, 8);

        // The freed slot is usable again
        create_pending_session(&db, package.id).await?;

        // Cancelling twice is a no-op
        let again = cancel_session(&db, &ctx, fifth.id).await?;
        assert!(again.cancelled);

        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_validated_session_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let ctx = test_ctx();
        let (package, _) = setup_funded_package(&db, 500.0).await?;
        let created = create_pending_session(&db, package.id).await?;
        let token = created.validation_token.clone().unwrap();
        validate(&db, &token).await?;

        let result = cancel_session(&db, &ctx, created.id).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::SessionAlreadyValidated { session_id: _ }
        ));

        Ok(())
    }
}
