//! Integrity alert recording and the package audit.
//!
//! Earlier versions of this system leaned on external audit scripts to find
//! packages with more sessions used than purchased; this module internalizes
//! that check. Alerts are insert-only, surfaced to an operator view, and
//! never block the operation that detected the problem.

use crate::{
    core::{
        TenantContext, ensure_tenant,
        package::{CapacitySnapshot, capacity_snapshot, get_package_by_id},
    },
    entities::{AlertKind, IntegrityAlert, Package, integrity_alert, package},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::warn;

/// Result of auditing one package against the ledger invariants.
#[derive(Debug, Clone)]
pub struct PackageAudit {
    /// The audited package
    pub package_id: i64,
    /// Capacity derivation at audit time
    pub snapshot: CapacitySnapshot,
    /// How far `remaining_sessions` has drifted from `total - used`, if at all
    pub counter_drift: Option<i32>,
    /// Whether more sessions were delivered than the payments unlock
    pub over_delivered: bool,
}

impl PackageAudit {
    /// Whether the package passed every invariant check.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.counter_drift.is_none() && !self.over_delivered
    }
}

/// Records an integrity alert. Insert-only; the triggering operation is
/// never blocked by the defect it detected.
pub async fn record_alert<C>(
    db: &C,
    organization_id: i64,
    package_id: i64,
    kind: AlertKind,
    detail: String,
) -> Result<integrity_alert::Model>
where
    C: ConnectionTrait,
{
    warn!(package_id, kind = ?kind, detail = %detail, "integrity alert recorded");

    let alert = integrity_alert::ActiveModel {
        organization_id: Set(organization_id),
        package_id: Set(package_id),
        kind: Set(kind),
        detail: Set(detail),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    alert.insert(db).await.map_err(Into::into)
}

/// Retrieves the alerts for an organization, newest first, for the operator
/// view.
pub async fn open_alerts(
    db: &DatabaseConnection,
    ctx: &TenantContext,
) -> Result<Vec<integrity_alert::Model>> {
    IntegrityAlert::find()
        .filter(integrity_alert::Column::OrganizationId.eq(ctx.organization_id))
        .order_by_desc(integrity_alert::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Audits one package: recomputes the capacity snapshot, checks
/// `0 <= used <= unlocked <= total` and counter drift, and records an alert
/// for each violation found.
pub async fn audit_package(
    db: &DatabaseConnection,
    ctx: &TenantContext,
    package_id: i64,
) -> Result<PackageAudit> {
    let package = get_package_by_id(db, package_id)
        .await?
        .ok_or(Error::PackageNotFound { package_id })?;
    ensure_tenant(ctx, package.organization_id)?;

    audit_one(db, &package).await
}

/// Audits every active package in the organization.
pub async fn audit_organization(
    db: &DatabaseConnection,
    ctx: &TenantContext,
) -> Result<Vec<PackageAudit>> {
    let packages = Package::find()
        .filter(package::Column::OrganizationId.eq(ctx.organization_id))
        .filter(package::Column::Active.eq(true))
        .all(db)
        .await?;

    let mut audits = Vec::with_capacity(packages.len());
    for package in &packages {
        audits.push(audit_one(db, package).await?);
    }
    Ok(audits)
}

async fn audit_one(db: &DatabaseConnection, package: &package::Model) -> Result<PackageAudit> {
    let snapshot = capacity_snapshot(db, package).await?;

    let expected_remaining = package.total_sessions - snapshot.used_sessions;
    let counter_drift = if package.remaining_sessions == expected_remaining {
        None
    } else {
        Some(package.remaining_sessions - expected_remaining)
    };
    let over_delivered = snapshot.used_sessions > snapshot.unlocked_sessions;

    if let Some(drift) = counter_drift {
        record_alert(
            db,
            package.organization_id,
            package.id,
            AlertKind::CounterDrift,
            format!(
                "remaining_sessions={} but total={} - used={} gives {}, drift {drift}",
                package.remaining_sessions,
                package.total_sessions,
                snapshot.used_sessions,
                expected_remaining
            ),
        )
        .await?;
    }
    if over_delivered {
        record_alert(
            db,
            package.organization_id,
            package.id,
            AlertKind::OverDelivered,
            format!(
                "{} sessions delivered but only {} unlocked by payments",
                snapshot.used_sessions, snapshot.unlocked_sessions
            ),
        )
        .await?;
    }

    Ok(PackageAudit {
        package_id: package.id,
        snapshot,
        counter_drift,
        over_delivered,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_audit_clean_package() -> Result<()> {
        let db = setup_test_db().await?;
        let ctx = test_ctx();
        let package = create_test_package(&db).await?;

        pay(&db, package.id, 500.0).await?;
        create_pending_session(&db, package.id).await?;

        let audit = audit_package(&db, &ctx, package.id).await?;
        assert!(audit.is_clean());
        assert_eq!(audit.snapshot.used_sessions, 1);
        assert_eq!(audit.snapshot.unlocked_sessions, 5);

        let alerts = open_alerts(&db, &ctx).await?;
        assert!(alerts.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_audit_detects_counter_drift() -> Result<()> {
        let db = setup_test_db().await?;
        let ctx = test_ctx();
        let package = create_test_package(&db).await?;

        // Corrupt the bookkeeping counter the way legacy imports used to
        let mut active_model: crate::entities::package::ActiveModel = package.clone().into();
        active_model.remaining_sessions = Set(3);
        active_model.update(&db).await?;

        let audit = audit_package(&db, &ctx, package.id).await?;
        assert_eq!(audit.counter_drift, Some(3 - 12));
        assert!(!audit.over_delivered);

        let alerts = open_alerts(&db, &ctx).await?;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, crate::entities::AlertKind::CounterDrift);

        Ok(())
    }

    #[tokio::test]
    async fn test_audit_organization_scopes_by_tenant() -> Result<()> {
        let db = setup_test_db().await?;
        let ctx = test_ctx();
        create_test_package(&db).await?;

        let foreign_ctx = crate::core::TenantContext::new(999);
        let audits = audit_organization(&db, &foreign_ctx).await?;
        assert!(audits.is_empty());

        let audits = audit_organization(&db, &ctx).await?;
        assert_eq!(audits.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_audit_package_not_found() -> Result<()> {
        let db = setup_test_db().await?;
        let ctx = test_ctx();

        let result = audit_package(&db, &ctx, 424_242).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::PackageNotFound {
                package_id: 424_242
            }
        ));

        Ok(())
    }
}
