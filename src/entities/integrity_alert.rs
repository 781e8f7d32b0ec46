//! Integrity alert entity - operator-facing record of a detected
//! data-integrity defect. Alerts are insert-only and never block the
//! operation that detected the problem.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What kind of defect was detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum AlertKind {
    /// `remaining_sessions` diverged from `total_sessions - used_sessions`
    #[sea_orm(string_value = "counter_drift")]
    CounterDrift,
    /// More sessions delivered than the received payments unlock
    #[sea_orm(string_value = "over_delivered")]
    OverDelivered,
}

/// Integrity alert database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "integrity_alerts")]
pub struct Model {
    /// Unique identifier for the alert
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning organization (tenant boundary)
    pub organization_id: i64,
    /// Package the defect was detected on
    pub package_id: i64,
    /// Defect classification
    pub kind: AlertKind,
    /// Human-readable description with the offending numbers
    pub detail: String,
    /// When the defect was detected
    pub created_at: DateTimeUtc,
}

/// `IntegrityAlert` has no navigable relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
