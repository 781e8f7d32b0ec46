//! Package entity - a prepaid bucket of training sessions sold to one client.
//!
//! `session_value` is derived from `total_value / total_sessions` once at
//! creation and never recomputed, so historical sessions keep the price they
//! were sold at even if the package is later corrected. `remaining_sessions`
//! is display bookkeeping only; available capacity is always derived from the
//! payment ledger and the count of non-cancelled sessions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Package database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "packages")]
pub struct Model {
    /// Unique identifier for the package
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning organization (tenant boundary)
    pub organization_id: i64,
    /// Client the package was sold to
    pub client_id: i64,
    /// Total sale price of the package in dollars
    pub total_value: f64,
    /// Number of sessions the package was sold as
    pub total_sessions: i32,
    /// Per-session price, fixed at creation (`total_value / total_sessions`)
    pub session_value: f64,
    /// Bookkeeping counter of sessions nominally left; recomputed, never trusted
    pub remaining_sessions: i32,
    /// When the package becomes usable
    pub start_date: Option<DateTimeUtc>,
    /// Hard cutoff after which no session may be created
    pub expires_at: Option<DateTimeUtc>,
    /// Soft-deactivation flag - inactive packages reject new sessions but keep history
    pub active: bool,
}

/// Defines relationships between Package and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One package has many logged sessions
    #[sea_orm(has_many = "super::session::Entity")]
    Sessions,
    /// One package has many received payments
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
