//! Session entity - a single logged training occurrence.
//!
//! Exactly one logical state holds at any time: awaiting confirmation
//! (redeemable token, `validated = false`, `cancelled = false`), validated
//! (terminal), expired (derived from `validation_expiry` being in the past),
//! or cancelled (terminal tombstone). Sessions are never hard-deleted.
//!
//! After successful validation the token string is retained as a lookup key
//! so repeated `validate` calls stay idempotent; `validation_expiry` is
//! cleared and redeemability is gated on the state flags alone.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Session database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    /// Unique identifier for the session
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning organization (tenant boundary, inherited from the package)
    pub organization_id: i64,
    /// Trainer who delivered the session
    pub trainer_id: i64,
    /// Client who received the session
    pub client_id: i64,
    /// Package the session was logged against
    pub package_id: i64,
    /// Location where the session took place
    pub location_id: i64,
    /// When the session occurred
    pub session_date: DateTimeUtc,
    /// Price attributed to this session, copied from the package at creation
    pub session_value: f64,
    /// Optional free-form trainer notes
    pub notes: Option<String>,
    /// Whether the client has confirmed the session happened
    pub validated: bool,
    /// When the client confirmed, if they have
    pub validated_at: Option<DateTimeUtc>,
    /// Tombstone flag - cancelled sessions never count toward capacity or commission
    pub cancelled: bool,
    /// When the session was cancelled, if it was
    pub cancelled_at: Option<DateTimeUtc>,
    /// Opaque confirmation token emailed to the client
    #[sea_orm(unique)]
    pub validation_token: Option<String>,
    /// Confirmation deadline; `None` once validated or cancelled
    pub validation_expiry: Option<DateTimeUtc>,
}

/// Defines relationships between Session and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each session belongs to one package
    #[sea_orm(
        belongs_to = "super::package::Entity",
        from = "Column::PackageId",
        to = "super::package::Column::Id"
    )]
    Package,
}

impl Related<super::package::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Package.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
