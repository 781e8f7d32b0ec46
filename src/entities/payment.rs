//! Payment entity - one money-received event against a package.
//!
//! Rows are append-mostly: a payment is inserted when money arrives and
//! deleted only as an explicit correction. The sum of payments for a package
//! never exceeds its `total_value` by more than a currency-rounding epsilon.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How the money was received.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum PaymentMethod {
    /// Card payment (e.g. Stripe checkout)
    #[sea_orm(string_value = "card")]
    Card,
    /// Direct bank transfer
    #[sea_orm(string_value = "bank_transfer")]
    BankTransfer,
    /// Cash, voucher, or anything else recorded manually
    #[sea_orm(string_value = "other")]
    Other,
}

/// Payment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    /// Unique identifier for the payment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning organization (tenant boundary, inherited from the package)
    pub organization_id: i64,
    /// Package the money was received against
    pub package_id: i64,
    /// Amount received in dollars (always positive)
    pub amount: f64,
    /// When the money was received
    pub payment_date: DateTimeUtc,
    /// How the money was received
    pub payment_method: PaymentMethod,
    /// Staff member credited with the sale, for sales-commission accounting
    pub sold_by: Option<i64>,
    /// Second staff member on a split sale
    pub sold_by_secondary: Option<i64>,
}

/// Defines relationships between Payment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each payment belongs to one package
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
