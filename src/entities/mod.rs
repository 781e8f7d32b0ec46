//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod integrity_alert;
pub mod package;
pub mod payment;
pub mod session;

// Re-export specific types to avoid conflicts
pub use integrity_alert::{
    AlertKind, Column as IntegrityAlertColumn, Entity as IntegrityAlert,
    Model as IntegrityAlertModel,
};
pub use package::{Column as PackageColumn, Entity as Package, Model as PackageModel};
pub use payment::{
    Column as PaymentColumn, Entity as Payment, Model as PaymentModel, PaymentMethod,
};
pub use session::{Column as SessionColumn, Entity as Session, Model as SessionModel};
