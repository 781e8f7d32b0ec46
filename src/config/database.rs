//! Database configuration module for the session ledger.
//!
//! This module handles `SQLite` database connection and table creation using
//! `SeaORM`. It provides functions for establishing database connections and
//! creating all necessary tables based on the entity definitions. The module
//! uses `SeaORM`'s `Schema::create_table_from_entity` method to automatically
//! generate SQL statements from the entity models, ensuring that the database
//! schema matches the Rust struct definitions without requiring manual SQL.

use crate::entities::{IntegrityAlert, Package, Payment, Session};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

/// Gets the database URL from environment variable or returns default
/// `SQLite` path.
///
/// This function looks for `DATABASE_URL` in the environment and falls back
/// to a default local `SQLite` file if not found.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://data/session_ledger.sqlite".to_string())
}

/// Establishes a connection to the `SQLite` database using the
/// `DATABASE_URL` environment variable.
///
/// Falls back to a default local `SQLite` file if no environment variable is
/// set. This function handles connection errors and provides a clean
/// interface for database access throughout the application.
pub async fn create_connection() -> Result<DatabaseConnection> {
    Database::connect(get_database_url())
        .await
        .map_err(Into::into)
}

/// Creates all necessary database tables using `SeaORM`'s schema generation
/// from entity definitions.
///
/// This function uses the `DeriveEntityModel` macros to automatically
/// generate proper SQL statements for table creation, ensuring the database
/// schema matches the Rust struct definitions. It creates tables for
/// packages, sessions, payments, and integrity alerts.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let package_table = schema.create_table_from_entity(Package);
    let session_table = schema.create_table_from_entity(Session);
    let payment_table = schema.create_table_from_entity(Payment);
    let integrity_alert_table = schema.create_table_from_entity(IntegrityAlert);

    db.execute(builder.build(&package_table)).await?;
    db.execute(builder.build(&session_table)).await?;
    db.execute(builder.build(&payment_table)).await?;
    db.execute(builder.build(&integrity_alert_table)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        integrity_alert::Model as IntegrityAlertModel, package::Model as PackageModel,
        payment::Model as PaymentModel, session::Model as SessionModel,
    };
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<PackageModel> = Package::find().limit(1).all(&db).await?;
        let _: Vec<SessionModel> = Session::find().limit(1).all(&db).await?;
        let _: Vec<PaymentModel> = Payment::find().limit(1).all(&db).await?;
        let _: Vec<IntegrityAlertModel> = IntegrityAlert::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_database_url_default() {
        // Only assert the fallback shape; the env var may be set externally
        let url = get_database_url();
        assert!(url.starts_with("sqlite:") || std::env::var("DATABASE_URL").is_ok());
    }
}
