/// Commission method and tier table loading from commission.toml
pub mod commission;

/// Database configuration and connection management
pub mod database;
