pub mod app_config;
pub mod config_error;
pub mod database_config;
pub mod database_error;
pub mod database_migration;
pub mod driven;
pub mod driver;

pub use app_config::{AppConfig, StoreKind};
pub use config_error::ConfigError;
pub use database_config::DatabaseConfig;
pub use database_migration::DatabaseMigration;
