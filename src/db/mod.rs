//! Database layer
//!
//! SQLite is the default for single-binary deployment; MySQL is selected
//! through `database.driver` in the configuration.
//!
//! # Usage
//!
//! ```ignore
//! use libertypost::config::DatabaseConfig;
//! use libertypost::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
