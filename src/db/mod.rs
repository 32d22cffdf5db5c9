//! Database layer
//!
//! SQLite (default, single file) or MySQL, selected by configuration.
//! Repositories take a [`DynDatabasePool`] and dispatch per backend.
//!
//! ```ignore
//! use neuron::config::DatabaseConfig;
//! use neuron::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
