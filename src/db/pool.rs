//! Connection pools for the two supported backends
//!
//! Repositories hold a [`DynDatabasePool`] and match on [`DatabasePool::backend`]
//! to pick the SQL dialect.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{DatabaseConfig, DatabaseDriver};

const SQLITE_MAX_CONNECTIONS: u32 = 20;
const MYSQL_MAX_CONNECTIONS: u32 = 30;

/// Borrowed handle on the concrete pool behind a [`DatabasePool`]
#[derive(Clone, Copy)]
pub enum Backend<'a> {
    Sqlite(&'a SqlitePool),
    Mysql(&'a MySqlPool),
}

/// A pool that can hand out its concrete backend.
///
/// Everything else is derived from [`DatabasePool::backend`].
#[async_trait]
pub trait DatabasePool: Send + Sync {
    fn backend(&self) -> Backend<'_>;

    fn driver(&self) -> DatabaseDriver {
        match self.backend() {
            Backend::Sqlite(_) => DatabaseDriver::Sqlite,
            Backend::Mysql(_) => DatabaseDriver::Mysql,
        }
    }

    /// Run a statement that returns no rows, yielding the affected row count
    async fn execute(&self, sql: &str) -> Result<u64> {
        let result = match self.backend() {
            Backend::Sqlite(p) => sqlx::query(sql).execute(p).await.map(|r| r.rows_affected()),
            Backend::Mysql(p) => sqlx::query(sql).execute(p).await.map(|r| r.rows_affected()),
        };
        result.with_context(|| format!("Failed to execute: {}", sql))
    }

    async fn ping(&self) -> Result<()> {
        let result = match self.backend() {
            Backend::Sqlite(p) => sqlx::query("SELECT 1").execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query("SELECT 1").execute(p).await.map(|_| ()),
        };
        result.context("Database ping failed")
    }
}

pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (or create) a SQLite database.
    ///
    /// Accepts a bare file path, a `sqlite:` URL, or `:memory:`. Foreign keys
    /// are switched on for every pooled connection.
    pub async fn new(url: &str) -> Result<Self> {
        let in_memory = url == ":memory:" || url.starts_with("sqlite::memory:");
        let connection_url = match url {
            ":memory:" => "sqlite::memory:".to_string(),
            u if u.starts_with("sqlite:") => u.to_string(),
            path => format!("sqlite:{}", path),
        };

        if !in_memory {
            ensure_parent_dir(&connection_url)?;
        }

        let options = SqliteConnectOptions::from_str(&connection_url)
            .with_context(|| format!("Invalid SQLite URL: {}", url))?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database lives exactly as long as its one connection
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(SQLITE_MAX_CONNECTIONS)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database: {}", url))?;
        Ok(Self { pool })
    }
}

impl DatabasePool for SqliteDatabase {
    fn backend(&self) -> Backend<'_> {
        Backend::Sqlite(&self.pool)
    }
}

/// Create the directory holding a SQLite file
fn ensure_parent_dir(connection_url: &str) -> Result<()> {
    let path = connection_url.trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory: {:?}", parent)),
        _ => Ok(()),
    }
}

pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let connection_url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(MYSQL_MAX_CONNECTIONS)
            .connect(&connection_url)
            .await
            .with_context(|| format!("Failed to connect to MySQL: {}", url))?;
        Ok(Self { pool })
    }
}

impl DatabasePool for MysqlDatabase {
    fn backend(&self) -> Backend<'_> {
        Backend::Mysql(&self.pool)
    }
}

pub type DynDatabasePool = Arc<dyn DatabasePool>;

/// Connect to the configured backend and check the connection
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let pool: DynDatabasePool = match config.driver {
        DatabaseDriver::Sqlite => Arc::new(SqliteDatabase::new(&config.url).await?),
        DatabaseDriver::Mysql => Arc::new(MysqlDatabase::new(&config.url).await?),
    };
    pool.ping().await?;
    Ok(pool)
}

/// In-memory SQLite pool for tests
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    create_pool(&DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
    })
    .await
}
