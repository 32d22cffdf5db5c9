//! Login sessions
//!
//! The statements are portable, so both backends share them; only the
//! executor differs.

use crate::db::{Backend, DynDatabasePool};
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const INSERT: &str = "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
const SELECT_BY_ID: &str = "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?";

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Look up a session by its token, expired or not
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Log a user out everywhere
    async fn delete_by_user(&self, user_id: i64) -> Result<()>;

    /// Remove expired sessions, returning how many went
    async fn delete_expired(&self) -> Result<i64>;
}

pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }

    /// Run a single-bind DELETE, returning the affected rows
    async fn delete_where<T>(&self, sql: &str, value: T) -> Result<u64>
    where
        T: for<'q> sqlx::Encode<'q, sqlx::Sqlite>
            + sqlx::Type<sqlx::Sqlite>
            + for<'q> sqlx::Encode<'q, sqlx::MySql>
            + sqlx::Type<sqlx::MySql>
            + Send
            + 'static,
    {
        let result = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql).bind(value).execute(p).await.map(|r| r.rows_affected()),
            Backend::Mysql(p) => sqlx::query(sql).bind(value).execute(p).await.map(|r| r.rows_affected()),
        };
        result.with_context(|| format!("Failed to run {}", sql))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        let result = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(INSERT)
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(p)
                .await
                .map(|_| ()),
            Backend::Mysql(p) => sqlx::query(INSERT)
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(p)
                .await
                .map(|_| ()),
        };
        result.context("Failed to create session")?;
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let session = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, Session>(SELECT_BY_ID)
                .bind(id)
                .fetch_optional(p)
                .await,
            Backend::Mysql(p) => sqlx::query_as::<_, Session>(SELECT_BY_ID)
                .bind(id)
                .fetch_optional(p)
                .await,
        };
        session.context("Failed to load session")
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.delete_where("DELETE FROM sessions WHERE id = ?", id.to_string())
            .await
            .map(|_| ())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        self.delete_where("DELETE FROM sessions WHERE user_id = ?", user_id)
            .await
            .map(|_| ())
    }

    async fn delete_expired(&self) -> Result<i64> {
        let removed = self
            .delete_where("DELETE FROM sessions WHERE expires_at < ?", Utc::now())
            .await?;
        Ok(removed as i64)
    }
}
