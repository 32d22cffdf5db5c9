//! User repository
//!
//! Database operations for users and their author subscriptions.

use crate::db::{Backend, DynDatabasePool};
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const INSERT_USER: &str = "INSERT INTO users (username, email, password_hash, first_name, bio, photo, \
     is_author, is_staff, is_superuser, is_active, is_banned, created_at, updated_at) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const UPDATE_USER: &str = "UPDATE users SET email = ?, password_hash = ?, first_name = ?, bio = ?, \
     photo = ?, is_author = ?, is_staff = ?, is_superuser = ?, is_active = ?, is_banned = ?, \
     updated_at = ? WHERE id = ?";

/// Bind the writable columns of `user` in `INSERT_USER` order, minus the timestamps
macro_rules! bind_profile {
    ($query:expr, $user:expr) => {
        $query
            .bind(&$user.username)
            .bind(&$user.email)
            .bind(&$user.password_hash)
            .bind(&$user.first_name)
            .bind(&$user.bio)
            .bind(&$user.photo)
            .bind($user.is_author)
            .bind($user.is_staff)
            .bind($user.is_superuser)
            .bind($user.is_active)
            .bind($user.is_banned)
    };
}

/// Same for `UPDATE_USER`, where the username is immutable
macro_rules! bind_changes {
    ($query:expr, $user:expr) => {
        $query
            .bind(&$user.email)
            .bind(&$user.password_hash)
            .bind(&$user.first_name)
            .bind(&$user.bio)
            .bind(&$user.photo)
            .bind($user.is_author)
            .bind($user.is_staff)
            .bind($user.is_superuser)
            .bind($user.is_active)
            .bind($user.is_banned)
    };
}

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, bio, photo, \
     is_author, is_staff, is_superuser, is_active, is_banned, created_at, updated_at";

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Write back profile fields and flags
    async fn update(&self, user: &User) -> Result<User>;

    async fn count(&self) -> Result<i64>;

    /// Subscribe to an author. Returns false if the subscription already existed.
    async fn subscribe(&self, subscriber_id: i64, author_id: i64) -> Result<bool>;

    /// Drop a subscription. Returns false if there was none.
    async fn unsubscribe(&self, subscriber_id: i64, author_id: i64) -> Result<bool>;

    async fn is_subscribed(&self, subscriber_id: i64, author_id: i64) -> Result<bool>;

    /// Authors the user is subscribed to, by username
    async fn list_subscriptions(&self, subscriber_id: i64) -> Result<Vec<User>>;
}

/// Unique keys a user can be found by
#[derive(Debug, Clone, Copy)]
enum Lookup<'a> {
    Id(i64),
    Username(&'a str),
    Email(&'a str),
}

impl Lookup<'_> {
    fn column(&self) -> &'static str {
        match self {
            Lookup::Id(_) => "id",
            Lookup::Username(_) => "username",
            Lookup::Email(_) => "email",
        }
    }
}

pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn find_by(&self, key: Lookup<'_>) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, key.column());
        let context = || format!("Failed to look up user by {}", key.column());
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let query = sqlx::query_as::<_, User>(&sql);
                let query = match key {
                    Lookup::Id(id) => query.bind(id),
                    Lookup::Username(v) | Lookup::Email(v) => query.bind(v),
                };
                query.fetch_optional(p).await.with_context(context)
            }
            Backend::Mysql(p) => {
                let query = sqlx::query_as::<_, User>(&sql);
                let query = match key {
                    Lookup::Id(id) => query.bind(id),
                    Lookup::Username(v) | Lookup::Email(v) => query.bind(v),
                };
                query.fetch_optional(p).await.with_context(context)
            }
        }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => bind_profile!(sqlx::query(INSERT_USER), user)
                .bind(now)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(p) => bind_profile!(sqlx::query(INSERT_USER), user)
                .bind(now)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create user")?;

        Ok(User {
            id,
            created_at: now,
            updated_at: now,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        self.find_by(Lookup::Id(id)).await
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_by(Lookup::Username(username)).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_by(Lookup::Email(email)).await
    }

    async fn update(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let result = match self.pool.backend() {
            Backend::Sqlite(p) => bind_changes!(sqlx::query(UPDATE_USER), user)
                .bind(now)
                .bind(user.id)
                .execute(p)
                .await
                .map(|_| ()),
            Backend::Mysql(p) => bind_changes!(sqlx::query(UPDATE_USER), user)
                .bind(now)
                .bind(user.id)
                .execute(p)
                .await
                .map(|_| ()),
        };
        result.context("Failed to update user")?;

        Ok(User {
            updated_at: now,
            ..user.clone()
        })
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM users";
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql).fetch_one(p).await.map(|r| r.get("count")),
            Backend::Mysql(p) => sqlx::query(sql).fetch_one(p).await.map(|r| r.get("count")),
        }
        .context("Failed to count users")?;
        Ok(count)
    }

    async fn subscribe(&self, subscriber_id: i64, author_id: i64) -> Result<bool> {
        let now = Utc::now();
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(
                "INSERT OR IGNORE INTO subscriptions (subscriber_id, author_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(subscriber_id)
            .bind(author_id)
            .bind(now)
            .execute(p)
            .await
            .map(|r| r.rows_affected()),
            Backend::Mysql(p) => sqlx::query(
                "INSERT IGNORE INTO subscriptions (subscriber_id, author_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(subscriber_id)
            .bind(author_id)
            .bind(now)
            .execute(p)
            .await
            .map(|r| r.rows_affected()),
        }
        .context("Failed to subscribe")?;
        Ok(affected == 1)
    }

    async fn unsubscribe(&self, subscriber_id: i64, author_id: i64) -> Result<bool> {
        let sql = "DELETE FROM subscriptions WHERE subscriber_id = ? AND author_id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(subscriber_id)
                .bind(author_id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(subscriber_id)
                .bind(author_id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to unsubscribe")?;
        Ok(affected == 1)
    }

    async fn is_subscribed(&self, subscriber_id: i64, author_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM subscriptions WHERE subscriber_id = ? AND author_id = ?";
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(subscriber_id)
                .bind(author_id)
                .fetch_one(p)
                .await
                .map(|r| r.get("count")),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(subscriber_id)
                .bind(author_id)
                .fetch_one(p)
                .await
                .map(|r| r.get("count")),
        }
        .context("Failed to check subscription")?;
        Ok(count > 0)
    }

    async fn list_subscriptions(&self, subscriber_id: i64) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users u JOIN subscriptions s ON s.author_id = u.id \
             WHERE s.subscriber_id = ? ORDER BY u.username",
            USER_COLUMNS
                .split(", ")
                .map(|c| format!("u.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let authors = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query_as::<_, User>(&sql)
                .bind(subscriber_id)
                .fetch_all(p)
                .await,
            Backend::Mysql(p) => sqlx::query_as::<_, User>(&sql)
                .bind(subscriber_id)
                .fetch_all(p)
                .await,
        };
        authors.context("Failed to list subscriptions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn create_test_user(username: &str) -> User {
        User::new(
            username.to_string(),
            format!("{}@example.com", username),
            "hashed_password".to_string(),
        )
    }

    #[tokio::test]
    async fn test_create_user() {
        let repo = setup_test_repo().await;
        let created = repo.create(&create_test_user("alice")).await.unwrap();

        assert!(created.id > 0);
        assert_eq!(created.username, "alice");
        assert!(!created.is_active);
    }

    #[tokio::test]
    async fn test_get_user_lookups() {
        let repo = setup_test_repo().await;
        let created = repo.create(&create_test_user("bob")).await.unwrap();

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "bob@example.com");
        assert_eq!(by_id.password_hash, "hashed_password");

        let by_name = repo.get_by_username("bob").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);

        let by_email = repo.get_by_email("bob@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        assert!(repo.get_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_fails() {
        let repo = setup_test_repo().await;
        repo.create(&create_test_user("carol")).await.unwrap();

        let mut twin = create_test_user("carol");
        twin.email = "other@example.com".to_string();
        assert!(repo.create(&twin).await.is_err());
    }

    #[tokio::test]
    async fn test_update_flags_and_profile() {
        let repo = setup_test_repo().await;
        let mut user = repo.create(&create_test_user("dave")).await.unwrap();

        user.is_active = true;
        user.is_author = true;
        user.bio = "Writes things".to_string();
        user.photo = Some("users/dave.png".to_string());
        repo.update(&user).await.unwrap();

        let stored = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.is_active && stored.is_author);
        assert_eq!(stored.bio, "Writes things");
        assert_eq!(stored.photo.as_deref(), Some("users/dave.png"));
    }

    #[tokio::test]
    async fn test_count_users() {
        let repo = setup_test_repo().await;
        assert_eq!(repo.count().await.unwrap(), 0);
        repo.create(&create_test_user("erin")).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let repo = setup_test_repo().await;
        let reader = repo.create(&create_test_user("reader")).await.unwrap();
        let author = repo.create(&create_test_user("writer")).await.unwrap();

        assert!(!repo.is_subscribed(reader.id, author.id).await.unwrap());
        assert!(repo.subscribe(reader.id, author.id).await.unwrap());
        assert!(!repo.subscribe(reader.id, author.id).await.unwrap());
        assert!(repo.is_subscribed(reader.id, author.id).await.unwrap());

        let subs = repo.list_subscriptions(reader.id).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].username, "writer");
        assert!(repo.list_subscriptions(author.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let repo = setup_test_repo().await;
        let reader = repo.create(&create_test_user("reader")).await.unwrap();
        let author = repo.create(&create_test_user("writer")).await.unwrap();
        let other = repo.create(&create_test_user("other")).await.unwrap();
        repo.subscribe(reader.id, author.id).await.unwrap();
        repo.subscribe(reader.id, other.id).await.unwrap();

        assert!(repo.unsubscribe(reader.id, author.id).await.unwrap());
        assert!(!repo.unsubscribe(reader.id, author.id).await.unwrap());
        assert!(!repo.is_subscribed(reader.id, author.id).await.unwrap());
        assert!(repo.is_subscribed(reader.id, other.id).await.unwrap());
    }
}
