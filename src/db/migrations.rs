//! Schema migrations
//!
//! Each migration carries one SQL script per backend. Applied versions are
//! recorded in `_migrations`; a migration and its record are written in one
//! transaction (MySQL commits DDL implicitly, so there it is best effort).
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use std::collections::BTreeSet;

use super::{Backend, DynDatabasePool};

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Sequential, starting at 1
    pub version: i32,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

impl Migration {
    /// Statements of this migration for `backend`, in order
    fn statements(&self, backend: Backend<'_>) -> impl Iterator<Item = &'static str> {
        let script = match backend {
            Backend::Sqlite(_) => self.up_sqlite,
            Backend::Mysql(_) => self.up_mysql,
        };
        script
            .split(';')
            .map(str::trim)
            .filter(|stmt| !stmt.lines().all(|l| l.trim().is_empty() || l.trim().starts_with("--")))
    }
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(150) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                first_name VARCHAR(150) NOT NULL DEFAULT '',
                bio TEXT NOT NULL DEFAULT '',
                photo VARCHAR(255),
                is_author BOOLEAN NOT NULL DEFAULT 0,
                is_staff BOOLEAN NOT NULL DEFAULT 0,
                is_superuser BOOLEAN NOT NULL DEFAULT 0,
                is_active BOOLEAN NOT NULL DEFAULT 0,
                is_banned BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_is_author ON users(is_author);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(150) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                first_name VARCHAR(150) NOT NULL DEFAULT '',
                bio TEXT NOT NULL,
                photo VARCHAR(255) NULL,
                is_author BOOLEAN NOT NULL DEFAULT FALSE,
                is_staff BOOLEAN NOT NULL DEFAULT FALSE,
                is_superuser BOOLEAN NOT NULL DEFAULT FALSE,
                is_active BOOLEAN NOT NULL DEFAULT FALSE,
                is_banned BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_users_is_author ON users(is_author);
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    // Authors are RESTRICT (a user with posts cannot be deleted); editors are SET NULL.
    Migration {
        version: 3,
        name: "create_posts",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(150) NOT NULL,
                slug VARCHAR(150) NOT NULL UNIQUE,
                epigraph VARCHAR(256) NOT NULL DEFAULT '',
                article TEXT NOT NULL,
                image VARCHAR(255),
                author_id INTEGER NOT NULL,
                editor_id INTEGER,
                is_draft BOOLEAN NOT NULL DEFAULT 1,
                is_published BOOLEAN NOT NULL DEFAULT 0,
                is_pinned BOOLEAN NOT NULL DEFAULT 0,
                time_create TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                time_update TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                CHECK (NOT (is_draft = 1 AND is_published = 1)),
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE RESTRICT,
                FOREIGN KEY (editor_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_posts_state ON posts(is_draft, is_published, is_pinned);
            CREATE INDEX IF NOT EXISTS idx_posts_author_id ON posts(author_id);
            CREATE INDEX IF NOT EXISTS idx_posts_time_update ON posts(time_update);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(150) NOT NULL,
                slug VARCHAR(150) NOT NULL UNIQUE,
                epigraph VARCHAR(256) NOT NULL DEFAULT '',
                article MEDIUMTEXT NOT NULL,
                image VARCHAR(255) NULL,
                author_id BIGINT NOT NULL,
                editor_id BIGINT NULL,
                is_draft BOOLEAN NOT NULL DEFAULT TRUE,
                is_published BOOLEAN NOT NULL DEFAULT FALSE,
                is_pinned BOOLEAN NOT NULL DEFAULT FALSE,
                time_create TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                time_update TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                CONSTRAINT chk_posts_state CHECK (NOT (is_draft AND is_published)),
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE RESTRICT,
                FOREIGN KEY (editor_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_posts_state ON posts(is_draft, is_published, is_pinned);
            CREATE INDEX idx_posts_author_id ON posts(author_id);
            CREATE INDEX idx_posts_time_update ON posts(time_update);
        "#,
    },
    Migration {
        version: 4,
        name: "create_comments",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                post_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                time_create TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                is_published BOOLEAN NOT NULL DEFAULT 1,
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments(post_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS comments (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                content TEXT NOT NULL,
                post_id BIGINT NOT NULL,
                author_id BIGINT NOT NULL,
                time_create TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                is_published BOOLEAN NOT NULL DEFAULT TRUE,
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_comments_post_id ON comments(post_id);
        "#,
    },
    Migration {
        version: 5,
        name: "create_subscriptions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                subscriber_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (subscriber_id, author_id),
                FOREIGN KEY (subscriber_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_subscriptions_author_id ON subscriptions(author_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                subscriber_id BIGINT NOT NULL,
                author_id BIGINT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (subscriber_id, author_id),
                FOREIGN KEY (subscriber_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_subscriptions_author_id ON subscriptions(author_id);
        "#,
    },
];

/// Apply every pending migration, returning how many ran
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    let applied = applied_versions(pool).await?;
    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect();

    if pending.is_empty() {
        tracing::debug!("Schema is up to date");
        return Ok(0);
    }

    for migration in &pending {
        tracing::info!("Applying migration {}: {}", migration.version, migration.name);
        apply(pool, migration)
            .await
            .with_context(|| format!("Migration {} ({}) failed", migration.version, migration.name))?;
    }
    tracing::info!("Applied {} migration(s)", pending.len());
    Ok(pending.len())
}

/// Number of migrations not applied yet
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    let applied = applied_versions(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .count())
}

/// Versions recorded in `_migrations`, creating the table on first use
async fn applied_versions(pool: &DynDatabasePool) -> Result<BTreeSet<i32>> {
    const SELECT: &str = "SELECT version FROM _migrations";

    let versions = match pool.backend() {
        Backend::Sqlite(p) => {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS _migrations (
                    version INTEGER PRIMARY KEY,
                    name VARCHAR(255) NOT NULL,
                    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                )",
            )
            .execute(p)
            .await?;
            sqlx::query_scalar::<_, i32>(SELECT).fetch_all(p).await
        }
        Backend::Mysql(p) => {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS _migrations (
                    version INT PRIMARY KEY,
                    name VARCHAR(255) NOT NULL,
                    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                )",
            )
            .execute(p)
            .await?;
            sqlx::query_scalar::<_, i32>(SELECT).fetch_all(p).await
        }
    }
    .context("Failed to read applied migrations")?;

    Ok(versions.into_iter().collect())
}

async fn apply(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    const RECORD: &str = "INSERT INTO _migrations (version, name) VALUES (?, ?)";
    let backend = pool.backend();

    match backend {
        Backend::Sqlite(p) => {
            let mut tx = p.begin().await?;
            for stmt in migration.statements(backend) {
                sqlx::query(stmt)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to execute: {}", abbreviate(stmt)))?;
            }
            sqlx::query(RECORD)
                .bind(migration.version)
                .bind(migration.name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
        Backend::Mysql(p) => {
            let mut tx = p.begin().await?;
            for stmt in migration.statements(backend) {
                sqlx::query(stmt)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to execute: {}", abbreviate(stmt)))?;
            }
            sqlx::query(RECORD)
                .bind(migration.version)
                .bind(migration.name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
    }
    Ok(())
}

/// First line of a statement, for error messages
fn abbreviate(stmt: &str) -> &str {
    stmt.lines().next().unwrap_or(stmt)
}
