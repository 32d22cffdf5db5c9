//! Comment repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Comment, CreateCommentInput};

const COMMENT_SELECT: &str = "SELECT c.id, c.content, c.post_id, c.author_id, u.username AS author_username, \
     c.time_create, c.is_published FROM comments c JOIN users u ON u.id = c.author_id";

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Create a new, visible comment
    async fn create(&self, input: &CreateCommentInput) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Visible comments of a post, oldest first
    async fn list_published_by_post(&self, post_id: i64) -> Result<Vec<Comment>>;

    /// Show or hide a comment. Returns false if it does not exist.
    async fn set_published(&self, id: i64, published: bool) -> Result<bool>;
}

/// SQLx-based comment repository implementation
pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, input: &CreateCommentInput) -> Result<Comment> {
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => create_sqlite(p, input).await?,
            Backend::Mysql(p) => create_mysql(p, input).await?,
        };
        self.get_by_id(id)
            .await?
            .context("Comment not found after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("{} WHERE c.id = ?", COMMENT_SELECT);
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get comment")?;
                row.as_ref().map(row_to_comment_sqlite).transpose()
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get comment")?;
                row.as_ref().map(row_to_comment_mysql).transpose()
            }
        }
    }

    async fn list_published_by_post(&self, post_id: i64) -> Result<Vec<Comment>> {
        let sql = format!(
            "{} WHERE c.post_id = ? AND c.is_published = 1 ORDER BY c.time_create ASC, c.id ASC",
            COMMENT_SELECT
        );
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let rows = sqlx::query(&sql)
                    .bind(post_id)
                    .fetch_all(p)
                    .await
                    .context("Failed to list comments")?;
                rows.iter().map(row_to_comment_sqlite).collect()
            }
            Backend::Mysql(p) => {
                let rows = sqlx::query(&sql)
                    .bind(post_id)
                    .fetch_all(p)
                    .await
                    .context("Failed to list comments")?;
                rows.iter().map(row_to_comment_mysql).collect()
            }
        }
    }

    async fn set_published(&self, id: i64, published: bool) -> Result<bool> {
        let sql = "UPDATE comments SET is_published = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let result = sqlx::query(sql)
                    .bind(published)
                    .bind(id)
                    .execute(p)
                    .await
                    .context("Failed to update comment")?;
                Ok(result.rows_affected() > 0)
            }
            Backend::Mysql(p) => {
                sqlx::query(sql)
                    .bind(published)
                    .bind(id)
                    .execute(p)
                    .await
                    .context("Failed to update comment")?;
                // Unchanged rows report zero on MySQL, so check existence instead.
                Ok(self.get_by_id(id).await?.is_some())
            }
        }
    }
}

// SQLite implementations
async fn create_sqlite(pool: &SqlitePool, input: &CreateCommentInput) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO comments (content, post_id, author_id, time_create, is_published) VALUES (?, ?, ?, ?, 1)",
    )
    .bind(&input.content)
    .bind(input.post_id)
    .bind(input.author_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to create comment")?;

    Ok(result.last_insert_rowid())
}

fn row_to_comment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Comment> {
    Ok(Comment {
        id: row.get("id"),
        content: row.get("content"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        time_create: row.get("time_create"),
        is_published: row.get("is_published"),
    })
}

// MySQL implementations
async fn create_mysql(pool: &MySqlPool, input: &CreateCommentInput) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO comments (content, post_id, author_id, time_create, is_published) VALUES (?, ?, ?, ?, TRUE)",
    )
    .bind(&input.content)
    .bind(input.post_id)
    .bind(input.author_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to create comment")?;

    Ok(result.last_insert_id() as i64)
}

fn row_to_comment_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Comment> {
    Ok(Comment {
        id: row.get("id"),
        content: row.get("content"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        time_create: row.get("time_create"),
        is_published: row.get("is_published"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (DynDatabasePool, SqlxCommentRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        if let Backend::Sqlite(p) = pool.backend() {
            sqlx::query("INSERT INTO users (id, username, email, password_hash) VALUES (1, 'reader', 'r@example.com', 'hash')")
                .execute(p)
                .await
                .unwrap();
            sqlx::query("INSERT INTO posts (id, title, slug, article, author_id, is_draft, is_published) VALUES (1, 'Post', 'post', 'body', 1, 0, 1)")
                .execute(p)
                .await
                .unwrap();
        }

        let repo = SqlxCommentRepository::new(pool.clone());
        (pool, repo)
    }

    fn input(content: &str) -> CreateCommentInput {
        CreateCommentInput {
            post_id: 1,
            author_id: 1,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_comment_joins_username() {
        let (_pool, repo) = setup().await;
        let comment = repo.create(&input("Nice post")).await.unwrap();

        assert!(comment.id > 0);
        assert_eq!(comment.author_username, "reader");
        assert!(comment.is_published);
    }

    #[tokio::test]
    async fn test_list_published_oldest_first() {
        let (_pool, repo) = setup().await;
        let first = repo.create(&input("first")).await.unwrap();
        let second = repo.create(&input("second")).await.unwrap();
        let hidden = repo.create(&input("spam")).await.unwrap();
        assert!(repo.set_published(hidden.id, false).await.unwrap());

        let listed = repo.list_published_by_post(1).await.unwrap();
        assert_eq!(
            listed.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );
    }

    #[tokio::test]
    async fn test_set_published_missing_comment() {
        let (_pool, repo) = setup().await;
        assert!(!repo.set_published(404, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_comments_removed_with_post() {
        let (pool, repo) = setup().await;
        let comment = repo.create(&input("bye")).await.unwrap();

        pool.execute("DELETE FROM posts WHERE id = 1").await.unwrap();
        assert!(repo.get_by_id(comment.id).await.unwrap().is_none());
    }
}
