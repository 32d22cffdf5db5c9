//! Post repository
//!
//! Database operations for posts. Listings are driven by [`PostFilter`], which
//! maps to a WHERE clause and an ordering shared by both backends.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{CreatePostInput, Post, PostFilter, UpdatePostInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const POST_COLUMNS: &str = "id, title, slug, epigraph, article, image, author_id, editor_id, \
     is_draft, is_published, is_pinned, time_create, time_update";

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, input: &CreatePostInput) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Find by slug regardless of status
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    async fn update(&self, id: i64, input: &UpdatePostInput) -> Result<Post>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Whether another post already uses this title or slug
    async fn exists_title_or_slug(
        &self,
        title: &str,
        slug: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool>;

    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<Post>>;

    async fn count(&self, filter: &PostFilter) -> Result<i64>;

    /// Claim an unclaimed, unpublished post for review.
    ///
    /// Returns false when the post is already claimed or published.
    async fn assign_editor(&self, post_id: i64, editor_id: i64) -> Result<bool>;

    /// Pin or unpin a published post. Returns false for any other status.
    async fn set_pinned(&self, post_id: i64, pinned: bool) -> Result<bool>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, input: &CreatePostInput) -> Result<Post> {
        match self.pool.backend() {
            Backend::Sqlite(p) => create_post_sqlite(p, input).await,
            Backend::Mysql(p) => create_post_mysql(p, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => get_post_by_id_sqlite(p, id).await,
            Backend::Mysql(p) => get_post_by_id_mysql(p, id).await,
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => get_post_by_slug_sqlite(p, slug).await,
            Backend::Mysql(p) => get_post_by_slug_mysql(p, slug).await,
        }
    }

    async fn update(&self, id: i64, input: &UpdatePostInput) -> Result<Post> {
        match self.pool.backend() {
            Backend::Sqlite(p) => update_post_sqlite(p, id, input).await,
            Backend::Mysql(p) => update_post_mysql(p, id, input).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(p) => sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
        };
        result.context("Failed to delete post")?;
        Ok(())
    }

    async fn exists_title_or_slug(
        &self,
        title: &str,
        slug: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM posts WHERE (title = ? OR slug = ?) AND id != ?";
        let exclude_id = exclude_id.unwrap_or_default();
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(title)
                .bind(slug)
                .bind(exclude_id)
                .fetch_one(p)
                .await
                .map(|row| row.get("count")),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(title)
                .bind(slug)
                .bind(exclude_id)
                .fetch_one(p)
                .await
                .map(|row| row.get("count")),
        }
        .context("Failed to check post title")?;
        Ok(count > 0)
    }

    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<Post>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => list_posts_sqlite(p, filter, offset, limit).await,
            Backend::Mysql(p) => list_posts_mysql(p, filter, offset, limit).await,
        }
    }

    async fn count(&self, filter: &PostFilter) -> Result<i64> {
        match self.pool.backend() {
            Backend::Sqlite(p) => count_posts_sqlite(p, filter).await,
            Backend::Mysql(p) => count_posts_mysql(p, filter).await,
        }
    }

    async fn assign_editor(&self, post_id: i64, editor_id: i64) -> Result<bool> {
        // The predicate makes the claim atomic: a second reviewer matches no row.
        let sql = "UPDATE posts SET editor_id = ? \
                   WHERE id = ? AND editor_id IS NULL AND is_published = 0";
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(editor_id)
                .bind(post_id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(editor_id)
                .bind(post_id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to assign editor")?;
        Ok(affected == 1)
    }

    async fn set_pinned(&self, post_id: i64, pinned: bool) -> Result<bool> {
        let sql = "UPDATE posts SET is_pinned = ? WHERE id = ? AND is_published = 1";
        let affected = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(pinned)
                .bind(post_id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(pinned)
                .bind(post_id)
                .execute(p)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to pin post")?;
        // MySQL reports zero affected rows when the value is unchanged.
        Ok(affected == 1 || self.get_by_id(post_id).await?.is_some_and(|p| p.is_published))
    }
}

/// SQL pieces for one [`PostFilter`]; binds go author id first, then keyword
struct FilterSql {
    where_clause: &'static str,
    order_by: &'static str,
    author_id: Option<i64>,
    pattern: Option<String>,
}

fn filter_sql(filter: &PostFilter) -> FilterSql {
    match filter {
        PostFilter::Home => FilterSql {
            where_clause: "is_draft = 0 AND is_published = 1 AND is_pinned = 0",
            order_by: "time_update DESC, id DESC",
            author_id: None,
            pattern: None,
        },
        PostFilter::Pinned => FilterSql {
            where_clause: "is_draft = 0 AND is_published = 1 AND is_pinned = 1",
            order_by: "time_update DESC, id DESC",
            author_id: None,
            pattern: None,
        },
        PostFilter::Drafts { author_id } => FilterSql {
            where_clause: "is_draft = 1 AND author_id = ?",
            order_by: "time_create DESC, id DESC",
            author_id: Some(*author_id),
            pattern: None,
        },
        PostFilter::Unpublished => FilterSql {
            where_clause: "is_draft = 0 AND is_published = 0",
            order_by: "time_update DESC, id DESC",
            author_id: None,
            pattern: None,
        },
        PostFilter::ByAuthor { author_id } => FilterSql {
            where_clause: "is_draft = 0 AND is_published = 1 AND author_id = ?",
            order_by: "time_create DESC, id DESC",
            author_id: Some(*author_id),
            pattern: None,
        },
        PostFilter::Search { keyword } => FilterSql {
            where_clause: "is_draft = 0 AND is_published = 1 \
                           AND (title LIKE ? ESCAPE '!' OR epigraph LIKE ? ESCAPE '!' \
                           OR article LIKE ? ESCAPE '!')",
            order_by: "time_update DESC, id DESC",
            author_id: None,
            pattern: Some(format!("%{}%", escape_like(keyword))),
        },
    }
}

/// Make `%` and `_` match themselves. `!` is the escape character because
/// MySQL and SQLite disagree on backslashes inside string literals.
fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_post_sqlite(pool: &SqlitePool, input: &CreatePostInput) -> Result<Post> {
    let now = Utc::now();
    let (is_draft, is_published) = input.status.flags();

    let result = sqlx::query(
        r#"
        INSERT INTO posts (title, slug, epigraph, article, image, author_id,
                           is_draft, is_published, is_pinned, time_create, time_update)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.slug)
    .bind(&input.epigraph)
    .bind(&input.article)
    .bind(&input.image)
    .bind(input.author_id)
    .bind(is_draft)
    .bind(is_published)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create post")?;

    get_post_by_id_sqlite(pool, result.last_insert_rowid())
        .await?
        .context("Post not found after insert")
}

async fn get_post_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by ID")?;

    row.as_ref().map(row_to_post_sqlite).transpose()
}

async fn get_post_by_slug_sqlite(pool: &SqlitePool, slug: &str) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE slug = ?", POST_COLUMNS))
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by slug")?;

    row.as_ref().map(row_to_post_sqlite).transpose()
}

async fn update_post_sqlite(pool: &SqlitePool, id: i64, input: &UpdatePostInput) -> Result<Post> {
    let (is_draft, is_published) = input.status.flags();

    sqlx::query(
        r#"
        UPDATE posts
        SET title = ?, slug = ?, epigraph = ?, article = ?, image = COALESCE(?, image),
            is_draft = ?, is_published = ?, time_update = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.title)
    .bind(&input.slug)
    .bind(&input.epigraph)
    .bind(&input.article)
    .bind(&input.image)
    .bind(is_draft)
    .bind(is_published)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update post")?;

    get_post_by_id_sqlite(pool, id)
        .await?
        .context("Post not found after update")
}

async fn list_posts_sqlite(
    pool: &SqlitePool,
    filter: &PostFilter,
    offset: i64,
    limit: i64,
) -> Result<Vec<Post>> {
    let parts = filter_sql(filter);
    let sql = format!(
        "SELECT {} FROM posts WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
        POST_COLUMNS, parts.where_clause, parts.order_by
    );

    let mut query = sqlx::query(&sql);
    if let Some(author_id) = parts.author_id {
        query = query.bind(author_id);
    }
    if let Some(pattern) = &parts.pattern {
        query = query.bind(pattern).bind(pattern).bind(pattern);
    }

    let rows = query
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    rows.iter().map(row_to_post_sqlite).collect()
}

async fn count_posts_sqlite(pool: &SqlitePool, filter: &PostFilter) -> Result<i64> {
    let parts = filter_sql(filter);
    let sql = format!("SELECT COUNT(*) AS count FROM posts WHERE {}", parts.where_clause);

    let mut query = sqlx::query(&sql);
    if let Some(author_id) = parts.author_id {
        query = query.bind(author_id);
    }
    if let Some(pattern) = &parts.pattern {
        query = query.bind(pattern).bind(pattern).bind(pattern);
    }

    let row = query
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;
    Ok(row.get("count"))
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    Ok(Post {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        epigraph: row.get("epigraph"),
        article: row.get("article"),
        image: row.get("image"),
        author_id: row.get("author_id"),
        editor_id: row.get("editor_id"),
        is_draft: row.get("is_draft"),
        is_published: row.get("is_published"),
        is_pinned: row.get("is_pinned"),
        time_create: row.get("time_create"),
        time_update: row.get("time_update"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_post_mysql(pool: &MySqlPool, input: &CreatePostInput) -> Result<Post> {
    let now = Utc::now();
    let (is_draft, is_published) = input.status.flags();

    let result = sqlx::query(
        r#"
        INSERT INTO posts (title, slug, epigraph, article, image, author_id,
                           is_draft, is_published, is_pinned, time_create, time_update)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, FALSE, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.slug)
    .bind(&input.epigraph)
    .bind(&input.article)
    .bind(&input.image)
    .bind(input.author_id)
    .bind(is_draft)
    .bind(is_published)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create post")?;

    get_post_by_id_mysql(pool, result.last_insert_id() as i64)
        .await?
        .context("Post not found after insert")
}

async fn get_post_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by ID")?;

    row.as_ref().map(row_to_post_mysql).transpose()
}

async fn get_post_by_slug_mysql(pool: &MySqlPool, slug: &str) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE slug = ?", POST_COLUMNS))
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by slug")?;

    row.as_ref().map(row_to_post_mysql).transpose()
}

async fn update_post_mysql(pool: &MySqlPool, id: i64, input: &UpdatePostInput) -> Result<Post> {
    let (is_draft, is_published) = input.status.flags();

    sqlx::query(
        r#"
        UPDATE posts
        SET title = ?, slug = ?, epigraph = ?, article = ?, image = COALESCE(?, image),
            is_draft = ?, is_published = ?, time_update = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.title)
    .bind(&input.slug)
    .bind(&input.epigraph)
    .bind(&input.article)
    .bind(&input.image)
    .bind(is_draft)
    .bind(is_published)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update post")?;

    get_post_by_id_mysql(pool, id)
        .await?
        .context("Post not found after update")
}

async fn list_posts_mysql(
    pool: &MySqlPool,
    filter: &PostFilter,
    offset: i64,
    limit: i64,
) -> Result<Vec<Post>> {
    let parts = filter_sql(filter);
    let sql = format!(
        "SELECT {} FROM posts WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
        POST_COLUMNS, parts.where_clause, parts.order_by
    );

    let mut query = sqlx::query(&sql);
    if let Some(author_id) = parts.author_id {
        query = query.bind(author_id);
    }
    if let Some(pattern) = &parts.pattern {
        query = query.bind(pattern).bind(pattern).bind(pattern);
    }

    let rows = query
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    rows.iter().map(row_to_post_mysql).collect()
}

async fn count_posts_mysql(pool: &MySqlPool, filter: &PostFilter) -> Result<i64> {
    let parts = filter_sql(filter);
    let sql = format!("SELECT COUNT(*) AS count FROM posts WHERE {}", parts.where_clause);

    let mut query = sqlx::query(&sql);
    if let Some(author_id) = parts.author_id {
        query = query.bind(author_id);
    }
    if let Some(pattern) = &parts.pattern {
        query = query.bind(pattern).bind(pattern).bind(pattern);
    }

    let row = query
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;
    Ok(row.get("count"))
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Post> {
    Ok(Post {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        epigraph: row.get("epigraph"),
        article: row.get("article"),
        image: row.get("image"),
        author_id: row.get("author_id"),
        editor_id: row.get("editor_id"),
        is_draft: row.get("is_draft"),
        is_published: row.get("is_published"),
        is_pinned: row.get("is_pinned"),
        time_create: row.get("time_create"),
        time_update: row.get("time_update"),
    })
}
