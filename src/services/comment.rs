//! Comment service
//!
//! Readers comment on published posts; staff can hide a comment without
//! deleting it.

use crate::db::repositories::{CommentRepository, PostRepository};
use crate::models::{Comment, CreateCommentInput, Post, PostStatus, User};
use crate::services::access::{require_login, require_staff, Denied};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Login required")]
    LoginRequired,

    #[error("Permission denied")]
    Forbidden,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<Denied> for CommentServiceError {
    fn from(denied: Denied) -> Self {
        match denied {
            Denied::LoginRequired => CommentServiceError::LoginRequired,
            Denied::Forbidden => CommentServiceError::Forbidden,
        }
    }
}

pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    posts: Arc<dyn PostRepository>,
}

impl CommentService {
    pub fn new(comments: Arc<dyn CommentRepository>, posts: Arc<dyn PostRepository>) -> Self {
        Self { comments, posts }
    }

    /// Visible comments of a published post, oldest first
    pub async fn list(&self, slug: &str) -> Result<Vec<Comment>, CommentServiceError> {
        let post = self.published_post(slug).await?;
        Ok(self.comments.list_published_by_post(post.id).await?)
    }

    /// Comment on a published post as the caller
    pub async fn add(
        &self,
        user: Option<&User>,
        slug: &str,
        content: &str,
    ) -> Result<Comment, CommentServiceError> {
        require_login(user).into_result()?;
        let author = user.ok_or(CommentServiceError::LoginRequired)?;
        let post = self.published_post(slug).await?;

        let content = content.trim();
        if content.is_empty() {
            return Err(CommentServiceError::ValidationError(
                "Comment cannot be empty".into(),
            ));
        }

        let comment = self
            .comments
            .create(&CreateCommentInput {
                post_id: post.id,
                author_id: author.id,
                content: content.to_string(),
            })
            .await?;

        tracing::info!(comment_id = comment.id, post_id = post.id, "Comment added");
        Ok(comment)
    }

    /// Hide or show a comment
    pub async fn set_visibility(
        &self,
        user: Option<&User>,
        comment_id: i64,
        published: bool,
    ) -> Result<Comment, CommentServiceError> {
        require_staff(user).into_result()?;

        if !self.comments.set_published(comment_id, published).await? {
            return Err(CommentServiceError::NotFound(format!(
                "Comment {} not found",
                comment_id
            )));
        }
        tracing::info!(comment_id, published, "Comment visibility changed");

        self.comments
            .get_by_id(comment_id)
            .await?
            .ok_or_else(|| CommentServiceError::NotFound(format!("Comment {} not found", comment_id)))
    }

    async fn published_post(&self, slug: &str) -> Result<Post, CommentServiceError> {
        match self.posts.get_by_slug(slug).await? {
            Some(post) if post.status() == PostStatus::Published => Ok(post),
            _ => Err(CommentServiceError::NotFound(format!("Post {} not found", slug))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxCommentRepository, SqlxPostRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::CreatePostInput;
    use crate::services::access::fixtures::{role_user, ROLES};

    async fn setup() -> (CommentService, Post, Post) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        for role in ROLES {
            users.create(&role_user(role)).await.unwrap();
        }

        let posts = SqlxPostRepository::boxed(pool.clone());
        let mut created = Vec::new();
        for (title, status) in [("Open", PostStatus::Published), ("Pending", PostStatus::Unpublished)] {
            let post = posts
                .create(&CreatePostInput {
                    title: title.into(),
                    slug: title.to_lowercase(),
                    epigraph: String::new(),
                    article: "body".into(),
                    image: None,
                    author_id: role_user("author").id,
                    status,
                })
                .await
                .unwrap();
            created.push(post);
        }
        let pending = created.pop().unwrap();
        let open = created.pop().unwrap();

        let service = CommentService::new(SqlxCommentRepository::boxed(pool), posts);
        (service, open, pending)
    }

    #[tokio::test]
    async fn test_add_requires_login() {
        let (service, open, _) = setup().await;
        let result = service.add(None, &open.slug, "hi").await;
        assert!(matches!(result, Err(CommentServiceError::LoginRequired)));

        let comment = service
            .add(Some(&role_user("user")), &open.slug, "  hi there ")
            .await
            .unwrap();
        assert_eq!(comment.content, "hi there");
        assert_eq!(comment.author_username, "user");
    }

    #[tokio::test]
    async fn test_add_needs_published_post_and_content() {
        let (service, open, pending) = setup().await;
        let user = role_user("user");

        let hidden = service.add(Some(&user), &pending.slug, "hi").await;
        assert!(matches!(hidden, Err(CommentServiceError::NotFound(_))));

        let empty = service.add(Some(&user), &open.slug, "   ").await;
        assert!(matches!(empty, Err(CommentServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_staff_hides_comment() {
        let (service, open, _) = setup().await;
        let comment = service
            .add(Some(&role_user("user")), &open.slug, "spam")
            .await
            .unwrap();

        let denied = service
            .set_visibility(Some(&role_user("author")), comment.id, false)
            .await;
        assert!(matches!(denied, Err(CommentServiceError::Forbidden)));

        let hidden = service
            .set_visibility(Some(&role_user("staff")), comment.id, false)
            .await
            .unwrap();
        assert!(!hidden.is_published);
        assert!(service.list(&open.slug).await.unwrap().is_empty());

        service
            .set_visibility(Some(&role_user("admin")), comment.id, true)
            .await
            .unwrap();
        assert_eq!(service.list(&open.slug).await.unwrap().len(), 1);

        let missing = service
            .set_visibility(Some(&role_user("staff")), 999, false)
            .await;
        assert!(matches!(missing, Err(CommentServiceError::NotFound(_))));
    }
}
