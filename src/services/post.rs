//! Post service
//!
//! The editorial workflow: authors write drafts and submit them, staff claim
//! and review submissions, a superuser pins published posts, readers browse.
//!
//! Every guarded operation checks the caller's access before it looks at the
//! post's status. A permitted caller asking for a post in the wrong state gets
//! `NotFound`; an unpermitted caller gets `Forbidden` or `LoginRequired`.

use crate::cache::{view_key, Cache};
use crate::db::repositories::{CommentRepository, PostRepository, UserRepository};
use crate::models::{
    Comment, CreatePostInput, Desk, InvalidTransition, ListParams, PagedResult, Post, PostFilter,
    PostStatus, Transition, UpdatePostInput, User,
};
use crate::services::access::{
    require_author, require_draft_owner, require_staff, require_superuser, Denied,
};
use crate::services::jobs::{Job, JobQueue};
use crate::services::slug::slugify;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Home listings change only on publish or pin, which clear them
const HOME_CACHE_TTL_SECS: u64 = 600;

const CACHE_KEY_HOME: &str = "posts:home:";
const CACHE_PATTERN_POSTS: &str = "posts:*";

pub const MAX_TITLE_LEN: usize = 150;
pub const MAX_EPIGRAPH_LEN: usize = 256;

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    /// Missing, or not in the state the operation works on
    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Login required")]
    LoginRequired,

    #[error("Permission denied")]
    Forbidden,

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Another post has the same title or slug
    #[error("A post with this title already exists: {0}")]
    DuplicateTitle(String),

    #[error("Invalid status change: {0}")]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<Denied> for PostServiceError {
    fn from(denied: Denied) -> Self {
        match denied {
            Denied::LoginRequired => PostServiceError::LoginRequired,
            Denied::Forbidden => PostServiceError::Forbidden,
        }
    }
}

/// The editable fields shared by every post form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostForm {
    pub title: String,
    #[serde(default)]
    pub epigraph: String,
    pub article: String,
    /// Opaque image path; `None` keeps the current one on edit
    #[serde(default)]
    pub image: Option<String>,
}

/// First page of the home listing, with pinned posts on top
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomePage {
    pub pinned: Vec<Post>,
    pub posts: PagedResult<Post>,
}

/// A published post as readers see it
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<Comment>,
    pub views: i64,
}

/// Result of a staff edit, with where the client should go next
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub post: Post,
    pub redirect: String,
}

/// Result of a staff member claiming a post
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorClaim {
    Assigned { slug: String },
    /// The post already has an editor, or is published
    Refused,
}

impl EditorClaim {
    pub fn redirect(&self) -> String {
        match self {
            EditorClaim::Assigned { slug } => format!("/unpublished/{}", slug),
            EditorClaim::Refused => "/unpublished".to_string(),
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            EditorClaim::Assigned { .. } => "You have taken the post for editing.",
            EditorClaim::Refused => "The post already has an editor.",
        }
    }
}

/// One author's published posts
#[derive(Debug, Clone, Serialize)]
pub struct AuthorPosts {
    pub author: User,
    pub posts: PagedResult<Post>,
}

/// Post service
pub struct PostService {
    posts: Arc<dyn PostRepository>,
    users: Arc<dyn UserRepository>,
    comments: Arc<dyn CommentRepository>,
    cache: Arc<Cache>,
    jobs: JobQueue,
    posts_per_page: u32,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        users: Arc<dyn UserRepository>,
        comments: Arc<dyn CommentRepository>,
        cache: Arc<Cache>,
        jobs: JobQueue,
        posts_per_page: u32,
    ) -> Self {
        Self {
            posts,
            users,
            comments,
            cache,
            jobs,
            posts_per_page,
        }
    }

    /// Page parameters for a 1-based page number
    pub fn page(&self, page: u32) -> ListParams {
        ListParams::new(page, self.posts_per_page)
    }

    // ===== Author desk =====

    /// Create a post owned by the caller.
    ///
    /// `is_draft = false` submits it for review right away.
    pub async fn create(
        &self,
        user: Option<&User>,
        form: PostForm,
        is_draft: bool,
    ) -> Result<Post, PostServiceError> {
        require_author(user).into_result()?;
        let author = user.ok_or(PostServiceError::LoginRequired)?;

        let status = if is_draft {
            PostStatus::Draft
        } else {
            PostStatus::Unpublished
        };
        let (form, slug) = self.validate(form, None).await?;

        let post = self
            .posts
            .create(&CreatePostInput {
                title: form.title,
                slug,
                epigraph: form.epigraph,
                article: form.article,
                image: form.image,
                author_id: author.id,
                status,
            })
            .await?;

        tracing::info!(post_id = post.id, author_id = author.id, status = %status, "Post created");
        Ok(post)
    }

    /// The caller's drafts, newest first
    pub async fn list_drafts(
        &self,
        user: Option<&User>,
        params: &ListParams,
    ) -> Result<PagedResult<Post>, PostServiceError> {
        require_author(user).into_result()?;
        let author = user.ok_or(PostServiceError::LoginRequired)?;
        self.list(PostFilter::Drafts { author_id: author.id }, params).await
    }

    pub async fn draft_detail(&self, user: Option<&User>, slug: &str) -> Result<Post, PostServiceError> {
        self.owned_draft(user, slug).await
    }

    /// Save a draft. `is_draft = false` submits it.
    pub async fn edit_draft(
        &self,
        user: Option<&User>,
        slug: &str,
        form: PostForm,
        is_draft: bool,
    ) -> Result<Post, PostServiceError> {
        let post = self.owned_draft(user, slug).await?;

        let target = if is_draft {
            PostStatus::Draft
        } else {
            PostStatus::Unpublished
        };
        let transition = post.status().transition_to(target, Desk::Author)?;
        let (form, new_slug) = self.validate(form, Some(post.id)).await?;

        let updated = self
            .posts
            .update(
                post.id,
                &UpdatePostInput {
                    title: form.title,
                    slug: new_slug,
                    epigraph: form.epigraph,
                    article: form.article,
                    image: form.image,
                    status: target,
                },
            )
            .await?;

        if transition == Some(Transition::Submit) {
            tracing::info!(post_id = updated.id, "Draft submitted for review");
        }
        Ok(updated)
    }

    pub async fn delete_draft(&self, user: Option<&User>, slug: &str) -> Result<(), PostServiceError> {
        let post = self.owned_draft(user, slug).await?;
        self.posts.delete(post.id).await?;
        tracing::info!(post_id = post.id, "Draft deleted");
        Ok(())
    }

    async fn owned_draft(&self, user: Option<&User>, slug: &str) -> Result<Post, PostServiceError> {
        let post = self.find(slug).await?;
        require_draft_owner(user, &post).into_result()?;
        if post.status() != PostStatus::Draft {
            return Err(not_found(slug));
        }
        Ok(post)
    }

    // ===== Review desk =====

    /// Posts waiting for review, most recently updated first
    pub async fn list_unpublished(
        &self,
        user: Option<&User>,
        params: &ListParams,
    ) -> Result<PagedResult<Post>, PostServiceError> {
        require_staff(user).into_result()?;
        self.list(PostFilter::Unpublished, params).await
    }

    pub async fn unpublished_detail(&self, user: Option<&User>, slug: &str) -> Result<Post, PostServiceError> {
        require_staff(user).into_result()?;
        self.unpublished(slug).await
    }

    /// Edit a submitted post and move it with the status form value.
    ///
    /// Returning it to drafts or publishing it queues a mail to the author.
    pub async fn review_edit(
        &self,
        user: Option<&User>,
        slug: &str,
        form: PostForm,
        status: PostStatus,
    ) -> Result<ReviewOutcome, PostServiceError> {
        require_staff(user).into_result()?;
        let post = self.unpublished(slug).await?;

        let transition = post.status().transition_to(status, Desk::Review)?;
        let (form, new_slug) = self.validate(form, Some(post.id)).await?;

        let updated = self
            .posts
            .update(
                post.id,
                &UpdatePostInput {
                    title: form.title,
                    slug: new_slug,
                    epigraph: form.epigraph,
                    article: form.article,
                    image: form.image,
                    status,
                },
            )
            .await?;

        match transition {
            Some(Transition::Return) => {
                tracing::info!(post_id = updated.id, "Post returned to drafts");
                self.jobs.enqueue(Job::PostReturned { post_id: updated.id });
            }
            Some(Transition::Publish) => {
                tracing::info!(post_id = updated.id, "Post published");
                self.jobs.enqueue(Job::PostPublished { post_id: updated.id });
                self.invalidate_listings().await;
            }
            Some(Transition::Submit) | None => {}
        }

        let redirect = match updated.status() {
            PostStatus::Unpublished => format!("/unpublished/{}", updated.slug),
            PostStatus::Draft | PostStatus::Published => "/unpublished".to_string(),
        };
        Ok(ReviewOutcome { post: updated, redirect })
    }

    /// Claim a post for review. The first staff member to ask wins.
    pub async fn set_editor(&self, user: Option<&User>, slug: &str) -> Result<EditorClaim, PostServiceError> {
        require_staff(user).into_result()?;
        let editor = user.ok_or(PostServiceError::LoginRequired)?;
        let post = self.find(slug).await?;

        if self.posts.assign_editor(post.id, editor.id).await? {
            tracing::info!(post_id = post.id, editor_id = editor.id, "Editor assigned");
            Ok(EditorClaim::Assigned { slug: post.slug })
        } else {
            tracing::warn!(post_id = post.id, editor_id = editor.id, "Editor assignment refused");
            Ok(EditorClaim::Refused)
        }
    }

    async fn unpublished(&self, slug: &str) -> Result<Post, PostServiceError> {
        let post = self.find(slug).await?;
        if post.status() != PostStatus::Unpublished {
            return Err(not_found(slug));
        }
        Ok(post)
    }

    // ===== Superuser =====

    /// Pin or unpin a published post
    pub async fn pin(&self, user: Option<&User>, slug: &str, pinned: bool) -> Result<Post, PostServiceError> {
        require_superuser(user).into_result()?;
        let post = self.find(slug).await?;

        if !self.posts.set_pinned(post.id, pinned).await? {
            return Err(not_found(slug));
        }
        self.invalidate_listings().await;
        tracing::info!(post_id = post.id, pinned, "Post pin changed");

        Ok(Post { is_pinned: pinned, ..post })
    }

    // ===== Readers =====

    /// Published posts that are not pinned, plus every pinned one
    pub async fn home(&self, params: &ListParams) -> Result<HomePage, PostServiceError> {
        let key = format!("{}{}:{}", CACHE_KEY_HOME, params.page, params.per_page);
        if let Ok(Some(cached)) = self.cache.get::<HomePage>(&key).await {
            return Ok(cached);
        }

        let posts = self.list(PostFilter::Home, params).await?;
        let pinned = self.posts.list(&PostFilter::Pinned, 0, i64::MAX).await?;
        let page = HomePage { pinned, posts };

        if let Err(e) = self
            .cache
            .set(&key, &page, Duration::from_secs(HOME_CACHE_TTL_SECS))
            .await
        {
            tracing::warn!("Failed to cache home page: {}", e);
        }
        Ok(page)
    }

    /// Published posts containing the keyword. A blank keyword matches nothing.
    pub async fn search(&self, keyword: &str, params: &ListParams) -> Result<PagedResult<Post>, PostServiceError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(PagedResult::new(Vec::new(), 0, params));
        }
        self.list(
            PostFilter::Search {
                keyword: keyword.to_string(),
            },
            params,
        )
        .await
    }

    /// A published post with its visible comments. Counts one view.
    pub async fn detail(&self, slug: &str) -> Result<PostDetail, PostServiceError> {
        let post = self.published(slug).await?;
        let comments = self.comments.list_published_by_post(post.id).await?;

        let views = match self.cache.incr(&view_key(post.id)).await {
            Ok(views) => views,
            Err(e) => {
                tracing::warn!(post_id = post.id, "Failed to count view: {}", e);
                0
            }
        };

        Ok(PostDetail { post, comments, views })
    }

    /// Views counted so far, without counting one
    pub async fn views(&self, post_id: i64) -> Result<i64, PostServiceError> {
        Ok(self.cache.counter(&view_key(post_id)).await?)
    }

    pub async fn author_posts(&self, username: &str, params: &ListParams) -> Result<AuthorPosts, PostServiceError> {
        let author = self
            .users
            .get_by_username(username)
            .await?
            .ok_or_else(|| PostServiceError::NotFound(format!("Author {} not found", username)))?;
        let posts = self.list(PostFilter::ByAuthor { author_id: author.id }, params).await?;
        Ok(AuthorPosts { author, posts })
    }

    /// A published post by slug
    pub async fn published(&self, slug: &str) -> Result<Post, PostServiceError> {
        let post = self.find(slug).await?;
        if post.status() != PostStatus::Published {
            return Err(not_found(slug));
        }
        Ok(post)
    }

    // ===== Helpers =====

    async fn find(&self, slug: &str) -> Result<Post, PostServiceError> {
        self.posts.get_by_slug(slug).await?.ok_or_else(|| not_found(slug))
    }

    async fn list(&self, filter: PostFilter, params: &ListParams) -> Result<PagedResult<Post>, PostServiceError> {
        let items = self.posts.list(&filter, params.offset(), params.limit()).await?;
        let total = self.posts.count(&filter).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Normalize the form, derive the slug and check title uniqueness
    async fn validate(
        &self,
        mut form: PostForm,
        exclude_id: Option<i64>,
    ) -> Result<(PostForm, String), PostServiceError> {
        form.title = form.title.trim().to_string();
        form.epigraph = form.epigraph.trim().to_string();

        if form.title.is_empty() {
            return Err(PostServiceError::ValidationError("Title cannot be empty".into()));
        }
        if form.title.chars().count() > MAX_TITLE_LEN {
            return Err(PostServiceError::ValidationError(format!(
                "Title cannot exceed {} characters",
                MAX_TITLE_LEN
            )));
        }
        if form.epigraph.chars().count() > MAX_EPIGRAPH_LEN {
            return Err(PostServiceError::ValidationError(format!(
                "Epigraph cannot exceed {} characters",
                MAX_EPIGRAPH_LEN
            )));
        }
        if form.article.trim().is_empty() {
            return Err(PostServiceError::ValidationError("Article cannot be empty".into()));
        }

        let slug = slugify(&form.title);
        if slug.is_empty() {
            return Err(PostServiceError::ValidationError(
                "Title must contain at least one letter or digit".into(),
            ));
        }

        if self.posts.exists_title_or_slug(&form.title, &slug, exclude_id).await? {
            return Err(PostServiceError::DuplicateTitle(form.title));
        }
        Ok((form, slug))
    }

    async fn invalidate_listings(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_POSTS).await {
            tracing::warn!("Failed to invalidate post listings: {}", e);
        }
    }
}

fn not_found(slug: &str) -> PostServiceError {
    PostServiceError::NotFound(format!("Post {} not found", slug))
}
