//! Post API endpoints
//!
//! Reader routes:
//! - GET /api/v1/ - Home page: published posts plus pinned ones
//! - GET /api/v1/search?q= - Search published posts
//! - GET /api/v1/post/{slug} - Published post with comments
//!
//! Author desk:
//! - POST /api/v1/add - Create a post
//! - GET /api/v1/drafts - Own drafts
//! - GET /api/v1/post/draft/{slug} - Draft detail
//! - GET, POST, DELETE /api/v1/drafts/edit/{slug} - Edit or delete a draft
//!
//! Review desk:
//! - GET /api/v1/unpublished - Submitted posts
//! - POST /api/v1/unpublished/set_editor - Claim a post
//! - GET /api/v1/unpublished/{slug} - Submitted post detail
//! - GET, POST /api/v1/unpublished/edit/{slug} - Edit and move a submitted post
//!
//! - POST /api/v1/admin/pin/{slug} - Pin or unpin a published post

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{default_true, MessageResponse, PageQuery, PageResponse, SearchQuery};
use crate::api::middleware::{ApiError, AppState, CurrentUser};
use crate::models::{Comment, Post, PostStatus};
use crate::services::post::{EditorClaim, ReviewOutcome};
use crate::services::PostForm;

/// Build the post router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/search", get(search))
        .route("/post/{slug}", get(detail))
        .route("/add", post(create))
        .route("/drafts", get(list_drafts))
        .route("/post/draft/{slug}", get(draft_detail))
        .route(
            "/drafts/edit/{slug}",
            get(draft_detail).post(edit_draft).delete(delete_draft),
        )
        .route("/unpublished", get(list_unpublished))
        .route("/unpublished/set_editor", post(set_editor))
        .route("/unpublished/{slug}", get(unpublished_detail))
        .route(
            "/unpublished/edit/{slug}",
            get(unpublished_detail).post(review_edit),
        )
        .route("/admin/pin/{slug}", post(pin))
}

/// Body of the create and draft edit forms
#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    #[serde(flatten)]
    pub form: PostForm,
    /// `false` submits the post for review
    #[serde(default = "default_true")]
    pub is_draft: bool,
}

/// Body of the staff edit form
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    #[serde(flatten)]
    pub form: PostForm,
    /// `is_draft`, `is_unpublished` or `is_published`
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct SetEditorRequest {
    pub post_slug: String,
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    #[serde(default = "default_true")]
    pub pinned: bool,
}

/// A saved post and where the client should go next
#[derive(Debug, Serialize)]
pub struct PostRedirect {
    pub post: Post,
    pub redirect: String,
}

impl From<ReviewOutcome> for PostRedirect {
    fn from(outcome: ReviewOutcome) -> Self {
        Self {
            post: outcome.post,
            redirect: outcome.redirect,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub pinned: Vec<Post>,
    pub posts: PageResponse<Post>,
}

#[derive(Debug, Serialize)]
pub struct PostDetailResponse {
    #[serde(flatten)]
    pub post: Post,
    pub status: PostStatus,
    pub views: i64,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Serialize)]
pub struct SetEditorResponse {
    pub assigned: bool,
    pub message: String,
    pub redirect: String,
}

/// GET /api/v1/
async fn home(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<HomeResponse>, ApiError> {
    let params = state.post_service.page(query.page);
    let home = state.post_service.home(&params).await?;
    Ok(Json(HomeResponse {
        pinned: home.pinned,
        posts: home.posts.into(),
    }))
}

/// GET /api/v1/search?q=&page=
async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<PageResponse<Post>>, ApiError> {
    let params = state.post_service.page(query.page);
    let found = state.post_service.search(&query.q, &params).await?;
    Ok(Json(found.into()))
}

/// GET /api/v1/post/{slug}
async fn detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PostDetailResponse>, ApiError> {
    let detail = state.post_service.detail(&slug).await?;
    Ok(Json(PostDetailResponse {
        status: detail.post.status(),
        post: detail.post,
        views: detail.views,
        comments: detail.comments,
    }))
}

/// POST /api/v1/add
async fn create(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(body): Json<DraftRequest>,
) -> Result<(StatusCode, Json<PostRedirect>), ApiError> {
    let post = state
        .post_service
        .create(caller.user(), body.form, body.is_draft)
        .await
        .map_err(|e| caller.reject(e))?;

    Ok((
        StatusCode::CREATED,
        Json(PostRedirect {
            post,
            redirect: "/drafts".to_string(),
        }),
    ))
}

/// GET /api/v1/drafts
async fn list_drafts(
    State(state): State<AppState>,
    caller: CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<Post>>, ApiError> {
    let params = state.post_service.page(query.page);
    let drafts = state
        .post_service
        .list_drafts(caller.user(), &params)
        .await
        .map_err(|e| caller.reject(e))?;
    Ok(Json(drafts.into()))
}

/// GET /api/v1/post/draft/{slug}
async fn draft_detail(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(slug): Path<String>,
) -> Result<Json<Post>, ApiError> {
    let post = state
        .post_service
        .draft_detail(caller.user(), &slug)
        .await
        .map_err(|e| caller.reject(e))?;
    Ok(Json(post))
}

/// POST /api/v1/drafts/edit/{slug}
async fn edit_draft(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(slug): Path<String>,
    Json(body): Json<DraftRequest>,
) -> Result<Json<PostRedirect>, ApiError> {
    let post = state
        .post_service
        .edit_draft(caller.user(), &slug, body.form, body.is_draft)
        .await
        .map_err(|e| caller.reject(e))?;

    Ok(Json(PostRedirect {
        post,
        redirect: "/drafts".to_string(),
    }))
}

/// DELETE /api/v1/drafts/edit/{slug}
async fn delete_draft(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(slug): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .post_service
        .delete_draft(caller.user(), &slug)
        .await
        .map_err(|e| caller.reject(e))?;
    Ok(Json(MessageResponse::new("Draft deleted")))
}

/// GET /api/v1/unpublished
async fn list_unpublished(
    State(state): State<AppState>,
    caller: CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<Post>>, ApiError> {
    let params = state.post_service.page(query.page);
    let posts = state
        .post_service
        .list_unpublished(caller.user(), &params)
        .await
        .map_err(|e| caller.reject(e))?;
    Ok(Json(posts.into()))
}

/// GET /api/v1/unpublished/{slug}
async fn unpublished_detail(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(slug): Path<String>,
) -> Result<Json<Post>, ApiError> {
    let post = state
        .post_service
        .unpublished_detail(caller.user(), &slug)
        .await
        .map_err(|e| caller.reject(e))?;
    Ok(Json(post))
}

/// POST /api/v1/unpublished/edit/{slug}
async fn review_edit(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(slug): Path<String>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<PostRedirect>, ApiError> {
    let Some(status) = PostStatus::from_form_value(&body.status) else {
        // Access and state are still checked before the form
        state
            .post_service
            .unpublished_detail(caller.user(), &slug)
            .await
            .map_err(|e| caller.reject(e))?;
        return Err(ApiError::validation_error(format!(
            "Unknown status: {}",
            body.status
        )));
    };

    let outcome = state
        .post_service
        .review_edit(caller.user(), &slug, body.form, status)
        .await
        .map_err(|e| caller.reject(e))?;
    Ok(Json(outcome.into()))
}

/// POST /api/v1/unpublished/set_editor
async fn set_editor(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(body): Json<SetEditorRequest>,
) -> Result<Json<SetEditorResponse>, ApiError> {
    let claim = state
        .post_service
        .set_editor(caller.user(), &body.post_slug)
        .await
        .map_err(|e| caller.reject(e))?;

    Ok(Json(SetEditorResponse {
        assigned: matches!(claim, EditorClaim::Assigned { .. }),
        message: claim.message().to_string(),
        redirect: claim.redirect(),
    }))
}

/// POST /api/v1/admin/pin/{slug}
async fn pin(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(slug): Path<String>,
    Json(body): Json<PinRequest>,
) -> Result<Json<Post>, ApiError> {
    let post = state
        .post_service
        .pin(caller.user(), &slug, body.pinned)
        .await
        .map_err(|e| caller.reject(e))?;
    Ok(Json(post))
}
