//! Comment API endpoints
//!
//! - GET /api/v1/post/{slug}/comments - Visible comments of a published post
//! - POST /api/v1/post/{slug}/comments - Comment as the current user
//! - POST /api/v1/admin/comments/{id}/visibility - Staff hides or shows a comment

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, CurrentUser};
use crate::models::Comment;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/post/{slug}/comments", get(list_comments).post(add_comment))
        .route("/admin/comments/{id}/visibility", post(set_visibility))
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub is_published: bool,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    #[serde(flatten)]
    pub comment: Comment,
    pub preview: String,
}

impl From<Comment> for CommentResponse {
    fn from(comment: Comment) -> Self {
        Self {
            preview: comment.preview(),
            comment,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentListResponse {
    pub comments: Vec<CommentResponse>,
}

/// GET /api/v1/post/{slug}/comments
async fn list_comments(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<CommentListResponse>, ApiError> {
    let comments = state.comment_service.list(&slug).await?;
    Ok(Json(CommentListResponse {
        comments: comments.into_iter().map(Into::into).collect(),
    }))
}

/// POST /api/v1/post/{slug}/comments
async fn add_comment(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(slug): Path<String>,
    Json(body): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    let comment = state
        .comment_service
        .add(caller.user(), &slug, &body.content)
        .await
        .map_err(|e| caller.reject(e))?;
    Ok((StatusCode::CREATED, Json(comment.into())))
}

/// POST /api/v1/admin/comments/{id}/visibility
async fn set_visibility(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<VisibilityRequest>,
) -> Result<Json<CommentResponse>, ApiError> {
    let comment = state
        .comment_service
        .set_visibility(caller.user(), id, body.is_published)
        .await
        .map_err(|e| caller.reject(e))?;
    Ok(Json(comment.into()))
}
