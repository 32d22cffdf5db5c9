//! User API endpoints
//!
//! - POST /api/v1/user/register - Register; the account stays inactive
//! - GET /api/v1/user/activate/{sign} - Follow an activation link
//! - POST /api/v1/user/login - Log in by username or email
//! - POST /api/v1/user/logout - Log out
//! - GET /api/v1/user/me - Current user
//! - GET /api/v1/user/author/{username} - An author's published posts
//! - GET, POST /api/v1/user/profile - Author profile
//! - POST /api/v1/user/subscribe/{author_username} - Follow an author
//! - POST /api/v1/user/unsubscribe/{author_username} - Stop following
//! - GET /api/v1/user/subscriptions - Followed authors
//! - POST /api/v1/feedback - Message the site admin

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::common::{MessageResponse, PageQuery, PageResponse};
use crate::api::middleware::{
    clear_session_cookie, extract_session_token, session_cookie, ApiError, AppState, CurrentUser,
};
use crate::models::{Post, UpdateProfileInput, User};
use crate::services::{ActivationOutcome, FeedbackInput, LoginInput, RegisterInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/register", post(register))
        .route("/user/activate/{sign}", get(activate))
        .route("/user/login", post(login))
        .route("/user/logout", post(logout))
        .route("/user/me", get(me))
        .route("/user/author/{username}", get(author_posts))
        .route("/user/profile", get(profile).post(update_profile))
        .route("/user/subscribe/{author_username}", post(subscribe))
        .route("/user/unsubscribe/{author_username}", post(unsubscribe))
        .route("/user/subscriptions", get(subscriptions))
        .route("/feedback", post(feedback))
}

/// Public face of an author
#[derive(Debug, Serialize)]
pub struct AuthorResponse {
    pub username: String,
    pub first_name: String,
    pub bio: String,
    pub photo: Option<String>,
}

impl From<User> for AuthorResponse {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            first_name: user.first_name,
            bio: user.bio,
            photo: user.photo,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ActivationResponse {
    /// `activated`, `already_active` or `banned`
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

#[derive(Debug, Serialize)]
pub struct AuthorPostsResponse {
    pub author: AuthorResponse,
    pub posts: PageResponse<Post>,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    /// `subscribed`, `already_subscribed`, `unsubscribed` or `not_subscribed`
    pub outcome: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionsResponse {
    pub subscriptions: Vec<String>,
}

/// POST /api/v1/user/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let user = state.user_service.register(body).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: format!(
                "An activation link has been sent to {}",
                user.email
            ),
            user,
        }),
    ))
}

/// GET /api/v1/user/activate/{sign}
async fn activate(
    State(state): State<AppState>,
    Path(sign): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let mut headers = HeaderMap::new();
    let response = match state.user_service.activate(&sign).await? {
        ActivationOutcome::Activated { user, session } => {
            headers.insert(header::SET_COOKIE, session_cookie(&session)?);
            ActivationResponse {
                outcome: "activated",
                user: Some(user),
            }
        }
        ActivationOutcome::AlreadyActive => ActivationResponse {
            outcome: "already_active",
            user: None,
        },
        ActivationOutcome::Banned => ActivationResponse {
            outcome: "banned",
            user: None,
        },
    };
    Ok((headers, Json(response)))
}

/// POST /api/v1/user/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, session) = state.user_service.login(body).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie(&session)?);
    Ok((
        headers,
        Json(AuthResponse {
            user,
            token: session.id,
        }),
    ))
}

/// POST /api/v1/user/logout
async fn logout(
    State(state): State<AppState>,
    request_headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = extract_session_token(&request_headers) {
        state.user_service.logout(&token).await?;
    }

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, clear_session_cookie());
    Ok((headers, Json(MessageResponse::new("Logged out"))))
}

/// GET /api/v1/user/me
async fn me(caller: CurrentUser) -> Result<Json<User>, ApiError> {
    match caller.user {
        Some(user) => Ok(Json(user)),
        None => Err(ApiError::login_required(&caller.path)),
    }
}

/// GET /api/v1/user/author/{username}
async fn author_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<AuthorPostsResponse>, ApiError> {
    let params = state.post_service.page(query.page);
    let found = state.post_service.author_posts(&username, &params).await?;
    Ok(Json(AuthorPostsResponse {
        author: found.author.into(),
        posts: found.posts.into(),
    }))
}

/// GET /api/v1/user/profile
async fn profile(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> Result<Json<User>, ApiError> {
    let user = state
        .user_service
        .profile(caller.user())
        .await
        .map_err(|e| caller.reject(e))?;
    Ok(Json(user))
}

/// POST /api/v1/user/profile
async fn update_profile(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .user_service
        .update_profile(caller.user(), body)
        .await
        .map_err(|e| caller.reject(e))?;
    Ok(Json(user))
}

/// POST /api/v1/user/subscribe/{author_username}
async fn subscribe(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(author_username): Path<String>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    let outcome = state
        .user_service
        .subscribe(caller.user(), &author_username)
        .await
        .map_err(|e| caller.reject(e))?;

    Ok(Json(SubscribeResponse {
        outcome: outcome.as_str(),
        message: outcome.message(&author_username),
    }))
}

/// POST /api/v1/user/unsubscribe/{author_username}
async fn unsubscribe(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(author_username): Path<String>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    let outcome = state
        .user_service
        .unsubscribe(caller.user(), &author_username)
        .await
        .map_err(|e| caller.reject(e))?;

    Ok(Json(SubscribeResponse {
        outcome: outcome.as_str(),
        message: outcome.message(&author_username),
    }))
}

/// GET /api/v1/user/subscriptions
async fn subscriptions(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> Result<Json<SubscriptionsResponse>, ApiError> {
    let subscriptions = state
        .user_service
        .subscriptions(caller.user())
        .await
        .map_err(|e| caller.reject(e))?;
    Ok(Json(SubscriptionsResponse { subscriptions }))
}

/// POST /api/v1/feedback
async fn feedback(
    State(state): State<AppState>,
    Json(body): Json<FeedbackInput>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    state.user_service.feedback(body)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new("Thank you, your message has been sent")),
    ))
}
