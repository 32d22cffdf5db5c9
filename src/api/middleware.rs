//! API middleware
//!
//! Contains:
//! - Session loading (Bearer token or `session` cookie)
//! - The [`CurrentUser`] extractor handlers use for access checks
//! - [`ApiError`] and the mapping from service errors

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::models::{Session, User};
use crate::services::{
    CommentService, CommentServiceError, PostService, PostServiceError, UserService,
    UserServiceError,
};

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";

const LOGIN_PATH: &str = "/user/login";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub post_service: Arc<PostService>,
    pub comment_service: Arc<CommentService>,
    pub user_service: Arc<UserService>,
}

/// User loaded from a live session by [`load_session`]
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    /// 401 telling the client where to log in before retrying `next`
    pub fn login_required(next: &str) -> Self {
        Self::with_details(
            "UNAUTHORIZED",
            "Login required",
            serde_json::json!({ "login_url": login_url(next) }),
        )
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    /// Logs the cause; the client only sees a generic message
    pub fn internal_error(cause: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", cause);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    fn is_login_required(&self) -> bool {
        self.error.code == "UNAUTHORIZED"
            && self
                .error
                .details
                .as_ref()
                .is_some_and(|d| d.get("login_url").is_some())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "BAD_SIGNATURE" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "USER_BANNED" => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<PostServiceError> for ApiError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::NotFound(msg) => ApiError::not_found(msg),
            PostServiceError::LoginRequired => ApiError::login_required("/"),
            PostServiceError::Forbidden => ApiError::forbidden("Permission denied"),
            PostServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PostServiceError::DuplicateTitle(title) => {
                ApiError::conflict(format!("A post titled \"{}\" already exists", title))
            }
            PostServiceError::InvalidTransition(e) => ApiError::validation_error(e.to_string()),
            PostServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        match err {
            CommentServiceError::NotFound(msg) => ApiError::not_found(msg),
            CommentServiceError::LoginRequired => ApiError::login_required("/"),
            CommentServiceError::Forbidden => ApiError::forbidden("Permission denied"),
            CommentServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CommentServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::Banned => ApiError::new("USER_BANNED", "Your account has been banned"),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound(msg) => ApiError::not_found(msg),
            UserServiceError::LoginRequired => ApiError::login_required("/"),
            UserServiceError::Forbidden => ApiError::forbidden("Permission denied"),
            UserServiceError::BadSignature(_) => {
                ApiError::new("BAD_SIGNATURE", "The activation link is invalid")
            }
            UserServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

/// `/user/login?next=<path>`
pub fn login_url(next: &str) -> String {
    format!(
        "{}?next={}",
        LOGIN_PATH,
        urlencoding::encode(next).replace("%2F", "/")
    )
}

/// Extract session token from request headers.
///
/// A Bearer token wins over the cookie.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie
                    .strip_prefix(SESSION_COOKIE)
                    .and_then(|rest| rest.strip_prefix('='))
                {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Attach the session's user to the request, when there is one.
///
/// Never rejects: anonymous requests pass through and each handler decides.
pub async fn load_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session lookup failed: {}", e),
        }
    }
    next.run(request).await
}

/// The requesting user, if logged in, and the path they asked for
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: Option<User>,
    pub path: String,
}

impl CurrentUser {
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Convert a service error, pointing a login prompt back at this path
    pub fn reject(&self, err: impl Into<ApiError>) -> ApiError {
        let err = err.into();
        if err.is_login_required() {
            ApiError::login_required(&self.path)
        } else {
            err
        }
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentUser {
            user: parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|u| u.0.clone()),
            path: parts.uri.path().to_string(),
        })
    }
}

/// `Set-Cookie` for a fresh session
pub fn session_cookie(session: &Session) -> Result<HeaderValue, ApiError> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        session.id,
        session.max_age()
    );
    HeaderValue::from_str(&cookie).map_err(ApiError::internal_error)
}

/// `Set-Cookie` that removes the session cookie
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
