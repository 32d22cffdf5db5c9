//! User service
//!
//! Registration with mailed activation links, sessions, author profiles,
//! subscriptions and the feedback form.

use crate::config::AdminConfig;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, UpdateProfileInput, User};
use crate::services::access::{require_author, require_login, Denied};
use crate::services::jobs::{Job, JobQueue};
use crate::services::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::services::signing::{BadSignature, Signer};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

const MAX_USERNAME_LEN: usize = 150;
const MAX_FIRST_NAME_LEN: usize = 150;
const MAX_FEEDBACK_LEN: usize = 5000;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Wrong credentials or an account that is not active yet
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Your account has been banned")]
    Banned,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Login required")]
    LoginRequired,

    #[error("Permission denied")]
    Forbidden,

    #[error("Bad activation signature")]
    BadSignature(#[from] BadSignature),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<Denied> for UserServiceError {
    fn from(denied: Denied) -> Self {
        match denied {
            Denied::LoginRequired => UserServiceError::LoginRequired,
            Denied::Forbidden => UserServiceError::Forbidden,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    /// Username or email
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackInput {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// What following an activation link did
#[derive(Debug)]
pub enum ActivationOutcome {
    /// Activated and logged in
    Activated { user: User, session: Session },
    AlreadyActive,
    /// Banned accounts are never activated
    Banned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
    Unsubscribed,
    NotSubscribed,
}

impl SubscribeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscribeOutcome::Subscribed => "subscribed",
            SubscribeOutcome::AlreadySubscribed => "already_subscribed",
            SubscribeOutcome::Unsubscribed => "unsubscribed",
            SubscribeOutcome::NotSubscribed => "not_subscribed",
        }
    }

    pub fn message(&self, author: &str) -> String {
        match self {
            SubscribeOutcome::Subscribed => format!("You have subscribed to {}", author),
            SubscribeOutcome::AlreadySubscribed => format!("You are already subscribed to {}", author),
            SubscribeOutcome::Unsubscribed => format!("You have unsubscribed from {}", author),
            SubscribeOutcome::NotSubscribed => format!("You are not subscribed to {}", author),
        }
    }
}

/// User service
pub struct UserService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    signer: Signer,
    jobs: JobQueue,
    site_url: String,
    session_days: i64,
    username_re: Regex,
    email_re: Regex,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        signer: Signer,
        jobs: JobQueue,
        site_url: impl Into<String>,
        session_days: i64,
    ) -> Result<Self> {
        Ok(Self {
            users,
            sessions,
            signer,
            jobs,
            site_url: site_url.into(),
            session_days,
            username_re: Regex::new(r"^[\w.@+-]+$").context("Invalid username pattern")?,
            email_re: Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").context("Invalid email pattern")?,
        })
    }

    // ===== Registration =====

    /// Create an inactive account and queue its activation mail
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let username = input.username.trim();
        let email = input.email.trim().to_lowercase();

        if username.is_empty() {
            return Err(UserServiceError::ValidationError("Username cannot be empty".into()));
        }
        if username.chars().count() > MAX_USERNAME_LEN || !self.username_re.is_match(username) {
            return Err(UserServiceError::ValidationError(
                "Username may contain only letters, digits and @/./+/-/_".into(),
            ));
        }
        self.validate_email(&email)?;
        if input.password1 != input.password2 {
            return Err(UserServiceError::ValidationError("Passwords do not match".into()));
        }
        if input.password1.chars().count() < MIN_PASSWORD_LEN {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        if self.users.get_by_username(username).await?.is_some() {
            return Err(UserServiceError::UserExists(format!("Username {} is taken", username)));
        }
        if self.users.get_by_email(&email).await?.is_some() {
            return Err(UserServiceError::UserExists(format!("Email {} is taken", email)));
        }

        let hash = hash_password(&input.password1)?;
        let user = self
            .users
            .create(&User::new(username.to_string(), email, hash))
            .await?;

        self.jobs.enqueue(Job::Activation {
            user_id: user.id,
            link: self.activation_link(&user.username),
        });
        tracing::info!(user_id = user.id, "User registered");

        Ok(user)
    }

    /// `{site_url}/user/activate/{sign}` for this username
    pub fn activation_link(&self, username: &str) -> String {
        format!(
            "{}/user/activate/{}",
            self.site_url.trim_end_matches('/'),
            urlencoding::encode(&self.signer.sign(username))
        )
    }

    /// Follow an activation link. A fresh activation also logs the user in.
    pub async fn activate(&self, sign: &str) -> Result<ActivationOutcome, UserServiceError> {
        let username = self.signer.unsign(sign)?;
        let mut user = self
            .users
            .get_by_username(&username)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(format!("User {} not found", username)))?;

        if user.is_active {
            return Ok(ActivationOutcome::AlreadyActive);
        }
        if !user.activate() {
            tracing::warn!(user_id = user.id, "Activation refused for banned user");
            return Ok(ActivationOutcome::Banned);
        }

        let user = self.users.update(&user).await?;
        let session = self.create_session(user.id).await?;
        tracing::info!(user_id = user.id, "User activated");

        Ok(ActivationOutcome::Activated { user, session })
    }

    // ===== Sessions =====

    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let login = input.login.trim();
        // Usernames may contain `@` too, so a missed email lookup falls through
        let by_email = if login.contains('@') {
            self.users.get_by_email(&login.to_lowercase()).await?
        } else {
            None
        };
        let found = match by_email {
            Some(user) => Some(user),
            None => self.users.get_by_username(login).await?,
        };

        let invalid = || UserServiceError::AuthenticationError("Invalid username or password".into());
        let user = found.ok_or_else(invalid)?;
        if !verify_password(&input.password, &user.password_hash)? {
            return Err(invalid());
        }
        if user.is_banned {
            return Err(UserServiceError::Banned);
        }
        if !user.is_active {
            return Err(UserServiceError::AuthenticationError(
                "Account is not activated".into(),
            ));
        }

        let session = self.create_session(user.id).await?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.sessions
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The user behind a session token, if the session is live.
    ///
    /// Expired sessions are deleted; banned users get no user back.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self.sessions.get_by_id(token).await? {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.sessions.delete(token).await {
                tracing::warn!("Failed to delete expired session: {}", e);
            }
            return Ok(None);
        }

        let user = self.users.get_by_id(session.user_id).await?;
        Ok(user.filter(|u| !u.is_banned))
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        let count = self
            .sessions
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::new(user_id, self.session_days);
        Ok(self.sessions.create(&session).await?)
    }

    // ===== Profiles and subscriptions =====

    /// The caller's own profile, for the author profile form
    pub async fn profile(&self, user: Option<&User>) -> Result<User, UserServiceError> {
        require_author(user).into_result()?;
        user.cloned().ok_or(UserServiceError::LoginRequired)
    }

    /// An author edits their own profile
    pub async fn update_profile(
        &self,
        user: Option<&User>,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        require_author(user).into_result()?;
        let current = user.ok_or(UserServiceError::LoginRequired)?;

        if !input.has_changes() {
            return Ok(current.clone());
        }

        let mut updated = current.clone();
        if let Some(first_name) = input.first_name {
            let first_name = first_name.trim().to_string();
            if first_name.chars().count() > MAX_FIRST_NAME_LEN {
                return Err(UserServiceError::ValidationError(format!(
                    "First name cannot exceed {} characters",
                    MAX_FIRST_NAME_LEN
                )));
            }
            updated.first_name = first_name;
        }
        if let Some(bio) = input.bio {
            updated.bio = bio;
        }
        if let Some(photo) = input.photo {
            updated.photo = Some(photo).filter(|p| !p.trim().is_empty());
        }

        Ok(self.users.update(&updated).await?)
    }

    /// Follow an author. Repeating it is harmless.
    pub async fn subscribe(
        &self,
        user: Option<&User>,
        author_username: &str,
    ) -> Result<SubscribeOutcome, UserServiceError> {
        require_login(user).into_result()?;
        let subscriber = user.ok_or(UserServiceError::LoginRequired)?;

        let author = self
            .users
            .get_by_username(author_username)
            .await?
            .filter(|u| u.is_author)
            .ok_or_else(|| UserServiceError::NotFound(format!("Author {} not found", author_username)))?;

        if author.id == subscriber.id {
            return Err(UserServiceError::ValidationError(
                "You cannot subscribe to yourself".into(),
            ));
        }

        if self.users.subscribe(subscriber.id, author.id).await? {
            tracing::info!(subscriber_id = subscriber.id, author_id = author.id, "Subscribed");
            Ok(SubscribeOutcome::Subscribed)
        } else {
            Ok(SubscribeOutcome::AlreadySubscribed)
        }
    }

    /// Stop following someone. The target only has to exist, so a former
    /// author can still be dropped.
    pub async fn unsubscribe(
        &self,
        user: Option<&User>,
        author_username: &str,
    ) -> Result<SubscribeOutcome, UserServiceError> {
        require_login(user).into_result()?;
        let subscriber = user.ok_or(UserServiceError::LoginRequired)?;

        let author = self
            .users
            .get_by_username(author_username)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(format!("User {} not found", author_username)))?;

        if self.users.unsubscribe(subscriber.id, author.id).await? {
            tracing::info!(subscriber_id = subscriber.id, author_id = author.id, "Unsubscribed");
            Ok(SubscribeOutcome::Unsubscribed)
        } else {
            Ok(SubscribeOutcome::NotSubscribed)
        }
    }

    /// Usernames of the authors the caller follows
    pub async fn subscriptions(&self, user: Option<&User>) -> Result<Vec<String>, UserServiceError> {
        require_login(user).into_result()?;
        let subscriber = user.ok_or(UserServiceError::LoginRequired)?;
        let authors = self.users.list_subscriptions(subscriber.id).await?;
        Ok(authors.into_iter().map(|u| u.username).collect())
    }

    // ===== Misc =====

    /// Queue a message for the site admin
    pub fn feedback(&self, input: FeedbackInput) -> Result<(), UserServiceError> {
        let name = input.name.trim();
        let message = input.message.trim();
        let email = input.email.trim().to_lowercase();

        if name.is_empty() {
            return Err(UserServiceError::ValidationError("Name cannot be empty".into()));
        }
        self.validate_email(&email)?;
        if message.is_empty() {
            return Err(UserServiceError::ValidationError("Message cannot be empty".into()));
        }
        if message.chars().count() > MAX_FEEDBACK_LEN {
            return Err(UserServiceError::ValidationError(format!(
                "Message cannot exceed {} characters",
                MAX_FEEDBACK_LEN
            )));
        }

        self.jobs.enqueue(Job::Feedback {
            name: name.to_string(),
            email,
            message: message.to_string(),
        });
        Ok(())
    }

    /// Create the configured superuser when there are no users yet
    pub async fn ensure_admin(&self, admin: &AdminConfig) -> Result<Option<User>, UserServiceError> {
        if self.users.count().await? > 0 {
            return Ok(None);
        }

        let hash = hash_password(&admin.password)?;
        let user = self
            .users
            .create(&User::new_superuser(
                admin.username.clone(),
                admin.email.trim().to_lowercase(),
                hash,
            ))
            .await?;
        tracing::info!(username = %user.username, "Created initial superuser");
        Ok(Some(user))
    }

    fn validate_email(&self, email: &str) -> Result<(), UserServiceError> {
        if self.email_re.is_match(email) {
            Ok(())
        } else {
            Err(UserServiceError::ValidationError("Enter a valid email address".into()))
        }
    }
}
