//! User model
//!
//! Role flags mirror the editorial roles: readers have none, authors write,
//! staff review, superusers pass every check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub bio: String,
    /// Profile picture path
    pub photo: Option<String>,
    /// May write posts
    pub is_author: bool,
    /// May review submitted posts
    pub is_staff: bool,
    /// Passes every permission check
    pub is_superuser: bool,
    /// Set once the activation link is followed
    pub is_active: bool,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A fresh, inactive account without any role.
    ///
    /// The password must already be hashed, see `services::password::hash_password`.
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email,
            password_hash,
            first_name: String::new(),
            bio: String::new(),
            photo: None,
            is_author: false,
            is_staff: false,
            is_superuser: false,
            is_active: false,
            is_banned: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// An active account with every role flag set
    pub fn new_superuser(username: String, email: String, password_hash: String) -> Self {
        Self {
            is_author: true,
            is_staff: true,
            is_superuser: true,
            is_active: true,
            ..Self::new(username, email, password_hash)
        }
    }

    /// Mark the account active; banned accounts stay inactive.
    ///
    /// Returns whether the account is active afterwards.
    pub fn activate(&mut self) -> bool {
        if !self.is_banned {
            self.is_active = true;
        }
        self.is_active
    }

    /// Whether the account may open a session
    pub fn can_login(&self) -> bool {
        self.is_active && !self.is_banned
    }
}

/// Profile fields an author may edit
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub first_name: Option<String>,
    pub bio: Option<String>,
    pub photo: Option<String>,
}

impl UpdateProfileInput {
    pub fn has_changes(&self) -> bool {
        self.first_name.is_some() || self.bio.is_some() || self.photo.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_is_inactive_reader() {
        let user = User::new("reader".into(), "reader@example.com".into(), "hash".into());
        assert!(!user.is_active);
        assert!(!user.is_author && !user.is_staff && !user.is_superuser);
        assert!(!user.can_login());
    }

    #[test]
    fn test_superuser_has_every_flag() {
        let user = User::new_superuser("root".into(), "root@example.com".into(), "hash".into());
        assert!(user.is_active && user.is_author && user.is_staff && user.is_superuser);
        assert!(!user.is_banned);
    }

    #[test]
    fn test_activate_skips_banned_users() {
        let mut user = User::new("troll".into(), "troll@example.com".into(), "hash".into());
        user.is_banned = true;
        assert!(!user.activate());
        assert!(!user.is_active);

        user.is_banned = false;
        assert!(user.activate());
        assert!(user.can_login());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("reader".into(), "reader@example.com".into(), "secret".into());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_profile_input_has_changes() {
        assert!(!UpdateProfileInput::default().has_changes());
        let input = UpdateProfileInput {
            bio: Some("hi".into()),
            ..Default::default()
        };
        assert!(input.has_changes());
    }
}
