//! Access predicates for the editorial workflow
//!
//! Each predicate looks only at the requesting user (and, for drafts, the
//! post's owner) and answers with an [`Access`]. Views check the predicate
//! first and the post's status second, so a permitted user asking for a post
//! in the wrong state sees a 404 while an unpermitted one sees a 403.

use crate::models::{Post, User};

/// Outcome of an access check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    /// Anonymous request; the client should log in and retry
    LoginRequired,
    Forbidden,
}

impl Access {
    pub fn is_granted(self) -> bool {
        self == Access::Granted
    }

    /// `Ok` when granted, so a check reads `require_author(user).into_result()?`
    pub fn into_result(self) -> Result<(), Denied> {
        match self {
            Access::Granted => Ok(()),
            Access::LoginRequired => Err(Denied::LoginRequired),
            Access::Forbidden => Err(Denied::Forbidden),
        }
    }
}

/// A failed access check; service errors convert from it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    LoginRequired,
    Forbidden,
}

fn require_flag(user: Option<&User>, flag: impl Fn(&User) -> bool) -> Access {
    match user {
        Some(u) if u.is_superuser => Access::Granted,
        None => Access::LoginRequired,
        Some(u) if flag(u) => Access::Granted,
        Some(_) => Access::Forbidden,
    }
}

/// Writing posts, listing drafts, editing the author profile
pub fn require_author(user: Option<&User>) -> Access {
    require_flag(user, |u| u.is_author)
}

/// Reviewing submitted posts
pub fn require_staff(user: Option<&User>) -> Access {
    require_flag(user, |u| u.is_staff)
}

/// Reading, editing or deleting one draft: its owner or a superuser
pub fn require_draft_owner(user: Option<&User>, post: &Post) -> Access {
    require_flag(user, |u| post.is_owned_by(u.id))
}

/// Any logged-in user
pub fn require_login(user: Option<&User>) -> Access {
    require_flag(user, |_| true)
}

/// Pinning posts
pub fn require_superuser(user: Option<&User>) -> Access {
    require_flag(user, |_| false)
}
