//! Post model and its editorial status machine
//!
//! A post is stored with two flags, `is_draft` and `is_published`, which
//! together encode exactly one [`PostStatus`]:
//!
//! | is_draft | is_published | status      |
//! |----------|--------------|-------------|
//! | true     | false        | Draft       |
//! | false    | false        | Unpublished |
//! | false    | true         | Published   |
//!
//! Pinning is an independent flag that only matters for published posts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Post entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    /// Title, at most 150 characters
    pub title: String,
    /// Unique URL slug, always derived from the title
    pub slug: String,
    /// Optional short quote shown above the body
    pub epigraph: String,
    /// Body
    pub article: String,
    /// Cover image path
    pub image: Option<String>,
    /// Owner
    pub author_id: i64,
    /// Staff member who claimed the post for review
    pub editor_id: Option<i64>,
    pub is_draft: bool,
    pub is_published: bool,
    pub is_pinned: bool,
    pub time_create: DateTime<Utc>,
    pub time_update: DateTime<Utc>,
}

impl Post {
    /// Current workflow status
    pub fn status(&self) -> PostStatus {
        PostStatus::from_flags(self.is_draft, self.is_published)
    }

    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.author_id == user_id
    }
}

/// Workflow status of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// Visible only to its author
    #[default]
    Draft,
    /// Submitted, waiting for staff review
    Unpublished,
    /// Visible to everyone
    Published,
}

impl PostStatus {
    /// Decode the stored flag pair. A row flagged both draft and published
    /// cannot be written, but if one is read it is treated as a draft.
    pub fn from_flags(is_draft: bool, is_published: bool) -> Self {
        match (is_draft, is_published) {
            (true, _) => PostStatus::Draft,
            (false, false) => PostStatus::Unpublished,
            (false, true) => PostStatus::Published,
        }
    }

    /// Encode as `(is_draft, is_published)`
    pub fn flags(self) -> (bool, bool) {
        match self {
            PostStatus::Draft => (true, false),
            PostStatus::Unpublished => (false, false),
            PostStatus::Published => (false, true),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Unpublished => "unpublished",
            PostStatus::Published => "published",
        }
    }

    /// Value used by the staff edit form's status field
    pub fn form_value(&self) -> &'static str {
        match self {
            PostStatus::Draft => "is_draft",
            PostStatus::Unpublished => "is_unpublished",
            PostStatus::Published => "is_published",
        }
    }

    pub fn from_form_value(value: &str) -> Option<Self> {
        match value {
            "is_draft" => Some(PostStatus::Draft),
            "is_unpublished" => Some(PostStatus::Unpublished),
            "is_published" => Some(PostStatus::Published),
            _ => None,
        }
    }

    /// Check a status change requested from one of the edit forms.
    ///
    /// Returns the transition that happened, `None` when the status is kept.
    pub fn transition_to(self, target: PostStatus, desk: Desk) -> Result<Option<Transition>, InvalidTransition> {
        use PostStatus::*;

        let transition = match (desk, self, target) {
            (Desk::Author, Draft, Draft) => None,
            (Desk::Author, Draft, Unpublished) => Some(Transition::Submit),
            (Desk::Review, Unpublished, Unpublished) => None,
            (Desk::Review, Unpublished, Draft) => Some(Transition::Return),
            (Desk::Review, Unpublished, Published) => Some(Transition::Publish),
            _ => {
                return Err(InvalidTransition {
                    from: self,
                    to: target,
                    desk,
                })
            }
        };
        Ok(transition)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "unpublished" => Ok(PostStatus::Unpublished),
            "published" => Ok(PostStatus::Published),
            _ => Err(format!("Invalid post status: {}", s)),
        }
    }
}

/// Which edit form drives a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Desk {
    /// The author's draft editor (and the create form)
    Author,
    /// The staff editor for submitted posts
    Review,
}

/// A status change that actually moved the post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Draft → Unpublished, by the author
    Submit,
    /// Unpublished → Draft, by staff; the author is told
    Return,
    /// Unpublished → Published, by staff; the author is told
    Publish,
}

impl Transition {
    /// Whether the author gets a mail about this transition
    pub fn notifies_author(self) -> bool {
        matches!(self, Transition::Return | Transition::Publish)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move a post from {from} to {to} from the {desk:?} editor")]
pub struct InvalidTransition {
    pub from: PostStatus,
    pub to: PostStatus,
    pub desk: Desk,
}

/// Input for inserting a post row
#[derive(Debug, Clone)]
pub struct CreatePostInput {
    pub title: String,
    pub slug: String,
    pub epigraph: String,
    pub article: String,
    pub image: Option<String>,
    pub author_id: i64,
    pub status: PostStatus,
}

/// Full replacement of a post's editable fields.
///
/// `image: None` keeps the stored image.
#[derive(Debug, Clone)]
pub struct UpdatePostInput {
    pub title: String,
    pub slug: String,
    pub epigraph: String,
    pub article: String,
    pub image: Option<String>,
    pub status: PostStatus,
}

/// Which posts a listing selects, and in which order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostFilter {
    /// Published and not pinned, newest update first
    Home,
    /// Published and pinned, newest update first
    Pinned,
    /// One author's drafts, newest first
    Drafts { author_id: i64 },
    /// Everything waiting for review, newest update first
    Unpublished,
    /// One author's published posts, newest first
    ByAuthor { author_id: i64 },
    /// Published posts whose title, epigraph or body contains the keyword
    Search { keyword: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_from_flags() {
        assert_eq!(PostStatus::from_flags(true, false), PostStatus::Draft);
        assert_eq!(PostStatus::from_flags(false, false), PostStatus::Unpublished);
        assert_eq!(PostStatus::from_flags(false, true), PostStatus::Published);
        assert_eq!(PostStatus::from_flags(true, true), PostStatus::Draft);
    }

    #[test]
    fn test_form_values() {
        for status in [PostStatus::Draft, PostStatus::Unpublished, PostStatus::Published] {
            assert_eq!(PostStatus::from_form_value(status.form_value()), Some(status));
        }
        assert_eq!(PostStatus::from_form_value("published"), None);
    }

    #[test]
    fn test_author_can_only_keep_or_submit_a_draft() {
        use PostStatus::*;
        assert_eq!(Draft.transition_to(Draft, Desk::Author), Ok(None));
        assert_eq!(Draft.transition_to(Unpublished, Desk::Author), Ok(Some(Transition::Submit)));
        assert!(Draft.transition_to(Published, Desk::Author).is_err());
        assert!(Unpublished.transition_to(Draft, Desk::Author).is_err());
        assert!(Published.transition_to(Draft, Desk::Author).is_err());
    }

    #[test]
    fn test_review_moves_only_unpublished_posts() {
        use PostStatus::*;
        assert_eq!(Unpublished.transition_to(Unpublished, Desk::Review), Ok(None));
        assert_eq!(Unpublished.transition_to(Draft, Desk::Review), Ok(Some(Transition::Return)));
        assert_eq!(Unpublished.transition_to(Published, Desk::Review), Ok(Some(Transition::Publish)));
        assert!(Draft.transition_to(Published, Desk::Review).is_err());
        assert!(Published.transition_to(Draft, Desk::Review).is_err());
        assert!(Published.transition_to(Unpublished, Desk::Review).is_err());
    }

    #[test]
    fn test_only_review_transitions_notify() {
        assert!(!Transition::Submit.notifies_author());
        assert!(Transition::Return.notifies_author());
        assert!(Transition::Publish.notifies_author());
    }

    fn status_strategy() -> impl Strategy<Value = PostStatus> {
        prop_oneof![
            Just(PostStatus::Draft),
            Just(PostStatus::Unpublished),
            Just(PostStatus::Published),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn flags_never_mark_draft_and_published(status in status_strategy()) {
            let (is_draft, is_published) = status.flags();
            prop_assert!(!(is_draft && is_published));
            prop_assert_eq!(PostStatus::from_flags(is_draft, is_published), status);
        }

        #[test]
        fn published_is_terminal(target in status_strategy(), review in any::<bool>()) {
            let desk = if review { Desk::Review } else { Desk::Author };
            prop_assert!(PostStatus::Published.transition_to(target, desk).is_err());
        }
    }
}
