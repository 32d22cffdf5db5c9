//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Characters kept by [`Comment::preview`]
const PREVIEW_LEN: usize = 50;

/// A reader's comment on a post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub post_id: i64,
    pub author_id: i64,
    /// Username of the author, joined in by the repository
    pub author_username: String,
    pub time_create: DateTime<Utc>,
    /// Hidden comments are kept but not listed
    pub is_published: bool,
}

impl Comment {
    /// The first 50 characters, with `...` appended when the cut is full length
    pub fn preview(&self) -> String {
        let cut: String = self.content.chars().take(PREVIEW_LEN).collect();
        if cut.chars().count() == PREVIEW_LEN {
            format!("{}...", cut)
        } else {
            cut
        }
    }
}

/// Input for creating a comment
#[derive(Debug, Clone)]
pub struct CreateCommentInput {
    pub post_id: i64,
    pub author_id: i64,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(content: &str) -> Comment {
        Comment {
            id: 1,
            content: content.to_string(),
            post_id: 1,
            author_id: 1,
            author_username: "reader".to_string(),
            time_create: Utc::now(),
            is_published: true,
        }
    }

    #[test]
    fn test_preview_short_comment_unchanged() {
        assert_eq!(comment("Привет").preview(), "Привет");
    }

    #[test]
    fn test_preview_long_comment_is_cut() {
        let long = "a".repeat(80);
        assert_eq!(comment(&long).preview(), format!("{}...", "a".repeat(50)));
    }

    #[test]
    fn test_preview_exactly_fifty_chars_gets_ellipsis() {
        let exact = "ж".repeat(50);
        assert_eq!(comment(&exact).preview(), format!("{}...", exact));
    }
}
