//! Comments and likes.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::user::UserProfile;

/// A comment on an article, possibly a reply to another comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub article_id: u64,
    pub user_id: u64,
    pub content: String,
    pub parent_id: Option<u64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "crate::types::timestamp")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl Comment {
    #[must_use]
    pub fn new(
        article_id: u64,
        user_id: u64,
        content: impl Into<String>,
        parent_id: Option<u64>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: 0,
            article_id,
            user_id,
            content: content.into(),
            parent_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// A comment with its author and direct replies, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Option<UserProfile>,
    pub replies: Vec<CommentThread>,
}

/// A user's like on an article. One per `(user_id, article_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub user_id: u64,
    pub article_id: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Like count of an article and whether the viewer likes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeStatus {
    pub article_id: u64,
    pub count: u64,
    pub liked: bool,
}
