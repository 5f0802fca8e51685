//! Tags.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A label attached to articles. Tags are created once and never renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Tag {
    #[must_use]
    pub fn new(name: impl Into<String>, slug: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            id: 0,
            name: name.into(),
            slug: slug.into(),
            created_at: now,
        }
    }
}

/// A tag together with how many live articles carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagUsage {
    #[serde(flatten)]
    pub tag: Tag,
    pub article_count: u64,
}
