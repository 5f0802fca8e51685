//! Categories.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A category groups articles; an article belongs to at most one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Category {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        slug: impl Into<String>,
        description: impl Into<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: 0,
            name: name.into(),
            slug: slug.into(),
            description: description.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A category with the number of live articles filed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub article_count: u64,
}
