//! Articles, their lifecycle and the listing filter.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    error::Error,
    ranking::{Engagement, Snapshot},
    types::{category::Category, tag::Tag, user::UserProfile},
};

/// Lifecycle state of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl ArticleStatus {
    pub const ALL: [Self; 3] = [Self::Draft, Self::Published, Self::Archived];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| Error::validation("status must be one of: draft, published, archived"))
    }
}

/// A stored article.
///
/// Counters only move through the store's atomic increment, never by writing this
/// struct back with a modified count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: u64,
    pub title: String,
    pub slug: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    pub status: ArticleStatus,
    pub author_id: u64,
    pub category_id: Option<u64>,
    #[serde(default)]
    pub tag_ids: Vec<u64>,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    #[serde(default, with = "crate::types::timestamp")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "crate::types::timestamp")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl Article {
    /// A fresh draft owned by `author_id`; the store assigns the id.
    #[must_use]
    pub fn draft(
        author_id: u64,
        title: impl Into<String>,
        slug: impl Into<String>,
        content: impl Into<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: 0,
            title: title.into(),
            slug: slug.into(),
            content: content.into(),
            excerpt: String::new(),
            status: ArticleStatus::Draft,
            author_id,
            category_id: None,
            tag_ids: Vec::new(),
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            published_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Move to `status`, stamping `published_at` the first time the article is
    /// published. The stamp is never cleared or moved afterwards.
    ///
    /// Returns whether the status actually changed.
    pub fn transition(&mut self, status: ArticleStatus, now: OffsetDateTime) -> bool {
        if status == ArticleStatus::Published && self.published_at.is_none() {
            self.published_at = Some(now);
        }
        if self.status == status {
            return false;
        }
        self.status = status;
        true
    }

    /// Published right now.
    #[must_use]
    pub const fn is_published(&self) -> bool {
        matches!(self.status, ArticleStatus::Published)
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    #[must_use]
    pub fn has_tag(&self, tag_id: u64) -> bool {
        self.tag_ids.contains(&tag_id)
    }
}

impl Snapshot for Article {
    fn engagement(&self) -> Engagement {
        Engagement {
            views: self.view_count,
            likes: self.like_count,
            comments: self.comment_count,
        }
    }

    fn published_at(&self) -> Option<OffsetDateTime> {
        self.published_at
    }
}

/// Conjunctive article filter; unset fields accept everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleFilter {
    pub status: Option<ArticleStatus>,
    pub category_id: Option<u64>,
    pub author_id: Option<u64>,
    pub tag_id: Option<u64>,
    #[serde(default, with = "crate::types::timestamp")]
    pub created_from: Option<OffsetDateTime>,
    #[serde(default, with = "crate::types::timestamp")]
    pub created_to: Option<OffsetDateTime>,
}

impl ArticleFilter {
    #[must_use]
    pub fn published() -> Self {
        Self {
            status: Some(ArticleStatus::Published),
            ..Self::default()
        }
    }

    /// Whether `article` passes every set field.
    #[must_use]
    pub fn matches(&self, article: &Article) -> bool {
        self.status.is_none_or(|status| article.status == status)
            && self
                .category_id
                .is_none_or(|id| article.category_id == Some(id))
            && self.author_id.is_none_or(|id| article.author_id == id)
            && self.tag_id.is_none_or(|id| article.has_tag(id))
            && self
                .created_from
                .is_none_or(|from| article.created_at >= from)
            && self.created_to.is_none_or(|to| article.created_at <= to)
    }
}

/// An article with its author, category and tags resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleDetail {
    #[serde(flatten)]
    pub article: Article,
    pub author: UserProfile,
    pub category: Option<Category>,
    pub tags: Vec<Tag>,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn sample() -> Article {
        Article::draft(1, "Hello", "hello", "body", datetime!(2024-01-01 0:00 UTC))
    }

    #[test]
    fn parses_known_statuses_only() {
        assert_eq!("archived".parse::<ArticleStatus>().unwrap(), ArticleStatus::Archived);
        assert!("Published".parse::<ArticleStatus>().is_err());
        assert!("".parse::<ArticleStatus>().is_err());
    }

    #[test]
    fn publishing_stamps_once() {
        let mut article = sample();
        let first = datetime!(2024-02-01 10:00 UTC);
        assert!(article.transition(ArticleStatus::Published, first));
        assert_eq!(article.published_at, Some(first));

        assert!(article.transition(ArticleStatus::Archived, datetime!(2024-03-01 0:00 UTC)));
        assert_eq!(article.published_at, Some(first));

        assert!(article.transition(ArticleStatus::Published, datetime!(2024-04-01 0:00 UTC)));
        assert_eq!(article.published_at, Some(first));
    }

    #[test]
    fn filters_are_conjunctive() {
        let mut article = sample();
        article.category_id = Some(4);
        article.tag_ids = vec![2, 9];

        assert!(ArticleFilter::default().matches(&article));
        let filter = ArticleFilter {
            category_id: Some(4),
            tag_id: Some(9),
            ..ArticleFilter::default()
        };
        assert!(filter.matches(&article));
        let filter = ArticleFilter {
            tag_id: Some(9),
            author_id: Some(2),
            ..ArticleFilter::default()
        };
        assert!(!filter.matches(&article));
        assert!(!ArticleFilter::published().matches(&article));
    }

    #[test]
    fn same_status_is_not_a_change() {
        let mut article = sample();
        assert!(!article.transition(ArticleStatus::Draft, datetime!(2024-02-01 0:00 UTC)));
        assert_eq!(article.published_at, None);
    }
}
