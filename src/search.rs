//! Query sanitizing, search modes, filtering and suggestions on top of the
//! full-text index.

use std::{
    collections::HashMap,
    str::FromStr,
    sync::{Arc, LazyLock},
    time::Instant,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    error::{Error, Result, StoreResultExt},
    index::{Matching, SearchIndex},
    pagination::{Page, PageRequest},
    ranking::Scored,
    store::{Finder, Paginator, Store},
    types::{Article, ArticleFilter, ArticleStatus, Category, Tag},
};

/// Longest accepted query, in bytes.
pub const MAX_QUERY_LEN: usize = 255;
pub const MAX_SUGGESTIONS: usize = 5;
pub const DEFAULT_TERM_LIMIT: usize = 10;
pub const MAX_TERM_LIMIT: usize = 20;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[^\w\s\-.,!?:;()\[\]"']+"#).expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

const BOOLEAN_OPERATORS: &[char] = &['+', '-', '<', '>', '(', ')', '~', '*', '"'];

/// How query words combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Relevance ranked; any token may match.
    #[default]
    Natural,
    /// Every token must match.
    Boolean,
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "natural" => Ok(Self::Natural),
            "boolean" => Ok(Self::Boolean),
            _ => Err(Error::validation("search mode must be one of: natural, boolean")),
        }
    }
}

/// Query text plus conjunctive filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub status: Option<ArticleStatus>,
    #[serde(default)]
    pub category_id: Option<u64>,
    #[serde(default)]
    pub author_id: Option<u64>,
    #[serde(default)]
    pub tag_id: Option<u64>,
    #[serde(default, with = "crate::types::timestamp")]
    pub date_from: Option<OffsetDateTime>,
    #[serde(default, with = "crate::types::timestamp")]
    pub date_to: Option<OffsetDateTime>,
    #[serde(default)]
    pub mode: SearchMode,
}

impl SearchRequest {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    fn filter(&self) -> ArticleFilter {
        ArticleFilter {
            status: self.status,
            category_id: self.category_id,
            author_id: self.author_id,
            tag_id: self.tag_id,
            created_from: self.date_from,
            created_to: self.date_to,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::validation("search query is required"));
        }
        if self.query.len() > MAX_QUERY_LEN {
            return Err(Error::validation(format!(
                "search query must be at most {MAX_QUERY_LEN} characters"
            )));
        }
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(Error::validation("date_from must be before date_to"));
            }
        }
        Ok(())
    }
}

/// One page of search hits, best first, with timing and fallback suggestions.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub articles: Vec<Scored<Article, f32>>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub query: String,
    pub search_time_ms: u64,
    pub suggestions: Vec<String>,
}

/// Where a suggested term comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TermKind {
    Category,
    Tag,
}

/// A category or tag whose name matches a partial query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermSuggestion {
    pub term: String,
    pub kind: TermKind,
    pub description: String,
}

/// Strip characters with no meaning to the full-text index and normalize
/// whitespace. Returns `None` when nothing searchable is left.
#[must_use]
pub fn sanitize_query(query: &str) -> Option<String> {
    let cleaned = DISALLOWED.replace_all(query, " ");
    let collapsed = WHITESPACE.replace_all(&cleaned, " ");
    let trimmed = collapsed.trim();
    trimmed
        .chars()
        .any(char::is_alphanumeric)
        .then(|| trimmed.to_string())
}

/// Split into tokens with boolean operators trimmed from both ends; empties drop.
#[must_use]
pub fn prepare_boolean_query(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|token| token.trim_matches(BOOLEAN_OPERATORS))
        .filter(|token| !token.is_empty())
        .map(String::from)
        .collect()
}

/// Alternative queries for a search that found nothing.
///
/// With two or more words, each word is dropped in turn. A first word longer than
/// three characters is also offered without its last and without its first
/// character. Duplicates and the query itself are left out.
#[must_use]
pub fn suggestions(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    let mut candidates = Vec::new();

    if words.len() > 1 {
        for skip in 0..words.len() {
            let rest: Vec<&str> = words
                .iter()
                .enumerate()
                .filter(|(index, _)| *index != skip)
                .map(|(_, word)| *word)
                .collect();
            candidates.push(rest.join(" "));
        }
    }

    if let Some(first) = words.first() {
        let chars: Vec<char> = first.chars().collect();
        if chars.len() > 3 {
            candidates.push(chars[..chars.len() - 1].iter().collect());
            candidates.push(chars[1..].iter().collect());
        }
    }

    let mut unique: Vec<String> = Vec::new();
    for candidate in candidates {
        if candidate != lowered && !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique.truncate(MAX_SUGGESTIONS);
    unique
}

/// Full-text search over articles, with store-side filters.
#[derive(Debug, Clone)]
pub struct Searcher {
    store: Arc<Store>,
    index: Arc<SearchIndex>,
}

impl Searcher {
    #[must_use]
    pub const fn new(store: Arc<Store>, index: Arc<SearchIndex>) -> Self {
        Self { store, index }
    }

    /// Run `request` and return one page of matches, best first.
    ///
    /// Matches are ordered by relevance, then newest first. `total` counts every
    /// match that passes the filters.
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty, oversized or unsearchable query and for
    /// an inverted date range.
    pub fn search(&self, request: &SearchRequest, page: PageRequest) -> Result<SearchResponse> {
        let started = Instant::now();
        request.validate()?;
        let query = sanitize_query(&request.query)
            .ok_or_else(|| Error::validation("search query cannot be empty after sanitization"))?;

        let hits = match request.mode {
            SearchMode::Natural => self.index.search(&query, Matching::Any)?,
            SearchMode::Boolean => {
                let tokens = prepare_boolean_query(&query);
                self.index.search(&tokens.join(" "), Matching::All)?
            }
        };

        let ids: Vec<u64> = hits.iter().map(|hit| hit.id).collect();
        let scores: HashMap<u64, f32> = hits.iter().map(|hit| (hit.id, hit.score)).collect();
        let filter = request.filter();
        let articles: Vec<Article> = self.store.find_many(&ids).during("search", "article")?;
        let mut matches: Vec<Scored<Article, f32>> = articles
            .into_iter()
            .filter(|article| filter.matches(article))
            .filter_map(|article| {
                scores.get(&article.id).map(|&score| Scored {
                    score,
                    item: article,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.item.created_at.cmp(&a.item.created_at))
        });

        let page = page.window(matches);
        let suggestions = if page.total == 0 && request.mode == SearchMode::Natural {
            suggestions(&query)
        } else {
            Vec::new()
        };
        let search_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(query, total = page.total, search_time_ms, "search finished");

        Ok(SearchResponse {
            total_pages: page.total_pages(),
            total: page.total,
            page: page.page,
            limit: page.limit,
            articles: page.items,
            query: request.query.clone(),
            search_time_ms,
            suggestions,
        })
    }

    /// Natural-mode search without filters.
    ///
    /// # Errors
    /// Same as [`Searcher::search`].
    pub fn quick_search(&self, query: &str, page: PageRequest) -> Result<SearchResponse> {
        self.search(&SearchRequest::new(query), page)
    }

    /// Categories, then tags, whose name contains `partial` ignoring case.
    /// `limit` outside `1..=20` falls back to 10.
    ///
    /// # Errors
    /// Store failures only.
    pub fn suggest_terms(&self, partial: &str, limit: usize) -> Result<Vec<TermSuggestion>> {
        let limit = if (1..=MAX_TERM_LIMIT).contains(&limit) {
            limit
        } else {
            DEFAULT_TERM_LIMIT
        };
        let needle = partial.to_lowercase();
        let contains = |name: &str| name.to_lowercase().contains(&needle);

        let categories: Vec<Category> = self
            .store
            .list(|category: &Category| contains(&category.name))
            .during("list", "category")?;
        let tags: Vec<Tag> = self
            .store
            .list(|tag: &Tag| contains(&tag.name))
            .during("list", "tag")?;

        Ok(categories
            .into_iter()
            .map(|category| TermSuggestion {
                description: format!("Search in {} category", category.name),
                term: category.name,
                kind: TermKind::Category,
            })
            .chain(tags.into_iter().map(|tag| TermSuggestion {
                description: format!("Search articles tagged with {}", tag.name),
                term: tag.name,
                kind: TermKind::Tag,
            }))
            .take(limit)
            .collect())
    }
}

impl SearchResponse {
    /// The page of articles without scores.
    #[must_use]
    pub fn into_page(self) -> Page<Article> {
        Page {
            items: self.articles.into_iter().map(|scored| scored.item).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("  rust   ownership ", Some("rust ownership"))]
    #[case("c++ & go", Some("c go"))]
    #[case("what's new?", Some("what's new?"))]
    #[case("!!! ??? ...", None)]
    #[case("@#$%^&*", None)]
    #[case("", None)]
    fn sanitizing(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(sanitize_query(input).as_deref(), expected);
    }

    #[test]
    fn boolean_tokens_lose_operators() {
        assert_eq!(
            prepare_boolean_query("+rust -(go) \"exact\" * ~"),
            ["rust", "go", "exact"]
        );
    }

    #[test]
    fn suggestions_drop_words_then_trim_the_first() {
        assert_eq!(
            suggestions("Rusty Borrow Checker"),
            [
                "borrow checker",
                "rusty checker",
                "rusty borrow",
                "rust",
                "usty"
            ]
        );
    }

    #[test]
    fn short_single_words_get_nothing() {
        assert!(suggestions("go").is_empty());
        assert!(suggestions("zig").is_empty());
        assert_eq!(suggestions("tokio"), ["toki", "okio"]);
    }

    #[test]
    fn word_length_counts_characters() {
        assert!(suggestions("été").is_empty());
        assert_eq!(suggestions("café"), ["caf", "afé"]);
    }

    #[test]
    fn suggestions_are_capped() {
        assert_eq!(suggestions("a b c d e f g").len(), MAX_SUGGESTIONS);
    }

    #[test]
    fn request_validation() {
        assert!(SearchRequest::new("   ").validate().is_err());
        assert!(SearchRequest::new("x".repeat(256)).validate().is_err());
        let mut request = SearchRequest::new("rust");
        request.date_from = Some(time::macros::datetime!(2024-02-01 0:00 UTC));
        request.date_to = Some(time::macros::datetime!(2024-01-01 0:00 UTC));
        assert!(request.validate().is_err());
    }

    #[test]
    fn modes_parse_strictly() {
        assert_eq!("boolean".parse::<SearchMode>().unwrap(), SearchMode::Boolean);
        assert!("fuzzy".parse::<SearchMode>().is_err());
    }
}
