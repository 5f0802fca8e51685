//! Page requests and result pages.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
/// Largest page a caller may ask for.
pub const MAX_LIMIT: u32 = 100;

/// A validated page window: `page >= 1`, `1 <= limit <= MAX_LIMIT`.
///
/// Deserializing goes through [`PageRequest::new`], so the bounds hold for
/// requests read from JSON or TOML too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPageRequest")]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

#[derive(Deserialize)]
struct RawPageRequest {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_limit")]
    limit: u32,
}

const fn default_page() -> u32 {
    DEFAULT_PAGE
}

const fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl TryFrom<RawPageRequest> for PageRequest {
    type Error = Error;

    fn try_from(raw: RawPageRequest) -> Result<Self> {
        Self::new(raw.page, raw.limit)
    }
}

impl PageRequest {
    /// # Errors
    /// Returns [`Error::Validation`] when `page` is zero or `limit` is outside
    /// `1..=MAX_LIMIT`.
    pub fn new(page: u32, limit: u32) -> Result<Self> {
        if page == 0 {
            return Err(Error::validation("page must be at least 1"));
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(Error::validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        Ok(Self { page, limit })
    }

    /// First page of `limit` items.
    ///
    /// # Errors
    /// Same as [`PageRequest::new`].
    pub fn first(limit: u32) -> Result<Self> {
        Self::new(DEFAULT_PAGE, limit)
    }

    #[must_use]
    pub const fn page(self) -> u32 {
        self.page
    }

    #[must_use]
    pub const fn limit(self) -> u32 {
        self.limit
    }

    /// Items skipped before this page.
    #[must_use]
    pub const fn offset(self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.limit as usize
    }

    /// Cut this page out of the full, already ordered result set.
    #[must_use]
    pub fn window<T>(self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(self.offset())
            .take(self.limit as usize)
            .collect();
        Page {
            items,
            total,
            page: self.page,
            limit: self.limit,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// One page of an ordered result set, with the size of the whole set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        self.total.div_ceil(self.limit as u64)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
        }
    }

    /// Fallible [`Page::map`], stopping at the first error.
    ///
    /// # Errors
    /// Returns whatever `f` returns.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
            page: self.page,
            limit: self.limit,
        })
    }
}
