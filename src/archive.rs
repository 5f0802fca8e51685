//! Published articles grouped by year and month.

use std::sync::Arc;

use serde::Serialize;
use time::{Month, OffsetDateTime};

use crate::{
    error::{Error, Result, StoreResultExt},
    pagination::{Page, PageRequest},
    store::{MonthBucket, Paginator, Store},
    types::Article,
};

/// Earliest year `articles_in_month` accepts.
pub const MIN_YEAR: i32 = 1900;

/// Published articles in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveMonth {
    pub year: i32,
    pub month: u8,
    pub month_name: String,
    pub count: u64,
}

/// One year of the archive, months newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveYear {
    pub year: i32,
    pub months: Vec<ArchiveMonth>,
    pub total: u64,
}

/// Published articles per year and month, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ArchiveReport {
    pub years: Vec<ArchiveYear>,
    pub total: u64,
}

fn month_name(month: u8) -> String {
    Month::try_from(month).map_or_else(|_| "Unknown".to_string(), |month| month.to_string())
}

impl ArchiveReport {
    /// Nest month buckets under their year, keeping the bucket order.
    ///
    /// Buckets are expected newest month first, as the store returns them.
    #[must_use]
    pub fn from_buckets(buckets: &[MonthBucket]) -> Self {
        let mut report = Self::default();
        for bucket in buckets {
            let entry = ArchiveMonth {
                year: bucket.year,
                month: bucket.month,
                month_name: month_name(bucket.month),
                count: bucket.count,
            };
            match report.years.last_mut() {
                Some(year) if year.year == bucket.year => {
                    year.total += bucket.count;
                    year.months.push(entry);
                }
                _ => report.years.push(ArchiveYear {
                    year: bucket.year,
                    months: vec![entry],
                    total: bucket.count,
                }),
            }
            report.total += bucket.count;
        }
        report
    }

    /// Totals and the busiest year and month; ties go to the most recent.
    #[must_use]
    pub fn statistics(&self) -> ArchiveStatistics {
        let mut most_active_year: Option<&ArchiveYear> = None;
        let mut most_active_month: Option<&ArchiveMonth> = None;
        for year in &self.years {
            if most_active_year.is_none_or(|best| year.total > best.total) {
                most_active_year = Some(year);
            }
            for month in &year.months {
                if most_active_month.is_none_or(|best| month.count > best.count) {
                    most_active_month = Some(month);
                }
            }
        }

        ArchiveStatistics {
            total_articles: self.total,
            total_years: self.years.len(),
            total_months: self.years.iter().map(|year| year.months.len()).sum(),
            most_active_year: most_active_year.map(|year| ActiveYear {
                year: year.year,
                count: year.total,
            }),
            most_active_month: most_active_month.cloned(),
        }
    }
}

/// The year with the most published articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveYear {
    pub year: i32,
    pub count: u64,
}

/// Ties for "most active" go to the most recent period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveStatistics {
    pub total_articles: u64,
    pub total_years: usize,
    pub total_months: usize,
    pub most_active_year: Option<ActiveYear>,
    pub most_active_month: Option<ArchiveMonth>,
}

/// Year and month browsing over published articles.
#[derive(Debug, Clone)]
pub struct Archive {
    store: Arc<Store>,
}

impl Archive {
    #[must_use]
    pub const fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// # Errors
    /// Store failures only.
    pub fn report(&self) -> Result<ArchiveReport> {
        let buckets = self.store.archive_buckets().during("aggregate", "article")?;
        Ok(ArchiveReport::from_buckets(&buckets))
    }

    /// # Errors
    /// Store failures only.
    pub fn statistics(&self) -> Result<ArchiveStatistics> {
        Ok(self.report()?.statistics())
    }

    /// Published articles from one calendar month, newest publication first.
    ///
    /// # Errors
    /// [`Error::Validation`] when `year` is outside `1900..=next year` or `month`
    /// outside `1..=12`.
    pub fn articles_in_month(&self, year: i32, month: u8, page: PageRequest) -> Result<Page<Article>> {
        let latest = OffsetDateTime::now_utc().year() + 1;
        if !(MIN_YEAR..=latest).contains(&year) {
            return Err(Error::validation(format!(
                "year must be between {MIN_YEAR} and {latest}"
            )));
        }
        let month = Month::try_from(month)
            .map_err(|_| Error::validation("month must be between 1 and 12"))?;

        let mut articles: Vec<Article> = self
            .store
            .list(|article: &Article| {
                article.is_published()
                    && article
                        .published_at
                        .is_some_and(|at| at.year() == year && at.month() == month)
            })
            .during("list", "article")?;
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(b.id.cmp(&a.id)));
        Ok(page.window(articles))
    }
}
