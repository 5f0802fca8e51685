//! Engagement reports: per article, per author, rankings and periods.

use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    error::{Error, Result, StoreResultExt},
    ranking::{Engagement, Scored, Snapshot, rank_popular, rank_trending},
    store::{Finder, Paginator, Store, newest_first},
    types::{Article, User},
};

pub const DEFAULT_RANKING_LIMIT: usize = 10;

/// Engagement counters of one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleStats {
    pub article_id: u64,
    pub title: String,
    pub slug: String,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "crate::types::timestamp")]
    pub published_at: Option<OffsetDateTime>,
}

impl From<&Article> for ArticleStats {
    fn from(article: &Article) -> Self {
        Self {
            article_id: article.id,
            title: article.title.clone(),
            slug: article.slug.clone(),
            view_count: article.view_count,
            like_count: article.like_count,
            comment_count: article.comment_count,
            created_at: article.created_at,
            published_at: article.published_at,
        }
    }
}

impl Snapshot for ArticleStats {
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

/// Summed engagement over a set of articles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub article_count: u64,
    pub total_views: u64,
    pub total_likes: u64,
    pub total_comments: u64,
}

impl Totals {
    fn add(&mut self, article: &Article) {
        self.article_count += 1;
        self.total_views = self.total_views.saturating_add(article.view_count);
        self.total_likes = self.total_likes.saturating_add(article.like_count);
        self.total_comments = self.total_comments.saturating_add(article.comment_count);
    }
}

/// Totals over everything one author wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthorSummary {
    pub author_id: u64,
    #[serde(flatten)]
    pub totals: Totals,
}

/// Totals over articles published in one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodStats {
    /// `2024-03-15`, `2024-03` or `2024`, depending on the grouping.
    pub period: String,
    #[serde(flatten)]
    pub totals: Totals,
}

/// Grouping for [`StatisticsService::period_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Daily,
    Monthly,
    Yearly,
}

impl Period {
    /// Group key of `at`, in sortable text form.
    #[must_use]
    pub fn key(self, at: OffsetDateTime) -> String {
        let date = at.date();
        match self {
            Self::Daily => format!(
                "{:04}-{:02}-{:02}",
                date.year(),
                u8::from(date.month()),
                date.day()
            ),
            Self::Monthly => format!("{:04}-{:02}", date.year(), u8::from(date.month())),
            Self::Yearly => format!("{:04}", date.year()),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        })
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "daily" => Ok(Self::Daily),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(Error::validation(
                "period must be one of: daily, monthly, yearly",
            )),
        }
    }
}

/// Engagement reports over live articles.
#[derive(Debug, Clone)]
pub struct StatisticsService {
    store: Arc<Store>,
    window_days: u32,
}

impl StatisticsService {
    #[must_use]
    pub const fn new(store: Arc<Store>, window_days: u32) -> Self {
        Self { store, window_days }
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown articles.
    pub fn article_stats(&self, id: u64) -> Result<ArticleStats> {
        let article: Article = self.store.find(id).during("find", "article")?;
        Ok(ArticleStats::from(&article))
    }

    fn by_author(&self, author_id: u64) -> Result<Vec<Article>> {
        let _: User = self.store.find(author_id).during("find", "user")?;
        let mut articles = self
            .store
            .list(|article: &Article| article.author_id == author_id)
            .during("list", "article")?;
        newest_first(&mut articles);
        Ok(articles)
    }

    /// Stats of every article `author_id` wrote, newest first.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown authors.
    pub fn author_stats(&self, author_id: u64) -> Result<Vec<ArticleStats>> {
        Ok(self
            .by_author(author_id)?
            .iter()
            .map(ArticleStats::from)
            .collect())
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown authors.
    pub fn author_summary(&self, author_id: u64) -> Result<AuthorSummary> {
        let mut totals = Totals::default();
        for article in &self.by_author(author_id)? {
            totals.add(article);
        }
        Ok(AuthorSummary { author_id, totals })
    }

    /// The `count` most recently created published articles.
    fn recent_published(&self, count: usize) -> Result<Vec<ArticleStats>> {
        let mut articles: Vec<Article> = self
            .store
            .list(Article::is_published)
            .during("list", "article")?;
        newest_first(&mut articles);
        articles.truncate(count);
        Ok(articles.iter().map(ArticleStats::from).collect())
    }

    /// Most engaging published articles. `limit` 0 means 10.
    ///
    /// Only the `limit × 2` most recent published articles are considered.
    ///
    /// # Errors
    /// Store failures only.
    pub fn popular(&self, limit: usize) -> Result<Vec<Scored<ArticleStats, u64>>> {
        let limit = if limit == 0 { DEFAULT_RANKING_LIMIT } else { limit };
        let candidates = self.recent_published(limit.saturating_mul(2))?;
        debug!(candidates = candidates.len(), limit, "ranking popular articles");
        Ok(rank_popular(candidates, limit))
    }

    /// Published articles ranked by decayed popularity over the last `days`
    /// days. `limit` 0 means 10 and `days` 0 means the configured window.
    ///
    /// Only the `limit × 2` most recent published articles are considered.
    ///
    /// # Errors
    /// Store failures only.
    pub fn trending(&self, limit: usize, days: u32) -> Result<Vec<Scored<ArticleStats, f64>>> {
        let limit = if limit == 0 { DEFAULT_RANKING_LIMIT } else { limit };
        let days = if days == 0 { self.window_days } else { days };
        let candidates = self.recent_published(limit.saturating_mul(2))?;
        debug!(candidates = candidates.len(), limit, days, "ranking trending articles");
        Ok(rank_trending(candidates, OffsetDateTime::now_utc(), days, limit))
    }

    /// Published articles grouped by publication day, month or year, most recent
    /// period first. `limit` 0 keeps every period.
    ///
    /// # Errors
    /// Store failures only.
    pub fn period_stats(&self, period: Period, limit: usize) -> Result<Vec<PeriodStats>> {
        let articles: Vec<Article> = self
            .store
            .list(Article::is_published)
            .during("list", "article")?;
        let mut periods: BTreeMap<String, Totals> = BTreeMap::new();
        for article in &articles {
            if let Some(published_at) = article.published_at {
                periods.entry(period.key(published_at)).or_default().add(article);
            }
        }
        let stats = periods
            .into_iter()
            .rev()
            .map(|(period, totals)| PeriodStats { period, totals });
        Ok(if limit == 0 {
            stats.collect()
        } else {
            stats.take(limit).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use time::{Duration, macros::datetime};

    use super::*;
    use crate::{ErrorKind, store::Creator, types::ArticleStatus};

    struct Fixture {
        service: StatisticsService,
        store: Arc<Store>,
        author: u64,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(Store::in_memory().unwrap());
        let author: User = store
            .create(User::new("writer", "w@x.io", "h", datetime!(2024-01-01 0:00 UTC)))
            .unwrap();
        Fixture {
            service: StatisticsService::new(Arc::clone(&store), 7),
            store,
            author: author.id,
        }
    }

    impl Fixture {
        fn publish(&self, slug: &str, at: OffsetDateTime, views: u64, likes: u64, comments: u64) -> Article {
            let mut article = Article::draft(self.author, slug, slug, "body", at);
            article.transition(ArticleStatus::Published, at);
            article.view_count = views;
            article.like_count = likes;
            article.comment_count = comments;
            self.store.create(article).unwrap()
        }
    }

    #[test]
    fn popular_weights_engagement() {
        let f = fixture();
        let at = datetime!(2024-03-01 0:00 UTC);
        f.publish("viewed", at, 20, 0, 0);
        f.publish("discussed", at + Duration::hours(1), 0, 2, 3);
        let mut draft = Article::draft(f.author, "draft", "draft", "body", at);
        draft.view_count = 1000;
        f.store.create(draft).unwrap();

        let ranked = f.service.popular(0).unwrap();
        let order: Vec<_> = ranked.iter().map(|s| (s.item.slug.as_str(), s.score)).collect();
        assert_eq!(order, [("discussed", 21), ("viewed", 20)]);
    }

    #[test]
    fn trending_prefers_fresh_articles() {
        let f = fixture();
        let now = OffsetDateTime::now_utc();
        f.publish("fresh", now - Duration::hours(1), 10, 0, 0);
        f.publish("week-old", now - Duration::days(6), 12, 0, 0);
        f.publish("stale", now - Duration::days(30), 500, 0, 0);

        let ranked = f.service.trending(5, 0).unwrap();
        let slugs: Vec<_> = ranked.iter().map(|s| s.item.slug.as_str()).collect();
        assert_eq!(slugs, ["fresh", "week-old"]);
        assert!(f.service.trending(5, 60).unwrap().iter().any(|s| s.item.slug == "stale"));
    }

    #[rstest]
    #[case(Period::Daily, &["2024-02-10", "2024-02-03", "2023-12-31"])]
    #[case(Period::Monthly, &["2024-02", "2023-12"])]
    #[case(Period::Yearly, &["2024", "2023"])]
    fn groups_by_period(#[case] period: Period, #[case] expected: &[&str]) {
        let f = fixture();
        f.publish("a", datetime!(2023-12-31 23:00 UTC), 1, 0, 0);
        f.publish("b", datetime!(2024-02-03 10:00 UTC), 2, 1, 0);
        f.publish("c", datetime!(2024-02-10 10:00 UTC), 4, 0, 1);

        let stats = f.service.period_stats(period, 0).unwrap();
        let keys: Vec<_> = stats.iter().map(|s| s.period.as_str()).collect();
        assert_eq!(keys, expected);
        let total: u64 = stats.iter().map(|s| s.totals.article_count).sum();
        assert_eq!(total, 3);
        assert_eq!(f.service.period_stats(period, 1).unwrap().len(), 1);
    }

    #[test]
    fn author_summary_adds_up() {
        let f = fixture();
        f.publish("one", datetime!(2024-01-02 0:00 UTC), 3, 1, 1);
        f.publish("two", datetime!(2024-01-03 0:00 UTC), 5, 2, 0);
        let summary = f.service.author_summary(f.author).unwrap();
        assert_eq!(
            summary.totals,
            Totals { article_count: 2, total_views: 8, total_likes: 3, total_comments: 1 }
        );
        let stats = f.service.author_stats(f.author).unwrap();
        assert_eq!(stats[0].slug, "two");
        assert_eq!(f.service.author_summary(99).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn unknown_periods_are_rejected() {
        assert_eq!("weekly".parse::<Period>().unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!("monthly".parse::<Period>().unwrap(), Period::Monthly);
    }
}
