//! Popularity and trending scores over article snapshots.
//!
//! Everything here is pure: callers fetch the candidates, these functions score,
//! sort and cut. Rankings are only as complete as the candidate set handed in.

use serde::Serialize;
use time::{Duration, OffsetDateTime};

pub const VIEW_WEIGHT: u64 = 1;
pub const LIKE_WEIGHT: u64 = 3;
pub const COMMENT_WEIGHT: u64 = 5;

/// Trailing window for trending, in days.
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Raw engagement counters of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Engagement {
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

impl Engagement {
    /// `views×1 + likes×3 + comments×5`.
    #[must_use]
    pub const fn popularity(self) -> u64 {
        self.views
            .saturating_mul(VIEW_WEIGHT)
            .saturating_add(self.likes.saturating_mul(LIKE_WEIGHT))
            .saturating_add(self.comments.saturating_mul(COMMENT_WEIGHT))
    }
}

/// What the ranking engine needs to know about an article.
pub trait Snapshot {
    fn engagement(&self) -> Engagement;
    fn published_at(&self) -> Option<OffsetDateTime>;
}

/// A ranked item and the score it was ranked by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scored<T, S> {
    #[serde(flatten)]
    pub item: T,
    pub score: S,
}

/// `1 / (1 + days / window)`: 1 at publication, ½ once a full window has passed.
#[must_use]
pub fn decay_factor(days: f64, window_days: f64) -> f64 {
    1.0 / (1.0 + days / window_days)
}

/// Fractional days between `from` and `to`, clamped at zero.
fn days_between(from: OffsetDateTime, to: OffsetDateTime) -> f64 {
    let elapsed: Duration = to - from;
    (elapsed.as_seconds_f64() / 86_400.0).max(0.0)
}

/// Decayed popularity, or `None` when the snapshot was never published or was
/// published more than `window_days` before `now`.
#[must_use]
pub fn trending_score(snapshot: &impl Snapshot, now: OffsetDateTime, window_days: u32) -> Option<f64> {
    let published_at = snapshot.published_at()?;
    let window = f64::from(window_days.max(1));
    let days = days_between(published_at, now);
    if days > window {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let base = snapshot.engagement().popularity() as f64;
    Some(base * decay_factor(days, window))
}

/// Highest popularity first. Equal scores keep the order they arrived in.
#[must_use]
pub fn rank_popular<T: Snapshot>(candidates: Vec<T>, limit: usize) -> Vec<Scored<T, u64>> {
    let mut ranked: Vec<_> = candidates
        .into_iter()
        .map(|item| Scored {
            score: item.engagement().popularity(),
            item,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked.truncate(limit);
    ranked
}

/// Highest trending score first, over candidates published inside the window.
/// Equal scores keep the order they arrived in.
#[must_use]
pub fn rank_trending<T: Snapshot>(
    candidates: Vec<T>,
    now: OffsetDateTime,
    window_days: u32,
    limit: usize,
) -> Vec<Scored<T, f64>> {
    let mut ranked: Vec<_> = candidates
        .into_iter()
        .filter_map(|item| {
            trending_score(&item, now, window_days).map(|score| Scored { item, score })
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(limit);
    ranked
}
