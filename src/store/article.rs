//! Operations that touch an article together with something else in one
//! transaction: counters, comments, likes, category removal and the monthly
//! archive rollup.

use std::collections::BTreeMap;

use redb::{ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use super::{
    Record, Store, StoreError, decode, encode, insert_in, load_in, release_unique, save_in,
};
use crate::types::{Article, Category, Comment, Like};

/// Likes keyed by `(article_id, user_id)`.
const LIKES: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("likes");

pub(super) fn create_tables(txn: &WriteTransaction) -> Result<(), StoreError> {
    txn.open_table(LIKES)?;
    Ok(())
}

/// Engagement counters kept on an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    View,
    Like,
    Comment,
}

/// Number of published articles in one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u8,
    pub count: u64,
}

/// Add `delta` to one counter of a live article, saturating at zero.
fn bump(
    txn: &WriteTransaction,
    id: u64,
    counter: Counter,
    delta: i64,
) -> Result<u64, StoreError> {
    let mut article = load_in::<Article>(txn, id)?
        .filter(|article| !article.is_deleted())
        .ok_or(StoreError::NotFound)?;
    let slot = match counter {
        Counter::View => &mut article.view_count,
        Counter::Like => &mut article.like_count,
        Counter::Comment => &mut article.comment_count,
    };
    *slot = slot.saturating_add_signed(delta);
    let value = *slot;

    let mut table = txn.open_table(Article::TABLE)?;
    table.insert(id, encode(&article)?.as_slice())?;
    Ok(value)
}

impl Store {
    /// Atomically add `delta` to a counter and return the new value.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the article is missing or soft-deleted.
    pub fn increment(&self, id: u64, counter: Counter, delta: i64) -> Result<u64, StoreError> {
        let txn = self.db.begin_write()?;
        let value = bump(&txn, id, counter, delta)?;
        txn.commit()?;
        Ok(value)
    }

    /// Insert a comment and bump its article's comment counter.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the article is missing or soft-deleted.
    pub fn add_comment(&self, comment: Comment) -> Result<Comment, StoreError> {
        let txn = self.db.begin_write()?;
        bump(&txn, comment.article_id, Counter::Comment, 1)?;
        let comment = insert_in(&txn, comment)?;
        txn.commit()?;
        Ok(comment)
    }

    /// Soft-delete a comment and every reply below it, lowering the article's
    /// comment counter by the number of comments removed.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the comment is missing or already deleted.
    pub fn remove_comment(&self, id: u64, now: OffsetDateTime) -> Result<u64, StoreError> {
        let txn = self.db.begin_write()?;
        let root = load_in::<Comment>(&txn, id)?
            .filter(|comment| !comment.is_deleted())
            .ok_or(StoreError::NotFound)?;

        let siblings: Vec<Comment> = {
            let table = txn.open_table(Comment::TABLE)?;
            let mut comments = Vec::new();
            for entry in table.iter()? {
                let (_, bytes) = entry?;
                let comment: Comment = decode(bytes.value())?;
                if comment.article_id == root.article_id && !comment.is_deleted() {
                    comments.push(comment);
                }
            }
            comments
        };

        let mut doomed = vec![root.id];
        let mut cursor = 0;
        while let Some(&parent) = doomed.get(cursor) {
            doomed.extend(
                siblings
                    .iter()
                    .filter(|comment| comment.parent_id == Some(parent))
                    .map(|comment| comment.id),
            );
            cursor += 1;
        }

        for comment in siblings.iter().filter(|comment| doomed.contains(&comment.id)) {
            let mut comment = comment.clone();
            comment.deleted_at = Some(now);
            save_in(&txn, &comment)?;
        }

        let removed = doomed.len() as u64;
        match bump(&txn, root.article_id, Counter::Comment, -(removed as i64)) {
            Ok(_) | Err(StoreError::NotFound) => {}
            Err(err) => return Err(err),
        }
        txn.commit()?;
        debug!(comment = id, removed, "comments removed");
        Ok(removed)
    }

    /// Record a like and bump the article's like counter.
    ///
    /// # Errors
    /// [`StoreError::Duplicate`] if the user already likes the article,
    /// [`StoreError::NotFound`] if the article is missing or soft-deleted.
    pub fn add_like(&self, like: Like) -> Result<u64, StoreError> {
        let txn = self.db.begin_write()?;
        let key = (like.article_id, like.user_id);
        {
            let table = txn.open_table(LIKES)?;
            if table.get(key)?.is_some() {
                return Err(StoreError::Duplicate {
                    field: "user",
                    value: like.user_id.to_string(),
                });
            }
        }
        let count = bump(&txn, like.article_id, Counter::Like, 1)?;
        {
            let mut table = txn.open_table(LIKES)?;
            table.insert(key, encode(&like)?.as_slice())?;
        }
        txn.commit()?;
        Ok(count)
    }

    /// Drop a like and lower the article's like counter.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the user does not like the article.
    pub fn remove_like(&self, user_id: u64, article_id: u64) -> Result<u64, StoreError> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(LIKES)?;
            table.remove((article_id, user_id))?.is_some()
        };
        if !removed {
            return Err(StoreError::NotFound);
        }
        let count = bump(&txn, article_id, Counter::Like, -1)?;
        txn.commit()?;
        Ok(count)
    }

    /// # Errors
    /// Storage failures only.
    pub fn like_exists(&self, user_id: u64, article_id: u64) -> Result<bool, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(LIKES)?;
        Ok(table.get((article_id, user_id))?.is_some())
    }

    /// # Errors
    /// Storage failures only.
    pub fn count_likes(&self, article_id: u64) -> Result<u64, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(LIKES)?;
        let mut count = 0;
        for entry in table.range((article_id, 0)..=(article_id, u64::MAX))? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Delete a category for good unless a live article is still filed under it.
    /// The check and the removal share one write transaction.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] for unknown categories, [`StoreError::Referenced`]
    /// while articles point at it.
    pub fn remove_category(&self, id: u64) -> Result<Category, StoreError> {
        let txn = self.db.begin_write()?;
        let category = load_in::<Category>(&txn, id)?.ok_or(StoreError::NotFound)?;
        let mut count = 0;
        {
            let table = txn.open_table(Article::TABLE)?;
            for entry in table.iter()? {
                let (_, bytes) = entry?;
                let article: Article = decode(bytes.value())?;
                if !article.is_deleted() && article.category_id == Some(id) {
                    count += 1;
                }
            }
        }
        if count > 0 {
            return Err(StoreError::Referenced {
                entity: Article::ENTITY,
                count,
            });
        }
        release_unique(&txn, &category)?;
        {
            let mut table = txn.open_table(Category::TABLE)?;
            table.remove(id)?;
        }
        txn.commit()?;
        debug!(id, "category removed");
        Ok(category)
    }

    /// Published, live articles grouped by publication month, newest month first.
    ///
    /// # Errors
    /// Storage failures only.
    pub fn archive_buckets(&self) -> Result<Vec<MonthBucket>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Article::TABLE)?;
        let mut months: BTreeMap<(i32, u8), u64> = BTreeMap::new();
        for entry in table.iter()? {
            let (_, bytes) = entry?;
            let article: Article = decode(bytes.value())?;
            if article.is_deleted() || !article.is_published() {
                continue;
            }
            if let Some(published_at) = article.published_at {
                *months
                    .entry((published_at.year(), u8::from(published_at.month())))
                    .or_default() += 1;
            }
        }
        Ok(months
            .into_iter()
            .rev()
            .map(|((year, month), count)| MonthBucket { year, month, count })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::store::{Creator, Finder, Updater};
    use crate::types::ArticleStatus;

    fn seeded() -> (Store, Article) {
        let store = Store::in_memory().unwrap();
        let article = store
            .create(Article::draft(1, "Hi", "hi", "body", datetime!(2024-01-01 0:00 UTC)))
            .unwrap();
        (store, article)
    }

    #[test]
    fn counters_accumulate_and_floor_at_zero() {
        let (store, article) = seeded();
        assert_eq!(store.increment(article.id, Counter::View, 1).unwrap(), 1);
        assert_eq!(store.increment(article.id, Counter::View, 1).unwrap(), 2);
        assert_eq!(store.increment(article.id, Counter::Like, -5).unwrap(), 0);
        let stored: Article = store.find(article.id).unwrap();
        assert_eq!((stored.view_count, stored.like_count), (2, 0));
    }

    #[test]
    fn filed_articles_block_category_removal() {
        let store = Store::in_memory().unwrap();
        let at = datetime!(2024-01-01 0:00 UTC);
        let category: Category = store.create(Category::new("Rust", "rust", "", at)).unwrap();
        let mut filed = Article::draft(1, "Filed", "filed", "body", at);
        filed.category_id = Some(category.id);
        let mut filed: Article = store.create(filed).unwrap();

        assert!(matches!(
            store.remove_category(category.id),
            Err(StoreError::Referenced { count: 1, .. })
        ));
        filed.deleted_at = Some(at);
        store.update(&filed).unwrap();
        assert_eq!(store.remove_category(category.id).unwrap().id, category.id);

        let mut orphan = Article::draft(1, "Orphan", "orphan", "body", at);
        orphan.category_id = Some(category.id);
        assert!(matches!(
            Creator::<Article>::create(&store, orphan),
            Err(StoreError::MissingReference { entity: "category", .. })
        ));
    }

    #[test]
    fn missing_article_cannot_be_counted() {
        let store = Store::in_memory().unwrap();
        assert!(matches!(
            store.increment(42, Counter::View, 1),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn likes_are_unique_per_user() {
        let (store, article) = seeded();
        let like = Like {
            user_id: 7,
            article_id: article.id,
            created_at: datetime!(2024-01-02 0:00 UTC),
        };
        assert_eq!(store.add_like(like).unwrap(), 1);
        assert!(matches!(
            store.add_like(like),
            Err(StoreError::Duplicate { .. })
        ));
        assert!(store.like_exists(7, article.id).unwrap());
        assert_eq!(store.count_likes(article.id).unwrap(), 1);

        assert_eq!(store.remove_like(7, article.id).unwrap(), 0);
        assert!(matches!(
            store.remove_like(7, article.id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn removing_a_comment_takes_its_replies() {
        let (store, article) = seeded();
        let at = datetime!(2024-01-02 0:00 UTC);
        let root = store
            .add_comment(Comment::new(article.id, 1, "root", None, at))
            .unwrap();
        let reply = store
            .add_comment(Comment::new(article.id, 2, "reply", Some(root.id), at))
            .unwrap();
        store
            .add_comment(Comment::new(article.id, 3, "nested", Some(reply.id), at))
            .unwrap();
        store
            .add_comment(Comment::new(article.id, 3, "other", None, at))
            .unwrap();

        assert_eq!(store.remove_comment(root.id, at).unwrap(), 3);
        let stored: Article = store.find(article.id).unwrap();
        assert_eq!(stored.comment_count, 1);
    }

    #[test]
    fn buckets_only_count_published_articles() {
        let store = Store::in_memory().unwrap();
        let months = [
            datetime!(2023-12-05 0:00 UTC),
            datetime!(2023-12-20 0:00 UTC),
            datetime!(2024-01-03 0:00 UTC),
        ];
        for (n, at) in months.into_iter().enumerate() {
            let mut article = Article::draft(1, "t", format!("p-{n}"), "c", at);
            article.transition(ArticleStatus::Published, at);
            let _: Article = store.create(article).unwrap();
        }
        let _: Article = store
            .create(Article::draft(1, "d", "draft", "c", datetime!(2024-01-04 0:00 UTC)))
            .unwrap();

        assert_eq!(
            store.archive_buckets().unwrap(),
            vec![
                MonthBucket { year: 2024, month: 1, count: 1 },
                MonthBucket { year: 2023, month: 12, count: 2 },
            ]
        );
    }
}
