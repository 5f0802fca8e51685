//! Likes.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::debug;

use crate::{
    error::{Error, Result, StoreResultExt},
    store::{Finder, Store, StoreError},
    types::{Article, Like, LikeStatus, User},
};

/// One like per user and article.
#[derive(Debug, Clone)]
pub struct LikeService {
    store: Arc<Store>,
}

impl LikeService {
    #[must_use]
    pub const fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn ensure_parties(&self, user_id: u64, article_id: u64) -> Result<()> {
        let _: User = self.store.find(user_id).during("find", "user")?;
        let _: Article = self.store.find(article_id).during("find", "article")?;
        Ok(())
    }

    /// Like an article and return its new like count.
    ///
    /// # Errors
    /// [`Error::Conflict`] if the user already likes it.
    pub fn like(&self, user_id: u64, article_id: u64) -> Result<u64> {
        self.ensure_parties(user_id, article_id)?;
        let like = Like {
            user_id,
            article_id,
            created_at: OffsetDateTime::now_utc(),
        };
        match self.store.add_like(like) {
            Ok(count) => {
                debug!(user = user_id, article = article_id, count, "liked");
                Ok(count)
            }
            Err(StoreError::Duplicate { .. }) => Err(Error::conflict("article already liked")),
            Err(err) => Err(err.during("create", "like")),
        }
    }

    /// Take a like back and return the new like count.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the user does not like the article.
    pub fn unlike(&self, user_id: u64, article_id: u64) -> Result<u64> {
        self.ensure_parties(user_id, article_id)?;
        let count = self
            .store
            .remove_like(user_id, article_id)
            .during("delete", "like")?;
        debug!(user = user_id, article = article_id, count, "unliked");
        Ok(count)
    }

    /// Flip the like; returns whether the article is liked afterwards.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown users or articles.
    pub fn toggle(&self, user_id: u64, article_id: u64) -> Result<bool> {
        if self.is_liked(user_id, article_id)? {
            self.unlike(user_id, article_id)?;
            Ok(false)
        } else {
            self.like(user_id, article_id)?;
            Ok(true)
        }
    }

    /// # Errors
    /// Store failures only.
    pub fn is_liked(&self, user_id: u64, article_id: u64) -> Result<bool> {
        self.store
            .like_exists(user_id, article_id)
            .during("find", "like")
    }

    /// # Errors
    /// Store failures only.
    pub fn count(&self, article_id: u64) -> Result<u64> {
        self.store.count_likes(article_id).during("count", "like")
    }

    /// Like count plus whether `viewer` likes the article. Anonymous viewers
    /// never do.
    ///
    /// # Errors
    /// Store failures only.
    pub fn status(&self, article_id: u64, viewer: Option<u64>) -> Result<LikeStatus> {
        let liked = match viewer {
            Some(user_id) => self.is_liked(user_id, article_id)?,
            None => false,
        };
        Ok(LikeStatus {
            article_id,
            count: self.count(article_id)?,
            liked,
        })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::{ErrorKind, store::Creator};

    fn setup() -> (LikeService, Arc<Store>, u64, u64) {
        let store = Arc::new(Store::in_memory().unwrap());
        let at = datetime!(2024-01-01 0:00 UTC);
        let user: User = store.create(User::new("reader", "r@x.io", "h", at)).unwrap();
        let article: Article = store
            .create(Article::draft(user.id, "Post", "post", "body", at))
            .unwrap();
        (LikeService::new(Arc::clone(&store)), store, user.id, article.id)
    }

    #[test]
    fn liking_twice_conflicts() {
        let (service, store, user, article) = setup();
        assert_eq!(service.like(user, article).unwrap(), 1);
        assert_eq!(service.like(user, article).unwrap_err().kind(), ErrorKind::Conflict);
        let stored: Article = store.find(article).unwrap();
        assert_eq!(stored.like_count, 1);
    }

    #[test]
    fn unliking_without_a_like_is_not_found() {
        let (service, _, user, article) = setup();
        assert_eq!(service.unlike(user, article).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn toggle_flips_and_status_follows() {
        let (service, _, user, article) = setup();
        assert!(service.toggle(user, article).unwrap());
        assert_eq!(
            service.status(article, Some(user)).unwrap(),
            LikeStatus { article_id: article, count: 1, liked: true }
        );
        assert!(!service.status(article, None).unwrap().liked);
        assert!(!service.toggle(user, article).unwrap());
        assert_eq!(service.count(article).unwrap(), 0);
    }

    #[test]
    fn unknown_article_is_not_found() {
        let (service, _, user, _) = setup();
        assert_eq!(service.like(user, 77).unwrap_err().kind(), ErrorKind::NotFound);
    }
}
