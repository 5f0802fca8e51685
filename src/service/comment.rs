//! Threaded comments.

use std::{collections::HashMap, sync::Arc};

use time::OffsetDateTime;
use tracing::info;

use crate::{
    error::{Error, Result, StoreResultExt},
    store::{Finder, Paginator, Store, Updater},
    types::{Article, Comment, CommentThread, User, UserProfile},
    validation::Validator,
};

pub const MIN_CONTENT_LEN: usize = 3;
pub const MAX_CONTENT_LEN: usize = 2000;

/// Comments and their threads. Counters on the article move in the same transaction as the comment.
#[derive(Debug, Clone)]
pub struct CommentService {
    store: Arc<Store>,
}

fn content(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    Validator::length("comment content", trimmed, MIN_CONTENT_LEN, MAX_CONTENT_LEN)?;
    Ok(trimmed.to_string())
}

impl CommentService {
    #[must_use]
    pub const fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Post a comment, optionally as a reply to `parent_id`.
    ///
    /// # Errors
    /// [`Error::NotFound`] for an unknown user, article or parent, and
    /// [`Error::Validation`] when the parent sits under another article.
    pub fn create(
        &self,
        user_id: u64,
        article_id: u64,
        body: &str,
        parent_id: Option<u64>,
    ) -> Result<Comment> {
        let body = content(body)?;
        let _: User = self.store.find(user_id).during("find", "user")?;
        let _: Article = self.store.find(article_id).during("find", "article")?;
        if let Some(parent_id) = parent_id {
            let parent: Comment = self
                .store
                .find(parent_id)
                .during("find", "parent comment")?;
            if parent.article_id != article_id {
                return Err(Error::validation(
                    "parent comment must belong to the same article",
                ));
            }
        }

        let comment = self
            .store
            .add_comment(Comment::new(
                article_id,
                user_id,
                body,
                parent_id,
                OffsetDateTime::now_utc(),
            ))
            .during("create", "comment")?;
        info!(comment = comment.id, article = article_id, "comment posted");
        Ok(comment)
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown or deleted comments.
    pub fn get(&self, id: u64) -> Result<Comment> {
        self.store.find(id).during("find", "comment")
    }

    /// Comments on an article as threads: top-level comments oldest first, each
    /// with its replies nested below, also oldest first.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown articles.
    pub fn threads(&self, article_id: u64) -> Result<Vec<CommentThread>> {
        let _: Article = self.store.find(article_id).during("find", "article")?;
        let mut comments: Vec<Comment> = self
            .store
            .list(|comment: &Comment| comment.article_id == article_id)
            .during("list", "comment")?;
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut user_ids: Vec<u64> = comments.iter().map(|comment| comment.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        let authors: HashMap<u64, UserProfile> = Finder::<User>::find_many(self.store.as_ref(), &user_ids)
            .during("find", "user")?
            .into_iter()
            .map(|user| (user.id, user.profile()))
            .collect();

        let mut children: HashMap<Option<u64>, Vec<Comment>> = HashMap::new();
        for comment in comments {
            children.entry(comment.parent_id).or_default().push(comment);
        }
        Ok(build_threads(None, &mut children, &authors))
    }

    /// # Errors
    /// [`Error::Unauthorized`] unless `user_id` wrote the comment.
    pub fn update(&self, id: u64, user_id: u64, body: &str) -> Result<Comment> {
        let mut comment = self.get(id)?;
        if comment.user_id != user_id {
            return Err(Error::unauthorized("can only update your own comments"));
        }
        comment.content = content(body)?;
        comment.updated_at = OffsetDateTime::now_utc();
        self.store.update(&comment).during("update", "comment")?;
        Ok(comment)
    }

    /// Delete a comment and its replies.
    ///
    /// # Errors
    /// [`Error::Unauthorized`] unless `user_id` wrote the comment.
    pub fn delete(&self, id: u64, user_id: u64) -> Result<()> {
        let comment = self.get(id)?;
        if comment.user_id != user_id {
            return Err(Error::unauthorized("can only delete your own comments"));
        }
        let removed = self
            .store
            .remove_comment(id, OffsetDateTime::now_utc())
            .during("delete", "comment")?;
        info!(comment = id, removed, "comment deleted");
        Ok(())
    }
}

fn build_threads(
    parent: Option<u64>,
    children: &mut HashMap<Option<u64>, Vec<Comment>>,
    authors: &HashMap<u64, UserProfile>,
) -> Vec<CommentThread> {
    let Some(level) = children.remove(&parent) else {
        return Vec::new();
    };
    level
        .into_iter()
        .map(|comment| CommentThread {
            replies: build_threads(Some(comment.id), children, authors),
            author: authors.get(&comment.user_id).cloned(),
            comment,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::{ErrorKind, store::Creator};

    struct Fixture {
        service: CommentService,
        store: Arc<Store>,
        alice: u64,
        bob: u64,
        article: u64,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(Store::in_memory().unwrap());
        let at = datetime!(2024-01-01 0:00 UTC);
        let alice: User = store.create(User::new("alice", "a@x.io", "h", at)).unwrap();
        let bob: User = store.create(User::new("bobby", "b@x.io", "h", at)).unwrap();
        let article: Article = store
            .create(Article::draft(alice.id, "Post", "post", "body", at))
            .unwrap();
        Fixture {
            service: CommentService::new(Arc::clone(&store)),
            store,
            alice: alice.id,
            bob: bob.id,
            article: article.id,
        }
    }

    #[test]
    fn replies_nest_under_their_parent() {
        let f = fixture();
        let root = f.service.create(f.alice, f.article, "first!", None).unwrap();
        let reply = f
            .service
            .create(f.bob, f.article, "  welcome  ", Some(root.id))
            .unwrap();
        assert_eq!(reply.content, "welcome");
        f.service.create(f.alice, f.article, "thanks", Some(reply.id)).unwrap();
        f.service.create(f.bob, f.article, "second", None).unwrap();

        let threads = f.service.threads(f.article).unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].comment.content, "first!");
        assert_eq!(threads[0].replies[0].comment.content, "welcome");
        assert_eq!(threads[0].replies[0].replies[0].comment.content, "thanks");
        assert_eq!(
            threads[0].replies[0].author.as_ref().map(|a| a.username.as_str()),
            Some("bobby")
        );

        let article: Article = f.store.find(f.article).unwrap();
        assert_eq!(article.comment_count, 4);
    }

    #[test]
    fn parent_must_share_the_article() {
        let f = fixture();
        let other: Article = f
            .store
            .create(Article::draft(f.alice, "Other", "other", "body", datetime!(2024-01-01 0:00 UTC)))
            .unwrap();
        let foreign = f.service.create(f.alice, other.id, "elsewhere", None).unwrap();
        let err = f
            .service
            .create(f.bob, f.article, "reply", Some(foreign.id))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            f.service.create(f.bob, f.article, "reply", Some(999)).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn unreadable_parent_is_not_a_missing_parent() {
        let f = fixture();
        let parent = f.service.create(f.alice, f.article, "first!", None).unwrap();
        f.store.corrupt::<Comment>(parent.id);
        let err = f
            .service
            .create(f.bob, f.article, "reply", Some(parent.id))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn content_bounds() {
        let f = fixture();
        assert!(f.service.create(f.alice, f.article, "  hi  ", None).is_err());
        assert!(f.service.create(f.alice, f.article, &"x".repeat(2001), None).is_err());
        assert!(f.service.create(f.alice, f.article, &"x".repeat(2000), None).is_ok());
    }

    #[test]
    fn only_the_author_edits_or_deletes() {
        let f = fixture();
        let comment = f.service.create(f.alice, f.article, "original", None).unwrap();
        assert_eq!(
            f.service.update(comment.id, f.bob, "hijack").unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(f.service.update(comment.id, f.alice, "edited").unwrap().content, "edited");
        assert_eq!(
            f.service.delete(comment.id, f.bob).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
        f.service.delete(comment.id, f.alice).unwrap();
        assert_eq!(f.service.get(comment.id).unwrap_err().kind(), ErrorKind::NotFound);
        let article: Article = f.store.find(f.article).unwrap();
        assert_eq!(article.comment_count, 0);
    }
}
