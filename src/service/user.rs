//! Profiles.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;

use crate::{
    error::{Error, Result, StoreResultExt},
    pagination::{Page, PageRequest},
    store::{Finder, Paginator, Store, StoreError, Updater},
    types::{Article, User, UserProfile},
    validation::Validator,
};

use super::auth::MAX_EMAIL_LEN;

pub const MAX_AVATAR_LEN: usize = 255;
pub const MAX_BIO_LEN: usize = 500;

/// Partial profile edit; `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
}

/// Profile reads and edits.
#[derive(Debug, Clone)]
pub struct UserService {
    store: Arc<Store>,
    validator: Arc<Validator>,
}

impl UserService {
    #[must_use]
    pub const fn new(store: Arc<Store>, validator: Arc<Validator>) -> Self {
        Self { store, validator }
    }

    fn load(&self, id: u64) -> Result<User> {
        self.store.find(id).during("find", "user")
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown ids.
    pub fn get(&self, id: u64) -> Result<UserProfile> {
        self.load(id).map(UserProfile::from)
    }

    fn validate(&self, update: &ProfileUpdate) -> Result<()> {
        if let Some(username) = &update.username {
            self.validator.check("username", "username", username)?;
        }
        if let Some(email) = &update.email {
            Validator::required("email", email)?;
            Validator::length("email", email, 1, MAX_EMAIL_LEN)?;
            self.validator.check("email", "email", email)?;
        }
        if let Some(avatar) = &update.avatar {
            Validator::length("avatar URL", avatar, 0, MAX_AVATAR_LEN)?;
            if !avatar.is_empty() {
                Validator::url("avatar URL", avatar)?;
            }
        }
        if let Some(bio) = &update.bio {
            Validator::length("bio", bio, 0, MAX_BIO_LEN)?;
        }
        Ok(())
    }

    fn taken_by_other(&self, field: &'static str, value: &str, id: u64) -> Result<bool> {
        match self.store.find_by(field, value) {
            Ok(User { id: owner, .. }) => Ok(owner != id),
            Err(StoreError::NotFound) => Ok(false),
            Err(err) => Err(err.during("find", "user")),
        }
    }

    /// Apply `update` to the user's profile. An empty avatar clears it.
    ///
    /// # Errors
    /// [`Error::Validation`] for malformed fields, [`Error::Conflict`] when the
    /// username or email belongs to someone else.
    pub fn update_profile(&self, id: u64, update: &ProfileUpdate) -> Result<UserProfile> {
        self.validate(update)?;
        let mut user = self.load(id)?;

        if let Some(username) = &update.username {
            if *username != user.username && self.taken_by_other("username", username, id)? {
                return Err(Error::conflict("username is already taken"));
            }
            user.username.clone_from(username);
        }
        if let Some(email) = &update.email {
            if *email != user.email && self.taken_by_other("email", email, id)? {
                return Err(Error::conflict("email is already taken"));
            }
            user.email.clone_from(email);
        }
        if let Some(avatar) = &update.avatar {
            user.avatar = (!avatar.is_empty()).then(|| avatar.clone());
        }
        if let Some(bio) = &update.bio {
            user.bio.clone_from(bio);
        }
        user.updated_at = OffsetDateTime::now_utc();
        self.store.update(&user).during("update", "user")?;
        info!(user = id, "profile updated");
        Ok(user.profile())
    }

    /// Every live article the user wrote, newest first.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown users.
    pub fn articles(&self, id: u64, page: PageRequest) -> Result<Page<Article>> {
        let user = self.load(id)?;
        self.store
            .paginate(|article: &Article| article.author_id == user.id, page)
            .during("list", "article")
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown users.
    pub fn published_article_count(&self, id: u64) -> Result<u64> {
        let user = self.load(id)?;
        Paginator::<Article>::count(self.store.as_ref(), |article| {
            article.author_id == user.id && article.is_published()
        })
        .during("count", "article")
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::{ErrorKind, store::Creator, types::ArticleStatus};

    fn setup() -> (UserService, Arc<Store>, u64, u64) {
        let store = Arc::new(Store::in_memory().unwrap());
        let at = datetime!(2024-01-01 0:00 UTC);
        let alice: User = store.create(User::new("alice", "alice@x.io", "h", at)).unwrap();
        let bob: User = store.create(User::new("bobby", "bob@x.io", "h", at)).unwrap();
        let service = UserService::new(Arc::clone(&store), Arc::new(Validator::new()));
        (service, store, alice.id, bob.id)
    }

    #[test]
    fn updates_only_given_fields() {
        let (service, _, alice, _) = setup();
        let profile = service
            .update_profile(
                alice,
                &ProfileUpdate {
                    bio: Some("writes about compilers".into()),
                    avatar: Some("https://img.example/a.png".into()),
                    ..ProfileUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(profile.username, "alice");
        assert_eq!(profile.bio, "writes about compilers");
        assert_eq!(profile.avatar.as_deref(), Some("https://img.example/a.png"));

        let cleared = service
            .update_profile(alice, &ProfileUpdate { avatar: Some(String::new()), ..ProfileUpdate::default() })
            .unwrap();
        assert_eq!(cleared.avatar, None);
    }

    #[test]
    fn taken_names_conflict() {
        let (service, _, alice, _) = setup();
        let steal_name = ProfileUpdate { username: Some("bobby".into()), ..ProfileUpdate::default() };
        assert_eq!(service.update_profile(alice, &steal_name).unwrap_err().kind(), ErrorKind::Conflict);
        let steal_mail = ProfileUpdate { email: Some("bob@x.io".into()), ..ProfileUpdate::default() };
        assert_eq!(service.update_profile(alice, &steal_mail).unwrap_err().kind(), ErrorKind::Conflict);
        let keep_own = ProfileUpdate { email: Some("alice@x.io".into()), ..ProfileUpdate::default() };
        assert!(service.update_profile(alice, &keep_own).is_ok());
    }

    #[test]
    fn rejects_malformed_fields() {
        let (service, _, alice, _) = setup();
        for update in [
            ProfileUpdate { username: Some("a".into()), ..ProfileUpdate::default() },
            ProfileUpdate { email: Some("nope".into()), ..ProfileUpdate::default() },
            ProfileUpdate { bio: Some("x".repeat(501)), ..ProfileUpdate::default() },
            ProfileUpdate { avatar: Some("ftp://img".into()), ..ProfileUpdate::default() },
        ] {
            assert_eq!(service.update_profile(alice, &update).unwrap_err().kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn counts_published_articles_only() {
        let (service, store, alice, bob) = setup();
        let at = datetime!(2024-02-01 0:00 UTC);
        let mut published = Article::draft(alice, "One", "one", "body", at);
        published.transition(ArticleStatus::Published, at);
        store.create(published).unwrap();
        store.create(Article::draft(alice, "Two", "two", "body", at)).unwrap();
        store.create(Article::draft(bob, "Three", "three", "body", at)).unwrap();

        assert_eq!(service.published_article_count(alice).unwrap(), 1);
        assert_eq!(service.articles(alice, PageRequest::default()).unwrap().total, 2);
        assert_eq!(service.get(99).unwrap_err().kind(), ErrorKind::NotFound);
    }
}
