//! Accounts and their public profile.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A stored account, password hash included.
///
/// Never hand this out across the crate boundary; convert to [`UserProfile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: 0,
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            avatar: None,
            bio: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The public view of this account.
    #[must_use]
    pub fn profile(&self) -> UserProfile {
        UserProfile::from(self)
    }
}

/// Public view of a [`User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub bio: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
            bio: user.bio.clone(),
            created_at: user.created_at,
        }
    }
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}
