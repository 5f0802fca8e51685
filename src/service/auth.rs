//! Registration, login and signed session tokens.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    config::Config,
    error::{Error, Result, StoreResultExt},
    store::{Creator, Finder, Store, StoreError},
    types::{User, UserProfile},
    validation::Validator,
};

pub const MAX_EMAIL_LEN: usize = 100;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 255;

/// Which half of a token pair a JWT is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub username: String,
    pub email: String,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

/// Access and refresh token issued together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// A signed-in user and their tokens.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user: UserProfile,
    pub tokens: TokenPair,
}

/// Sign-up form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Hash a password into an argon2 PHC string.
///
/// # Errors
/// [`Error::Password`] if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| Error::Password(err.to_string()))
}

/// A fresh random signing secret.
#[must_use]
pub fn generate_secret() -> String {
    let mut secret = SaltString::generate(&mut OsRng).as_str().to_owned();
    secret.push_str(SaltString::generate(&mut OsRng).as_str());
    secret
}

/// # Errors
/// [`Error::Password`] if `hash` is not a PHC string.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|err| Error::Password(err.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Registration, login and HS256 session tokens.
pub struct AuthService {
    store: Arc<Store>,
    validator: Arc<Validator>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: time::Duration,
    refresh_ttl: time::Duration,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    #[must_use]
    pub fn new(store: Arc<Store>, validator: Arc<Validator>, config: &Config) -> Self {
        let secret = config.secret().as_bytes();
        Self {
            store,
            validator,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
        }
    }

    /// Create an account and open a session for it.
    ///
    /// # Errors
    /// [`Error::Validation`] for malformed fields, [`Error::Conflict`] when the
    /// email or username is taken.
    pub fn register(&self, registration: &Registration) -> Result<Session> {
        let Registration {
            username,
            email,
            password,
        } = registration;
        Validator::required("username", username)?;
        if username.trim() != username {
            return Err(Error::validation(
                "username cannot have leading or trailing spaces",
            ));
        }
        self.validator.check("username", "username", username)?;
        Validator::required("email", email)?;
        Validator::length("email", email, 1, MAX_EMAIL_LEN)?;
        self.validator.check("email", "email", email)?;
        Validator::required("password", password)?;
        Validator::length("password", password, MIN_PASSWORD_LEN, MAX_PASSWORD_LEN)?;

        if Finder::<User>::exists_by(self.store.as_ref(), "email", email).during("find", "user")? {
            return Err(Error::conflict("user with this email already exists"));
        }
        if Finder::<User>::exists_by(self.store.as_ref(), "username", username)
            .during("find", "user")?
        {
            return Err(Error::conflict("username is already taken"));
        }

        let user = User::new(
            username.as_str(),
            email.as_str(),
            hash_password(password)?,
            OffsetDateTime::now_utc(),
        );
        let user = self.store.create(user).during("create", "user")?;
        info!(user = user.id, username = user.username, "user registered");
        self.session(&user)
    }

    /// # Errors
    /// [`Error::Unauthorized`] for an unknown email or a wrong password.
    pub fn login(&self, email: &str, password: &str) -> Result<Session> {
        Validator::required("email", email)?;
        Validator::required("password", password)?;
        let user: User = match self.store.find_by("email", email) {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                return Err(Error::unauthorized("invalid email or password"));
            }
            Err(err) => return Err(err.during("find", "user")),
        };
        if !verify_password(password, &user.password_hash)? {
            warn!(user = user.id, "rejected login");
            return Err(Error::unauthorized("invalid email or password"));
        }
        self.session(&user)
    }

    fn session(&self, user: &User) -> Result<Session> {
        Ok(Session {
            user: user.profile(),
            tokens: self.issue(user)?,
        })
    }

    /// Sign a fresh access and refresh token for `user`.
    ///
    /// # Errors
    /// [`Error::Token`] if signing fails.
    pub fn issue(&self, user: &User) -> Result<TokenPair> {
        let now = OffsetDateTime::now_utc();
        Ok(TokenPair {
            access_token: self.sign(user, TokenKind::Access, now, self.access_ttl)?,
            refresh_token: self.sign(user, TokenKind::Refresh, now, self.refresh_ttl)?,
            expires_in: self.access_ttl.whole_seconds(),
        })
    }

    fn sign(
        &self,
        user: &User,
        kind: TokenKind,
        now: OffsetDateTime,
        ttl: time::Duration,
    ) -> Result<String> {
        let claims = Claims {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            kind,
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Verify signature, expiry and kind of `token`.
    ///
    /// # Errors
    /// [`Error::Token`] for bad or expired tokens, [`Error::Unauthorized`] for a
    /// token of the wrong kind.
    pub fn claims(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))?;
        if data.claims.kind != kind {
            return Err(Error::unauthorized("wrong token type"));
        }
        Ok(data.claims)
    }

    /// The user id an access token was issued for.
    ///
    /// # Errors
    /// Same as [`AuthService::claims`].
    pub fn validate_token(&self, token: &str) -> Result<u64> {
        Ok(self.claims(token, TokenKind::Access)?.user_id)
    }

    /// # Errors
    /// Token failures, or [`Error::NotFound`] if the user no longer exists.
    pub fn current_user(&self, token: &str) -> Result<UserProfile> {
        let user_id = self.validate_token(token)?;
        let user: User = self.store.find(user_id).during("find", "user")?;
        Ok(user.profile())
    }

    /// Trade a refresh token for a new pair.
    ///
    /// # Errors
    /// [`Error::Unauthorized`] for invalid refresh tokens or vanished users.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self
            .claims(refresh_token, TokenKind::Refresh)
            .map_err(|_| Error::unauthorized("invalid refresh token"))?;
        let user: User = match self.store.find(claims.user_id) {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(Error::unauthorized("user not found")),
            Err(err) => return Err(err.during("find", "user")),
        };
        self.issue(&user)
    }
}
