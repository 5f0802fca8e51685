//! Error taxonomy shared by every service.

use thiserror::Error;

use crate::{index::IndexError, slug::EmptySlug, store::StoreError};

/// Result alias defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification of an [`Error`], for callers that map failures onto
/// response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Exhaustion,
    Unauthorized,
    Internal,
}

/// Every failure a service can report.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("{0}")]
    Conflict(String),
    #[error("cannot allocate unique identifier for `{base}`")]
    Exhaustion { base: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("tag processing failed for name `{name}`: {source}")]
    TagProcessing {
        name: String,
        #[source]
        source: Box<Error>,
    },
    #[error("failed to {operation} {entity}: {source}")]
    Store {
        operation: &'static str,
        entity: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("search index failure: {0}")]
    Index(#[from] IndexError),
    #[error("invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("password hashing failed: {0}")]
    Password(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(#[from] toml::de::Error),
    #[error("Inner error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    #[must_use]
    pub const fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    /// The taxonomy bucket of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Exhaustion { .. } => ErrorKind::Exhaustion,
            Self::Unauthorized(_) | Self::Token(_) => ErrorKind::Unauthorized,
            Self::TagProcessing { source, .. } => source.kind(),
            Self::Store { source, .. } => match source {
                StoreError::NotFound | StoreError::MissingReference { .. } => ErrorKind::NotFound,
                StoreError::Duplicate { .. } | StoreError::Referenced { .. } => {
                    ErrorKind::Conflict
                }
                _ => ErrorKind::Internal,
            },
            Self::Index(_) | Self::Password(_) | Self::InvalidConfig(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<EmptySlug> for Error {
    fn from(err: EmptySlug) -> Self {
        Self::Validation(err.to_string())
    }
}

impl StoreError {
    /// Attach the operation and entity to a store failure.
    ///
    /// Missing records and dangling references become [`Error::NotFound`] and
    /// unique-index collisions become [`Error::Conflict`]; everything else keeps
    /// its kind behind [`Error::Store`].
    #[must_use]
    pub fn during(self, operation: &'static str, entity: &'static str) -> Error {
        match self {
            Self::NotFound => Error::NotFound { entity },
            Self::MissingReference { entity, .. } => Error::NotFound { entity },
            Self::Duplicate { field, value } => {
                Error::Conflict(format!("{entity} with {field} `{value}` already exists"))
            }
            source => Error::Store {
                operation,
                entity,
                source,
            },
        }
    }
}

/// Shorthand for `map_err(|err| err.during(..))` on store results.
pub trait StoreResultExt<T> {
    fn during(self, operation: &'static str, entity: &'static str) -> Result<T>;
}

impl<T> StoreResultExt<T> for Result<T, StoreError> {
    fn during(self, operation: &'static str, entity: &'static str) -> Result<T> {
        self.map_err(|err| err.during(operation, entity))
    }
}
