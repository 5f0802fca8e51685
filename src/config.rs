//! The `Quire.toml` manifest.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pagination::DEFAULT_LIMIT;
use crate::ranking::DEFAULT_WINDOW_DAYS;

/// File name of the manifest inside a blog directory.
pub const MANIFEST: &str = "Quire.toml";

/// Blog settings, read from `Quire.toml`. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    name: String,
    /// Database file, relative to the blog root.
    store: PathBuf,
    /// Full-text index directory, relative to the blog root.
    index: PathBuf,
    secret: String,
    index_writer_heap: usize,
    page_size: u32,
    trending_window_days: u32,
    access_token_hours: u32,
    refresh_token_days: u32,
}

impl Config {
    /// # Errors
    /// Fails when the file cannot be read or is not a valid manifest.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = std::fs::read_to_string(path)?;
        toml::from_str(&config).map_err(Error::InvalidConfig)
    }

    /// Defaults for a blog called `name`, without a signing secret.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn store(&self) -> &Path {
        &self.store
    }

    #[must_use]
    pub fn index(&self) -> &Path {
        &self.index
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    #[must_use]
    pub const fn index_writer_heap(&self) -> usize {
        self.index_writer_heap
    }

    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub const fn trending_window_days(&self) -> u32 {
        self.trending_window_days
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> time::Duration {
        time::Duration::hours(i64::from(self.access_token_hours))
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> time::Duration {
        time::Duration::days(i64::from(self.refresh_token_days))
    }

    /// Pretty TOML, ready to be written as the manifest.
    #[must_use]
    pub fn export(&self) -> String {
        toml::to_string_pretty(&self).unwrap_or_default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "Quire".to_string(),
            store: PathBuf::from("quire.redb"),
            index: PathBuf::from("search_index"),
            secret: String::new(),
            index_writer_heap: 50_000_000,
            page_size: DEFAULT_LIMIT,
            trending_window_days: DEFAULT_WINDOW_DAYS,
            access_token_hours: 24,
            refresh_token_days: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back() {
        let config: Config = toml::from_str("name = \"Notes\"\nsecret = \"s3cret\"").unwrap();
        assert_eq!(config.name(), "Notes");
        assert_eq!(config.secret(), "s3cret");
        assert_eq!(config.trending_window_days(), 7);
        assert_eq!(config.access_token_ttl(), time::Duration::hours(24));
        assert_eq!(config.refresh_token_ttl(), time::Duration::days(30));
    }

    #[test]
    fn export_reads_back() {
        let config = Config::new("Round").with_secret("x");
        let parsed: Config = toml::from_str(&config.export()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn rejects_wrong_types() {
        let err = toml::from_str::<Config>("page_size = \"ten\"").unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }
}
