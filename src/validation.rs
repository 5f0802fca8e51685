//! Field rules checked at the service boundary.
//!
//! A [`Validator`] is built once by the application root and handed to the
//! services; there is no global registry.

use std::{collections::HashMap, fmt, sync::LazyLock};

use regex::Regex;

use crate::{
    error::{Error, Result},
    types::ArticleStatus,
};

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{3,50}$").expect("valid regex"));
static SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("valid regex"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("valid regex")
});

/// Usernames nobody may register.
pub const RESERVED_USERNAMES: &[&str] = &[
    "admin", "root", "api", "www", "mail", "ftp", "blog", "user", "test",
];
pub const RESERVED_CATEGORY_NAMES: &[&str] =
    &["admin", "api", "www", "blog", "category", "categories"];

type Check = fn(&str) -> bool;

#[derive(Clone, Copy)]
struct Rule {
    check: Check,
    message: &'static str,
}

/// Named input rules, registered up front and shared by the services.
#[derive(Clone, Default)]
pub struct Validator {
    rules: HashMap<&'static str, Rule>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.rules.keys().collect();
        names.sort_unstable();
        f.debug_struct("Validator").field("rules", &names).finish()
    }
}

impl Validator {
    /// A validator with no rules registered.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A validator with the blog's rules: `username`, `slug`, `email`,
    /// `article_status` and `category_name`.
    #[must_use]
    pub fn new() -> Self {
        let mut validator = Self::empty();
        validator.register(
            "username",
            |value| USERNAME.is_match(value) && !is_reserved(value, RESERVED_USERNAMES),
            "must be 3-50 characters long, contain only letters, numbers, underscores and hyphens, and not be reserved",
        );
        validator.register(
            "slug",
            |value| SLUG.is_match(value),
            "must contain only lowercase letters, numbers, and hyphens",
        );
        validator.register(
            "email",
            |value| EMAIL.is_match(value),
            "must be a valid email address",
        );
        validator.register(
            "article_status",
            |value| value.parse::<ArticleStatus>().is_ok(),
            "must be one of: draft, published, archived",
        );
        validator.register(
            "category_name",
            |value| !has_line_break(value) && !is_reserved(value, RESERVED_CATEGORY_NAMES),
            "must be a single line and not a reserved name",
        );
        validator
    }

    /// Add or replace the rule `name`.
    pub fn register(&mut self, name: &'static str, check: Check, message: &'static str) {
        self.rules.insert(name, Rule { check, message });
    }

    /// Run the rule called `rule` against `value`.
    ///
    /// # Errors
    /// [`Error::Validation`] naming `field` when the value fails the rule or the
    /// rule is not registered.
    pub fn check(&self, rule: &str, field: &str, value: &str) -> Result<()> {
        match self.rules.get(rule) {
            Some(rule) if (rule.check)(value) => Ok(()),
            Some(rule) => Err(Error::validation(format!("{field} {}", rule.message))),
            None => Err(Error::validation(format!("{field} is invalid"))),
        }
    }

    /// # Errors
    /// [`Error::Validation`] when `value` is blank.
    pub fn required(field: &str, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(Error::validation(format!("{field} is required")));
        }
        Ok(())
    }

    /// Character count of `value` must be within `min..=max`.
    ///
    /// # Errors
    /// [`Error::Validation`] otherwise.
    pub fn length(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
        let len = value.chars().count();
        if len < min {
            return Err(Error::validation(if min == 1 {
                format!("{field} is required")
            } else {
                format!("{field} must be at least {min} characters long")
            }));
        }
        if len > max {
            return Err(Error::validation(format!(
                "{field} must be at most {max} characters long"
            )));
        }
        Ok(())
    }

    /// # Errors
    /// [`Error::Validation`] when `value` contains a line break.
    pub fn single_line(field: &str, value: &str) -> Result<()> {
        if has_line_break(value) {
            return Err(Error::validation(format!(
                "{field} cannot contain line breaks"
            )));
        }
        Ok(())
    }

    /// An absolute http(s) URL.
    ///
    /// # Errors
    /// [`Error::Validation`] otherwise.
    pub fn url(field: &str, value: &str) -> Result<()> {
        match url::Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            _ => Err(Error::validation(format!("{field} must be a valid URL"))),
        }
    }
}

fn is_reserved(value: &str, reserved: &[&str]) -> bool {
    let lowered = value.to_lowercase();
    reserved.iter().any(|name| *name == lowered)
}

fn has_line_break(value: &str) -> bool {
    value.contains(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("alice", true)]
    #[case("al", false)]
    #[case("bad name", false)]
    #[case("Admin", false)]
    #[case("dash-and_underscore", true)]
    fn usernames(#[case] value: &str, #[case] ok: bool) {
        assert_eq!(Validator::new().check("username", "username", value).is_ok(), ok);
    }

    #[rstest]
    #[case("a@b.io", true)]
    #[case("first.last+tag@example.co.uk", true)]
    #[case("missing-at.example.com", false)]
    #[case("no@tld", false)]
    fn emails(#[case] value: &str, #[case] ok: bool) {
        assert_eq!(Validator::new().check("email", "email", value).is_ok(), ok);
    }

    #[test]
    fn messages_name_the_field() {
        let err = Validator::new().check("slug", "slug", "Not A Slug").unwrap_err();
        assert_eq!(
            err.to_string(),
            "slug must contain only lowercase letters, numbers, and hyphens"
        );
    }

    #[test]
    fn unknown_rules_reject() {
        assert!(Validator::empty().check("username", "name", "alice").is_err());
    }

    #[test]
    fn lengths_count_characters() {
        assert!(Validator::length("title", "日本語", 1, 3).is_ok());
        assert_eq!(
            Validator::length("title", "", 1, 3).unwrap_err().to_string(),
            "title is required"
        );
        assert!(Validator::length("content", "ab", 3, 10).is_err());
    }

    #[test]
    fn urls_must_be_web_links() {
        assert!(Validator::url("avatar", "https://example.com/me.png").is_ok());
        assert!(Validator::url("avatar", "javascript:alert(1)").is_err());
        assert!(Validator::url("avatar", "not a url").is_err());
    }
}
