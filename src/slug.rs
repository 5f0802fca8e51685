//! URL slugs and collision-free allocation.

use slug::slugify;
use std::{fmt, str::FromStr};

use crate::error::{Error, Result};

/// Longest slug the generator will produce.
pub const MAX_LEN: usize = 100;

/// How many candidates the uniqueness resolver tries before giving up:
/// `base`, then `base-1` through `base-999`.
pub const MAX_ATTEMPTS: usize = 1000;

/// The text held nothing a slug could be made of.
#[derive(Debug, thiserror::Error)]
#[error("cannot derive identifier from empty text")]
pub struct EmptySlug;

/// A lowercase ASCII slug: letters, digits and single dashes, at most 100 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slug(String);

impl Slug {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Slug of `text`, transliterating non-ASCII letters first.
    ///
    /// # Errors
    /// [`EmptySlug`] when nothing is left.
    pub fn from_text(text: &str) -> Result<Self, EmptySlug> {
        Self::from_str(&generate(text))
    }

    fn with_suffix(&self, counter: usize) -> Self {
        Self(format!("{}-{counter}", self.0))
    }
}

/// Derive a URL slug from arbitrary text.
///
/// The output only contains `[a-z0-9-]`, never starts or ends with `-` and is at
/// most [`MAX_LEN`] bytes. Text without any usable character yields `""`.
#[must_use]
pub fn generate(text: &str) -> String {
    let mut slug = slugify(text);
    if slug.len() > MAX_LEN {
        slug.truncate(MAX_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Find the first free slug among `base`, `base-1`, `base-2`, ...
///
/// `exists` is asked about every candidate in turn and must see slugs created
/// earlier in the same logical operation. Lookup failures are returned as-is.
///
/// # Errors
/// Returns [`Error::Exhaustion`] when [`MAX_ATTEMPTS`] candidates are all taken.
pub fn resolve_unique(
    base: &Slug,
    mut exists: impl FnMut(&str) -> Result<bool>,
) -> Result<Slug> {
    if !exists(base.as_str())? {
        return Ok(base.clone());
    }
    for counter in 1..MAX_ATTEMPTS {
        let candidate = base.with_suffix(counter);
        if !exists(candidate.as_str())? {
            return Ok(candidate);
        }
    }
    tracing::warn!(base = base.as_str(), "unique slug attempts exhausted");
    Err(Error::Exhaustion {
        base: base.to_string(),
    })
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Slug {
    type Err = EmptySlug;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(EmptySlug);
        }

        Ok(Self(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn collapses_punctuation_runs() {
        assert_eq!(generate("Hello, World!"), "hello-world");
        assert_eq!(generate("  --Rust   &&  Go--  "), "rust-go");
        assert_eq!(generate("Café au lait"), "cafe-au-lait");
    }

    #[test]
    fn empty_text_has_no_slug() {
        assert_eq!(generate(""), "");
        assert_eq!(generate("   \t "), "");
        assert!(Slug::from_text("!!!").is_err());
    }

    #[test]
    fn truncation_drops_trailing_hyphen() {
        let text = format!("{} tail", "a".repeat(MAX_LEN - 1));
        let slug = generate(&text);
        assert_eq!(slug, "a".repeat(MAX_LEN - 1));
    }

    #[test]
    fn free_base_is_returned_unchanged() {
        let base = Slug::from_text("Fresh Post").unwrap();
        let slug = resolve_unique(&base, |_| Ok(false)).unwrap();
        assert_eq!(slug.as_str(), "fresh-post");
    }

    #[test]
    fn collisions_get_the_next_counter() {
        let taken: HashSet<String> = ["post", "post-1", "post-2", "post-3"]
            .into_iter()
            .map(String::from)
            .collect();
        let base = Slug::from_text("post").unwrap();
        let slug = resolve_unique(&base, |candidate| Ok(taken.contains(candidate))).unwrap();
        assert_eq!(slug.as_str(), "post-4");
    }

    #[test]
    fn gives_up_after_bounded_attempts() {
        let base = Slug::from_text("busy").unwrap();
        let mut asked = 0;
        let err = resolve_unique(&base, |_| {
            asked += 1;
            Ok(true)
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Exhaustion);
        assert_eq!(asked, MAX_ATTEMPTS);
    }

    #[test]
    fn lookup_errors_propagate() {
        let base = Slug::from_text("broken").unwrap();
        let err = resolve_unique(&base, |_| Err(Error::validation("lookup down"))).unwrap_err();
        assert_eq!(err.to_string(), "lookup down");
    }

    proptest! {
        #[test]
        fn generated_slugs_are_url_safe(text in "\\PC*") {
            let slug = generate(&text);
            prop_assert!(slug.len() <= MAX_LEN);
            prop_assert!(slug.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
        }

        #[test]
        fn resolver_skips_every_taken_suffix(taken in 0usize..50) {
            let base = Slug::from_text("base").unwrap();
            let mut existing: HashSet<String> = (1..=taken).map(|n| format!("base-{n}")).collect();
            existing.insert("base".to_string());
            let slug = resolve_unique(&base, |candidate| Ok(existing.contains(candidate))).unwrap();
            prop_assert_eq!(slug.into_string(), format!("base-{}", taken + 1));
        }
    }
}
