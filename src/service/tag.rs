//! Tag resolution and lookups.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    error::{Error, ErrorKind, Result, StoreResultExt},
    pagination::{Page, PageRequest},
    slug::{Slug, resolve_unique},
    store::{Creator, Finder, Paginator, Store, StoreError},
    types::{Article, Tag, TagUsage},
    validation::Validator,
};

pub const MAX_NAME_LEN: usize = 50;
pub const DEFAULT_POPULAR_LIMIT: usize = 20;
pub const MAX_POPULAR_LIMIT: usize = 100;

/// The slice of tag persistence the resolver needs.
pub trait TagStore {
    /// # Errors
    /// Lookup failures.
    fn tag_by_name(&self, name: &str) -> Result<Option<Tag>>;
    /// # Errors
    /// Lookup failures.
    fn tag_slug_taken(&self, slug: &str) -> Result<bool>;
    /// # Errors
    /// [`Error::Conflict`] when name or slug is already taken.
    fn insert_tag(&self, tag: Tag) -> Result<Tag>;
}

impl TagStore for Store {
    fn tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        match self.find_by("name", name) {
            Ok(tag) => Ok(Some(tag)),
            Err(StoreError::NotFound) => Ok(None),
            Err(err) => Err(err.during("find", "tag")),
        }
    }

    fn tag_slug_taken(&self, slug: &str) -> Result<bool> {
        Finder::<Tag>::exists_by(self, "slug", slug).during("find", "tag")
    }

    fn insert_tag(&self, tag: Tag) -> Result<Tag> {
        self.create(tag).during("create", "tag")
    }
}

/// Turns free-form tag names into stored tags, creating the missing ones.
#[derive(Debug)]
pub struct TagResolver<S = Store> {
    store: Arc<S>,
}

impl<S> Clone for TagResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: TagStore> TagResolver<S> {
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve a batch of names into tags, in first-seen order.
    ///
    /// Names are trimmed; blanks and exact repeats are skipped. Matching is
    /// case-sensitive, so `Rust` and `rust` are different tags.
    ///
    /// # Errors
    /// [`Error::TagProcessing`] naming the first tag that could not be found or
    /// created.
    pub fn resolve<N: AsRef<str>>(&self, names: &[N]) -> Result<Vec<Tag>> {
        let mut tags: Vec<Tag> = Vec::new();
        let mut seen: Vec<&str> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || seen.contains(&name) {
                continue;
            }
            seen.push(name);
            let tag = self
                .find_or_create(name)
                .map_err(|source| Error::TagProcessing {
                    name: name.to_string(),
                    source: Box::new(source),
                })?;
            tags.push(tag);
        }
        Ok(tags)
    }

    /// # Errors
    /// Validation of `name`, slug exhaustion and store failures.
    pub fn find_or_create(&self, name: &str) -> Result<Tag> {
        if let Some(tag) = self.store.tag_by_name(name)? {
            return Ok(tag);
        }
        match self.create(name) {
            Err(err) if err.kind() == ErrorKind::Conflict => {
                warn!(name, "tag created concurrently, reloading");
                self.store.tag_by_name(name)?.ok_or(err)
            }
            result => result,
        }
    }

    /// Create a tag named `name` under a fresh slug.
    ///
    /// # Errors
    /// [`Error::Validation`] for a bad name, [`Error::Conflict`] when the name
    /// exists, [`Error::Exhaustion`] when no slug is free.
    pub fn create(&self, name: &str) -> Result<Tag> {
        Validator::length("tag name", name, 1, MAX_NAME_LEN)?;
        Validator::single_line("tag name", name)?;
        let base = Slug::from_text(name)?;
        let slug = resolve_unique(&base, |candidate| self.store.tag_slug_taken(candidate))?;
        let tag = self
            .store
            .insert_tag(Tag::new(name, slug.into_string(), OffsetDateTime::now_utc()))?;
        info!(name = tag.name, slug = tag.slug, "tag created");
        Ok(tag)
    }
}

/// Tag lookups and listings.
#[derive(Debug, Clone)]
pub struct TagService {
    store: Arc<Store>,
    resolver: TagResolver,
}

impl TagService {
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            resolver: TagResolver::new(Arc::clone(&store)),
            store,
        }
    }

    #[must_use]
    pub const fn resolver(&self) -> &TagResolver {
        &self.resolver
    }

    /// # Errors
    /// [`Error::Conflict`] when a tag with this name exists.
    pub fn create(&self, name: &str) -> Result<Tag> {
        let name = name.trim();
        Validator::required("tag name", name)?;
        if self.store.tag_by_name(name)?.is_some() {
            return Err(Error::conflict(format!("tag with name '{name}' already exists")));
        }
        self.resolver.create(name)
    }

    /// # Errors
    /// Same as [`TagResolver::find_or_create`].
    pub fn find_or_create(&self, name: &str) -> Result<Tag> {
        let name = name.trim();
        Validator::required("tag name", name)?;
        self.resolver.find_or_create(name)
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown ids.
    pub fn get(&self, id: u64) -> Result<Tag> {
        self.store.find(id).during("find", "tag")
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown slugs.
    pub fn get_by_slug(&self, slug: &str) -> Result<Tag> {
        Validator::required("slug", slug)?;
        self.store.find_by("slug", slug).during("find", "tag")
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown names.
    pub fn get_by_name(&self, name: &str) -> Result<Tag> {
        Validator::required("name", name)?;
        self.store.find_by("name", name).during("find", "tag")
    }

    /// # Errors
    /// Store failures only.
    pub fn list(&self) -> Result<Vec<Tag>> {
        self.store.list(|_: &Tag| true).during("list", "tag")
    }

    /// Articles carrying the tag, newest first.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown tags.
    pub fn articles(&self, tag_id: u64, page: PageRequest) -> Result<Page<Article>> {
        let tag = self.get(tag_id)?;
        self.store
            .paginate(|article: &Article| article.has_tag(tag.id), page)
            .during("list", "article")
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown slugs.
    pub fn articles_by_slug(&self, slug: &str, page: PageRequest) -> Result<Page<Article>> {
        let tag = self.get_by_slug(slug)?;
        self.articles(tag.id, page)
    }

    /// Tags ordered by how many live articles carry them. `limit` outside
    /// `1..=100` falls back to 20.
    ///
    /// # Errors
    /// Store failures only.
    pub fn popular(&self, limit: usize) -> Result<Vec<TagUsage>> {
        let limit = if (1..=MAX_POPULAR_LIMIT).contains(&limit) {
            limit
        } else {
            DEFAULT_POPULAR_LIMIT
        };
        let articles: Vec<Article> = self.store.list(|_: &Article| true).during("list", "article")?;
        let mut usage: Vec<TagUsage> = self
            .list()?
            .into_iter()
            .map(|tag| TagUsage {
                article_count: articles.iter().filter(|a| a.has_tag(tag.id)).count() as u64,
                tag,
            })
            .collect();
        usage.sort_by(|a, b| b.article_count.cmp(&a.article_count));
        usage.truncate(limit);
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use time::macros::datetime;

    use super::*;

    #[derive(Debug, Default)]
    struct MemoryTags {
        tags: Mutex<Vec<Tag>>,
        fail_on: Option<&'static str>,
    }

    impl TagStore for MemoryTags {
        fn tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
            if self.fail_on == Some(name) {
                return Err(Error::validation("lookup down"));
            }
            let tags = self.tags.lock().unwrap();
            Ok(tags.iter().find(|tag| tag.name == name).cloned())
        }

        fn tag_slug_taken(&self, slug: &str) -> Result<bool> {
            Ok(self.tags.lock().unwrap().iter().any(|tag| tag.slug == slug))
        }

        fn insert_tag(&self, mut tag: Tag) -> Result<Tag> {
            let mut tags = self.tags.lock().unwrap();
            tag.id = tags.len() as u64 + 1;
            tags.push(tag.clone());
            Ok(tag)
        }
    }

    fn resolver(store: MemoryTags) -> (Arc<MemoryTags>, TagResolver<MemoryTags>) {
        let store = Arc::new(store);
        (Arc::clone(&store), TagResolver::new(store))
    }

    #[test]
    fn batch_repeats_collapse_to_one_tag() {
        let (store, resolver) = resolver(MemoryTags::default());
        let tags = resolver.resolve(&["rust", " rust ", "", "web", "rust"]).unwrap();
        let names: Vec<_> = tags.iter().map(|tag| tag.name.as_str()).collect();
        assert_eq!(names, ["rust", "web"]);
        assert_eq!(store.tags.lock().unwrap().len(), 2);
    }

    #[test]
    fn names_are_case_sensitive() {
        let (_, resolver) = resolver(MemoryTags::default());
        let tags = resolver.resolve(&["Rust", "rust"]).unwrap();
        let slugs: Vec<_> = tags.iter().map(|tag| tag.slug.as_str()).collect();
        assert_eq!(slugs, ["rust", "rust-1"]);
    }

    #[test]
    fn existing_tags_are_reused() {
        let existing = Tag {
            id: 1,
            ..Tag::new("go", "go", datetime!(2024-01-01 0:00 UTC))
        };
        let (store, resolver) = resolver(MemoryTags {
            tags: Mutex::new(vec![existing.clone()]),
            fail_on: None,
        });
        let tags = resolver.resolve(&["go", "zig"]).unwrap();
        assert_eq!(tags[0], existing);
        assert_eq!(store.tags.lock().unwrap().len(), 2);
    }

    #[test]
    fn failures_name_the_tag() {
        let (_, resolver) = resolver(MemoryTags {
            fail_on: Some("broken"),
            ..MemoryTags::default()
        });
        let err = resolver.resolve(&["fine", "broken"]).unwrap_err();
        assert!(matches!(&err, Error::TagProcessing { name, .. } if name == "broken"));
    }

    #[test]
    fn unsluggable_names_are_rejected() {
        let (_, resolver) = resolver(MemoryTags::default());
        let err = resolver.resolve(&["!!!"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn service_refuses_duplicate_names() {
        let service = TagService::new(Arc::new(Store::in_memory().unwrap()));
        service.create("Databases").unwrap();
        let err = service.create(" Databases ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(service.get_by_slug("databases").unwrap().name, "Databases");
        assert!(service.create(&"x".repeat(51)).is_err());
    }
}
