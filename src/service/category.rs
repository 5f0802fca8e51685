//! Categories and the articles filed under them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;

use crate::{
    error::{Error, Result, StoreResultExt},
    pagination::{Page, PageRequest},
    slug::Slug,
    store::{Creator, Finder, Paginator, Store, StoreError, Updater},
    types::{Article, Category, CategoryWithCount},
    validation::Validator,
};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// Name and description of a category to create or update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl CategoryInput {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Categories are addressed by a slug derived from their name. Unlike tags and
/// articles, a clashing slug is refused rather than suffixed.
#[derive(Debug, Clone)]
pub struct CategoryService {
    store: Arc<Store>,
    validator: Arc<Validator>,
}

impl CategoryService {
    #[must_use]
    pub const fn new(store: Arc<Store>, validator: Arc<Validator>) -> Self {
        Self { store, validator }
    }

    fn checked(&self, input: &CategoryInput) -> Result<(String, String, Slug)> {
        let name = input.name.trim();
        let description = input.description.trim();
        Validator::length("name", name, 1, MAX_NAME_LEN)?;
        Validator::length("description", description, 0, MAX_DESCRIPTION_LEN)?;
        self.validator.check("category_name", "name", name)?;
        let slug = Slug::from_text(name)?;
        Ok((name.to_string(), description.to_string(), slug))
    }

    /// # Errors
    /// [`Error::Conflict`] when another category already uses the derived slug
    /// or the name.
    pub fn create(&self, input: &CategoryInput) -> Result<Category> {
        let (name, description, slug) = self.checked(input)?;
        if Finder::<Category>::exists_by(self.store.as_ref(), "slug", slug.as_str())
            .during("find", "category")?
        {
            return Err(Error::conflict("category with this name already exists"));
        }
        let category = self
            .store
            .create(Category::new(
                name,
                slug.into_string(),
                description,
                OffsetDateTime::now_utc(),
            ))
            .during("create", "category")?;
        info!(name = category.name, slug = category.slug, "category created");
        Ok(category)
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown ids.
    pub fn get(&self, id: u64) -> Result<Category> {
        self.store.find(id).during("find", "category")
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown slugs.
    pub fn get_by_slug(&self, slug: &str) -> Result<Category> {
        Validator::required("slug", slug)?;
        self.store.find_by("slug", slug).during("find", "category")
    }

    /// # Errors
    /// Store failures only.
    pub fn list(&self) -> Result<Vec<Category>> {
        let mut categories: Vec<Category> =
            self.store.list(|_: &Category| true).during("list", "category")?;
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    /// Every category with the number of live articles filed under it.
    ///
    /// # Errors
    /// Store failures only.
    pub fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>> {
        let articles: Vec<Article> = self
            .store
            .list(|article: &Article| article.category_id.is_some())
            .during("list", "article")?;
        Ok(self
            .list()?
            .into_iter()
            .map(|category| CategoryWithCount {
                article_count: articles
                    .iter()
                    .filter(|article| article.category_id == Some(category.id))
                    .count() as u64,
                category,
            })
            .collect())
    }

    /// Rename or redescribe a category; the slug follows the name.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown ids, [`Error::Conflict`] when the new slug
    /// belongs to another category.
    pub fn update(&self, id: u64, input: &CategoryInput) -> Result<Category> {
        let mut category = self.get(id)?;
        let (name, description, slug) = self.checked(input)?;
        if slug.as_str() != category.slug {
            match self.store.find_by("slug", slug.as_str()) {
                Ok(Category { id: other, .. }) if other != id => {
                    return Err(Error::conflict("category with this name already exists"));
                }
                Ok(_) | Err(StoreError::NotFound) => {}
                Err(err) => return Err(err.during("find", "category")),
            }
        }
        category.name = name;
        category.description = description;
        category.slug = slug.into_string();
        category.updated_at = OffsetDateTime::now_utc();
        self.store.update(&category).during("update", "category")?;
        Ok(category)
    }

    /// # Errors
    /// [`Error::Conflict`] while any live article is filed under the category.
    pub fn delete(&self, id: u64) -> Result<()> {
        let category = self.get(id)?;
        match self.store.remove_category(id) {
            Ok(_) => {
                info!(name = category.name, "category deleted");
                Ok(())
            }
            Err(StoreError::Referenced { count, .. }) => Err(Error::conflict(format!(
                "cannot delete category '{}' because it has {count} articles",
                category.name
            ))),
            Err(err) => Err(err.during("delete", "category")),
        }
    }

    /// Articles filed under the category, newest first.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown ids.
    pub fn articles(&self, id: u64, page: PageRequest) -> Result<Page<Article>> {
        let category = self.get(id)?;
        self.store
            .paginate(
                |article: &Article| article.category_id == Some(category.id),
                page,
            )
            .during("list", "article")
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown slugs.
    pub fn articles_by_slug(&self, slug: &str, page: PageRequest) -> Result<Page<Article>> {
        let category = self.get_by_slug(slug)?;
        self.articles(category.id, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn service() -> CategoryService {
        CategoryService::new(
            Arc::new(Store::in_memory().unwrap()),
            Arc::new(Validator::new()),
        )
    }

    #[test]
    fn same_slug_is_a_conflict() {
        let service = service();
        let created = service.create(&CategoryInput::new("Systems Programming", "")).unwrap();
        assert_eq!(created.slug, "systems-programming");
        let err = service
            .create(&CategoryInput::new("systems   programming!", ""))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn reserved_names_are_refused() {
        let err = service().create(&CategoryInput::new("Admin", "")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn rename_moves_the_slug() {
        let service = service();
        let first = service.create(&CategoryInput::new("Rust", "")).unwrap();
        let second = service.create(&CategoryInput::new("Go", "")).unwrap();

        let renamed = service
            .update(first.id, &CategoryInput::new("Rust Lang", "all things rust"))
            .unwrap();
        assert_eq!(renamed.slug, "rust-lang");
        assert_eq!(service.get_by_slug("rust-lang").unwrap().description, "all things rust");

        let err = service
            .update(second.id, &CategoryInput::new("Rust Lang", ""))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(service.update(second.id, &CategoryInput::new("Go", "same slug")).is_ok());
    }

    #[test]
    fn empty_category_can_be_deleted() {
        let service = service();
        let category = service.create(&CategoryInput::new("Scratch", "")).unwrap();
        service.delete(category.id).unwrap();
        assert_eq!(service.get(category.id).unwrap_err().kind(), ErrorKind::NotFound);
    }
}
