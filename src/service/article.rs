//! Article lifecycle: drafting, editing, publishing, deletion and views.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{
    error::{Error, Result, StoreResultExt},
    index::SearchIndex,
    pagination::{Page, PageRequest},
    slug::{Slug, resolve_unique},
    store::{Counter, Creator, Finder, Paginator, Store, Updater},
    types::{Article, ArticleDetail, ArticleFilter, ArticleStatus, Category, Tag, User},
    validation::Validator,
};

use super::tag::TagResolver;

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_EXCERPT_LEN: usize = 500;

/// Input for a new article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateArticle {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub category_id: Option<u64>,
    #[serde(default)]
    pub tag_names: Vec<String>,
    /// Draft when unset. Articles cannot be created archived.
    #[serde(default)]
    pub status: Option<ArticleStatus>,
}

/// Partial article edit; `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateArticle {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    /// `Some(None)` files the article under no category.
    pub category_id: Option<Option<u64>>,
    /// Replaces the whole tag list.
    pub tag_names: Option<Vec<String>>,
    pub status: Option<ArticleStatus>,
}

fn title(raw: &str) -> Result<String> {
    let title = raw.trim();
    Validator::required("title", title)?;
    Validator::length("title", title, 1, MAX_TITLE_LEN)?;
    Ok(title.to_string())
}

fn content(raw: &str) -> Result<String> {
    Validator::required("content", raw)?;
    Ok(raw.trim().to_string())
}

fn excerpt(raw: &str) -> Result<String> {
    let excerpt = raw.trim();
    Validator::length("excerpt", excerpt, 0, MAX_EXCERPT_LEN)?;
    Ok(excerpt.to_string())
}

/// Article lifecycle. Every write is mirrored into the search index.
#[derive(Debug, Clone)]
pub struct ArticleService {
    store: Arc<Store>,
    index: Arc<SearchIndex>,
    tags: TagResolver,
}

impl ArticleService {
    #[must_use]
    pub fn new(store: Arc<Store>, index: Arc<SearchIndex>) -> Self {
        Self {
            tags: TagResolver::new(Arc::clone(&store)),
            store,
            index,
        }
    }

    /// Free slug for `title`. `current` names a slug the article already owns,
    /// which counts as free.
    fn slug_for(&self, title: &str, current: Option<&str>) -> Result<Slug> {
        let base = Slug::from_text(title)?;
        resolve_unique(&base, |candidate| {
            if current == Some(candidate) {
                return Ok(false);
            }
            Finder::<Article>::exists_by(self.store.as_ref(), "slug", candidate)
                .during("find", "article")
        })
    }

    fn ensure_category(&self, id: u64) -> Result<()> {
        let _: Category = self.store.find(id).during("find", "category")?;
        Ok(())
    }

    fn tag_ids(&self, names: &[String]) -> Result<Vec<u64>> {
        Ok(self.tags.resolve(names)?.iter().map(|tag| tag.id).collect())
    }

    /// Write `article` and bring its index document up to date. Returns the
    /// stored version, whose counters may have moved since `article` was read.
    fn save(&self, article: &Article) -> Result<Article> {
        let stored = self.store.update(article).during("update", "article")?;
        if stored.deleted_at.is_some() {
            self.index.remove(stored.id)?;
        } else {
            self.index.upsert(&stored)?;
        }
        Ok(stored)
    }

    fn owned(&self, id: u64, author_id: u64, action: &str) -> Result<Article> {
        let article = self.get(id)?;
        if article.author_id != author_id {
            return Err(Error::unauthorized(format!(
                "you can only {action} your own articles"
            )));
        }
        Ok(article)
    }

    /// # Errors
    /// [`Error::Validation`] for bad input, [`Error::NotFound`] for an unknown
    /// author or category, [`Error::TagProcessing`] when a tag cannot be resolved.
    pub fn create(&self, author_id: u64, input: &CreateArticle) -> Result<Article> {
        let title = title(&input.title)?;
        let content = content(&input.content)?;
        let excerpt = excerpt(&input.excerpt)?;
        let status = input.status.unwrap_or(ArticleStatus::Draft);
        if status == ArticleStatus::Archived {
            return Err(Error::validation(
                "status must be either 'draft' or 'published'",
            ));
        }

        let _: User = self.store.find(author_id).during("find", "author")?;
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id)?;
        }
        let slug = self.slug_for(&title, None)?;
        let tag_ids = self.tag_ids(&input.tag_names)?;

        let now = OffsetDateTime::now_utc();
        let mut article = Article::draft(author_id, title, slug.into_string(), content, now);
        article.excerpt = excerpt;
        article.category_id = input.category_id;
        article.tag_ids = tag_ids;
        article.transition(status, now);

        let article = self.store.create(article).during("create", "article")?;
        self.index.upsert(&article)?;
        info!(id = article.id, slug = article.slug, status = %article.status, "article created");
        Ok(article)
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown or deleted articles.
    pub fn get(&self, id: u64) -> Result<Article> {
        self.store.find(id).during("find", "article")
    }

    /// # Errors
    /// [`Error::NotFound`] for unknown slugs.
    pub fn get_by_slug(&self, slug: &str) -> Result<Article> {
        Validator::required("slug", slug)?;
        self.store.find_by("slug", slug).during("find", "article")
    }

    /// The article with author, category and tags loaded.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown articles.
    pub fn detail(&self, id: u64) -> Result<ArticleDetail> {
        let article = self.get(id)?;
        let author: User = self.store.find(article.author_id).during("find", "user")?;
        let category = match article.category_id {
            Some(category_id) => Finder::<Category>::find_many(self.store.as_ref(), &[category_id])
                .during("find", "category")?
                .pop(),
            None => None,
        };
        let tags: Vec<Tag> = self.store.find_many(&article.tag_ids).during("find", "tag")?;
        Ok(ArticleDetail {
            author: author.profile(),
            category,
            tags,
            article,
        })
    }

    /// # Errors
    /// Store failures only.
    pub fn list(&self, filter: &ArticleFilter, page: PageRequest) -> Result<Page<Article>> {
        self.store
            .paginate(|article: &Article| filter.matches(article), page)
            .during("list", "article")
    }

    /// Apply `changes` to an article owned by `author_id`. A new title moves the
    /// slug; unchanged input leaves the record untouched.
    ///
    /// # Errors
    /// [`Error::Unauthorized`] for someone else's article, plus the failures of
    /// [`ArticleService::create`].
    pub fn update(&self, id: u64, author_id: u64, changes: &UpdateArticle) -> Result<Article> {
        let mut article = self.owned(id, author_id, "edit")?;
        let mut updated = false;

        if let Some(raw) = &changes.title {
            let title = title(raw)?;
            if title != article.title {
                article.slug = self.slug_for(&title, Some(article.slug.as_str()))?.into_string();
                article.title = title;
                updated = true;
            }
        }
        if let Some(raw) = &changes.content {
            let content = content(raw)?;
            if content != article.content {
                article.content = content;
                updated = true;
            }
        }
        if let Some(raw) = &changes.excerpt {
            let excerpt = excerpt(raw)?;
            if excerpt != article.excerpt {
                article.excerpt = excerpt;
                updated = true;
            }
        }
        if let Some(category_id) = changes.category_id {
            if category_id != article.category_id {
                if let Some(category_id) = category_id {
                    self.ensure_category(category_id)?;
                }
                article.category_id = category_id;
                updated = true;
            }
        }
        if let Some(status) = changes.status {
            updated |= article.transition(status, OffsetDateTime::now_utc());
        }
        if let Some(names) = &changes.tag_names {
            article.tag_ids = self.tag_ids(names)?;
            updated = true;
        }

        if updated {
            article.updated_at = OffsetDateTime::now_utc();
            article = self.save(&article)?;
            info!(id, slug = article.slug, "article updated");
        }
        Ok(article)
    }

    /// Soft-delete an article and drop it from the index. Its slug stays taken.
    ///
    /// # Errors
    /// [`Error::Unauthorized`] for someone else's article.
    pub fn delete(&self, id: u64, author_id: u64) -> Result<()> {
        let mut article = self.owned(id, author_id, "delete")?;
        let now = OffsetDateTime::now_utc();
        article.deleted_at = Some(now);
        article.updated_at = now;
        self.store.update(&article).during("delete", "article")?;
        self.index.remove(id)?;
        info!(id, "article deleted");
        Ok(())
    }

    fn change_status(&self, id: u64, author_id: u64, status: ArticleStatus) -> Result<Article> {
        let mut article = self.owned(id, author_id, "modify")?;
        if article.transition(status, OffsetDateTime::now_utc()) {
            article.updated_at = OffsetDateTime::now_utc();
            article = self.save(&article)?;
            info!(id, %status, "article status changed");
        }
        Ok(article)
    }

    /// Publish, stamping `published_at` if the article was never published.
    ///
    /// # Errors
    /// [`Error::Unauthorized`] for someone else's article.
    pub fn publish(&self, id: u64, author_id: u64) -> Result<Article> {
        self.change_status(id, author_id, ArticleStatus::Published)
    }

    /// Back to draft. The first publish time is kept.
    ///
    /// # Errors
    /// [`Error::Unauthorized`] for someone else's article.
    pub fn unpublish(&self, id: u64, author_id: u64) -> Result<Article> {
        self.change_status(id, author_id, ArticleStatus::Draft)
    }

    /// # Errors
    /// [`Error::Unauthorized`] for someone else's article.
    pub fn archive(&self, id: u64, author_id: u64) -> Result<Article> {
        self.change_status(id, author_id, ArticleStatus::Archived)
    }

    /// Count one view and return the new total.
    ///
    /// # Errors
    /// [`Error::NotFound`] for unknown or deleted articles.
    pub fn record_view(&self, id: u64) -> Result<u64> {
        let views = self
            .store
            .increment(id, Counter::View, 1)
            .during("update", "article")?;
        debug!(id, views, "view recorded");
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread};

    use rstest::rstest;
    use time::macros::datetime;

    use super::*;
    use crate::{ErrorKind, index::Matching};

    struct Fixture {
        service: ArticleService,
        store: Arc<Store>,
        index: Arc<SearchIndex>,
        alice: u64,
        bob: u64,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(Store::in_memory().unwrap());
        let index = Arc::new(SearchIndex::in_memory(15_000_000).unwrap());
        let at = datetime!(2024-01-01 0:00 UTC);
        let alice: User = store.create(User::new("alice", "a@x.io", "h", at)).unwrap();
        let bob: User = store.create(User::new("bobby", "b@x.io", "h", at)).unwrap();
        Fixture {
            service: ArticleService::new(Arc::clone(&store), Arc::clone(&index)),
            store,
            index,
            alice: alice.id,
            bob: bob.id,
        }
    }

    fn input(title: &str) -> CreateArticle {
        CreateArticle {
            title: title.into(),
            content: "Ownership and borrowing explained".into(),
            ..CreateArticle::default()
        }
    }

    #[test]
    fn same_title_gets_suffixed_slugs() {
        let f = fixture();
        let first = f.service.create(f.alice, &input("Hello, World!")).unwrap();
        let second = f.service.create(f.bob, &input("hello world")).unwrap();
        assert_eq!(first.slug, "hello-world");
        assert_eq!(second.slug, "hello-world-1");
        assert_eq!(first.status, ArticleStatus::Draft);
        assert_eq!(first.published_at, None);
    }

    #[test]
    fn tags_are_resolved_and_indexed() {
        let f = fixture();
        let article = f
            .service
            .create(
                f.alice,
                &CreateArticle {
                    tag_names: vec!["rust".into(), "systems".into(), "rust".into()],
                    status: Some(ArticleStatus::Published),
                    ..input("Borrow checker tour")
                },
            )
            .unwrap();
        assert_eq!(article.tag_ids.len(), 2);
        assert!(article.published_at.is_some());

        let detail = f.service.detail(article.id).unwrap();
        assert_eq!(detail.author.username, "alice");
        let names: Vec<_> = detail.tags.iter().map(|tag| tag.name.as_str()).collect();
        assert_eq!(names, ["rust", "systems"]);

        let hits = f.index.search("borrow", Matching::Any).unwrap();
        assert_eq!(hits.first().map(|hit| hit.id), Some(article.id));
    }

    #[rstest]
    #[case::blank_title(CreateArticle { title: "   ".into(), ..input("x") })]
    #[case::long_title(CreateArticle { title: "t".repeat(256), ..input("x") })]
    #[case::blank_content(CreateArticle { content: " ".into(), ..input("Fine") })]
    #[case::long_excerpt(CreateArticle { excerpt: "e".repeat(501), ..input("Fine") })]
    #[case::archived(CreateArticle { status: Some(ArticleStatus::Archived), ..input("Fine") })]
    fn rejects_bad_input(#[case] bad: CreateArticle) {
        let f = fixture();
        assert_eq!(f.service.create(f.alice, &bad).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn unknown_references_are_not_found() {
        let f = fixture();
        assert_eq!(f.service.create(42, &input("Orphan")).unwrap_err().kind(), ErrorKind::NotFound);
        let filed = CreateArticle { category_id: Some(7), ..input("Filed") };
        assert_eq!(f.service.create(f.alice, &filed).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn broken_author_records_are_not_reported_missing() {
        let f = fixture();
        f.store.corrupt::<User>(f.alice);
        let err = f.service.create(f.alice, &input("Anything")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn edits_keep_views_counted_meanwhile() {
        let f = fixture();
        let article = f.service.create(f.alice, &input("Counted")).unwrap();
        for round in 1..=20u64 {
            let barrier = Barrier::new(2);
            thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    f.service.record_view(article.id).unwrap();
                });
                scope.spawn(|| {
                    barrier.wait();
                    let edit = UpdateArticle {
                        content: Some(format!("Revision {round}")),
                        ..UpdateArticle::default()
                    };
                    f.service.update(article.id, f.alice, &edit).unwrap();
                });
            });
            assert_eq!(f.service.get(article.id).unwrap().view_count, round);
        }
    }

    #[test]
    fn only_the_author_may_edit() {
        let f = fixture();
        let article = f.service.create(f.alice, &input("Mine")).unwrap();
        let rename = UpdateArticle { title: Some("Theirs".into()), ..UpdateArticle::default() };
        let err = f.service.update(article.id, f.bob, &rename).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(f.service.publish(article.id, f.bob).unwrap_err().kind(), ErrorKind::Unauthorized);
        assert_eq!(f.service.delete(article.id, f.bob).unwrap_err().kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn retitling_moves_the_slug() {
        let f = fixture();
        let article = f.service.create(f.alice, &input("Draft Notes")).unwrap();
        let same_slug = UpdateArticle { title: Some("Draft notes!".into()), ..UpdateArticle::default() };
        let kept = f.service.update(article.id, f.alice, &same_slug).unwrap();
        assert_eq!(kept.slug, "draft-notes");
        assert_eq!(kept.title, "Draft notes!");

        let renamed = UpdateArticle { title: Some("Final Notes".into()), ..UpdateArticle::default() };
        let moved = f.service.update(article.id, f.alice, &renamed).unwrap();
        assert_eq!(moved.slug, "final-notes");
        assert_eq!(f.service.get_by_slug("final-notes").unwrap().id, article.id);
        assert_eq!(f.service.get_by_slug("draft-notes").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn publish_time_is_stamped_once() {
        let f = fixture();
        let article = f.service.create(f.alice, &input("Once")).unwrap();
        let published = f.service.publish(article.id, f.alice).unwrap();
        let stamp = published.published_at.unwrap();

        f.service.unpublish(article.id, f.alice).unwrap();
        let archived = f.service.archive(article.id, f.alice).unwrap();
        assert_eq!(archived.status, ArticleStatus::Archived);
        let republished = f.service.publish(article.id, f.alice).unwrap();
        assert_eq!(republished.published_at, Some(stamp));
    }

    #[test]
    fn category_can_be_set_and_cleared() {
        let f = fixture();
        let category: Category = f
            .store
            .create(Category::new("Rust", "rust", "", datetime!(2024-01-01 0:00 UTC)))
            .unwrap();
        let article = f.service.create(f.alice, &input("Filed later")).unwrap();
        let file = UpdateArticle { category_id: Some(Some(category.id)), ..UpdateArticle::default() };
        assert_eq!(f.service.update(article.id, f.alice, &file).unwrap().category_id, Some(category.id));
        let unfile = UpdateArticle { category_id: Some(None), ..UpdateArticle::default() };
        assert_eq!(f.service.update(article.id, f.alice, &unfile).unwrap().category_id, None);
    }

    #[test]
    fn deleted_articles_disappear() {
        let f = fixture();
        let article = f.service.create(f.alice, &input("Ephemeral borrow")).unwrap();
        f.service.delete(article.id, f.alice).unwrap();
        assert_eq!(f.service.get(article.id).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(f.index.search("ephemeral", Matching::Any).unwrap().is_empty());
        assert_eq!(f.service.list(&ArticleFilter::default(), PageRequest::default()).unwrap().total, 0);
        assert_eq!(f.service.record_view(article.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn listing_filters_and_counts_views() {
        let f = fixture();
        let draft = f.service.create(f.alice, &input("Draft")).unwrap();
        let live = f
            .service
            .create(f.bob, &CreateArticle { status: Some(ArticleStatus::Published), ..input("Live") })
            .unwrap();
        let page = f.service.list(&ArticleFilter::published(), PageRequest::default()).unwrap();
        assert_eq!(page.items.iter().map(|a| a.id).collect::<Vec<_>>(), [live.id]);
        let mine = ArticleFilter { author_id: Some(f.alice), ..ArticleFilter::default() };
        assert_eq!(f.service.list(&mine, PageRequest::default()).unwrap().items[0].id, draft.id);

        assert_eq!(f.service.record_view(live.id).unwrap(), 1);
        assert_eq!(f.service.record_view(live.id).unwrap(), 2);
        assert_eq!(f.service.get(live.id).unwrap().view_count, 2);
    }
}
