//! The root handle tying configuration, storage, index and services together.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::info;

use crate::{
    archive::Archive,
    config::{Config, MANIFEST},
    error::{Error, Result, StoreResultExt},
    index::SearchIndex,
    search::Searcher,
    service::{
        ArticleService, AuthService, CategoryService, CommentService, LikeService,
        StatisticsService, TagService, UserService, generate_secret,
    },
    store::{Paginator, Store},
    types::Article,
    validation::Validator,
};

/// A blog on disk:
/// ```text
/// /blog-root
/// ├── Quire.toml
/// ├── quire.redb
/// └── search_index
/// ```
#[derive(Debug, Clone)]
pub struct Blog(Arc<BlogInner>);

#[derive(Debug)]
struct BlogInner {
    root: Option<PathBuf>,
    config: Config,
    store: Arc<Store>,
    index: Arc<SearchIndex>,
    articles: ArticleService,
    auth: AuthService,
    categories: CategoryService,
    comments: CommentService,
    likes: LikeService,
    statistics: StatisticsService,
    tags: TagService,
    users: UserService,
    searcher: Searcher,
    archive: Archive,
}

impl Blog {
    /// Open the blog whose `Quire.toml` sits in `root`.
    ///
    /// # Errors
    /// Fails when the manifest is missing or invalid, has no secret, or the
    /// database or index cannot be opened.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let config = Config::from_file(root.join(MANIFEST))?;
        if config.secret().is_empty() {
            return Err(Error::validation(format!("secret must be set in {MANIFEST}")));
        }
        let store = Store::open(root.join(config.store())).during("open", "database")?;
        let index = SearchIndex::open(root.join(config.index()), config.index_writer_heap())?;
        info!(root = %root.display(), name = config.name(), "opened blog");
        Ok(Self::assemble(Some(root.to_path_buf()), config, store, index))
    }

    /// Create a new blog directory `name` under `root` with a fresh secret.
    ///
    /// # Errors
    /// Fails when the directory already exists or cannot be written.
    pub fn create(root: impl AsRef<Path>, name: &str) -> Result<Self> {
        let root = root.as_ref().join(name);
        std::fs::create_dir(&root)?;
        let config = Config::new(name).with_secret(generate_secret());
        std::fs::write(root.join(MANIFEST), config.export())?;
        info!(root = %root.display(), "created blog");
        Self::open(root)
    }

    /// A blog with no files behind it.
    ///
    /// # Errors
    /// Fails when the in-memory database or index cannot be set up.
    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Store::in_memory().during("open", "database")?;
        let index = SearchIndex::in_memory(config.index_writer_heap())?;
        Ok(Self::assemble(None, config, store, index))
    }

    fn assemble(root: Option<PathBuf>, config: Config, store: Store, index: SearchIndex) -> Self {
        let store = Arc::new(store);
        let index = Arc::new(index);
        let validator = Arc::new(Validator::new());
        Self(Arc::new(BlogInner {
            articles: ArticleService::new(Arc::clone(&store), Arc::clone(&index)),
            auth: AuthService::new(Arc::clone(&store), Arc::clone(&validator), &config),
            categories: CategoryService::new(Arc::clone(&store), Arc::clone(&validator)),
            comments: CommentService::new(Arc::clone(&store)),
            likes: LikeService::new(Arc::clone(&store)),
            statistics: StatisticsService::new(Arc::clone(&store), config.trending_window_days()),
            tags: TagService::new(Arc::clone(&store)),
            users: UserService::new(Arc::clone(&store), validator),
            searcher: Searcher::new(Arc::clone(&store), Arc::clone(&index)),
            archive: Archive::new(Arc::clone(&store)),
            root,
            config,
            store,
            index,
        }))
    }

    /// `None` for in-memory blogs.
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.0.root.as_deref()
    }

    /// The manifest this blog was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.0.config
    }

    #[must_use]
    pub fn articles(&self) -> &ArticleService {
        &self.0.articles
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.0.auth
    }

    #[must_use]
    pub fn categories(&self) -> &CategoryService {
        &self.0.categories
    }

    #[must_use]
    pub fn comments(&self) -> &CommentService {
        &self.0.comments
    }

    #[must_use]
    pub fn likes(&self) -> &LikeService {
        &self.0.likes
    }

    #[must_use]
    pub fn statistics(&self) -> &StatisticsService {
        &self.0.statistics
    }

    #[must_use]
    pub fn tags(&self) -> &TagService {
        &self.0.tags
    }

    #[must_use]
    pub fn users(&self) -> &UserService {
        &self.0.users
    }

    #[must_use]
    pub fn searcher(&self) -> &Searcher {
        &self.0.searcher
    }

    #[must_use]
    pub fn archive(&self) -> &Archive {
        &self.0.archive
    }

    /// Rebuild the search index from every live article in the store.
    ///
    /// # Errors
    /// Store or index failures.
    pub fn reindex(&self) -> Result<usize> {
        let articles: Vec<Article> = self
            .0
            .store
            .list(|_: &Article| true)
            .during("list", "article")?;
        let indexed = self.0.index.rebuild(&articles)?;
        info!(indexed, "search index rebuilt");
        Ok(indexed)
    }
}
