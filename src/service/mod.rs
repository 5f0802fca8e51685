//! Use cases over the store and the search index.
//!
//! Each service validates its input, talks to the store through the capability
//! traits, and keeps the search index in step with article writes.

mod article;
mod auth;
mod category;
mod comment;
mod like;
mod statistics;
mod tag;
mod user;

pub use article::{ArticleService, CreateArticle, UpdateArticle};
pub use auth::{AuthService, Claims, Registration, Session, TokenKind, TokenPair, generate_secret, hash_password, verify_password};
pub use category::{CategoryInput, CategoryService};
pub use comment::CommentService;
pub use like::LikeService;
pub use statistics::{ArticleStats, AuthorSummary, Period, PeriodStats, StatisticsService, Totals};
pub use tag::{TagResolver, TagService, TagStore};
pub use user::{ProfileUpdate, UserService};
