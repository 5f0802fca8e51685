//! Records kept by the store and the DTOs built from them.

pub mod article;
pub mod category;
pub mod comment;
pub mod tag;
pub(crate) mod timestamp;
pub mod user;

pub use article::{Article, ArticleDetail, ArticleFilter, ArticleStatus};
pub use category::{Category, CategoryWithCount};
pub use comment::{Comment, CommentThread, Like, LikeStatus};
pub use tag::{Tag, TagUsage};
pub use user::{User, UserProfile};
