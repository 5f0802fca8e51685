//! A blog engine: articles, categories, tags, comments and likes kept in an
//! embedded database, with full-text search, engagement rankings and a
//! publication archive on top.
//!
//! Open a [`Blog`] from a directory holding a `Quire.toml` manifest, or build a
//! throwaway one with [`Blog::in_memory`], and reach every use case through its
//! service accessors.

pub mod archive;
pub mod blog;
pub mod config;
pub mod index;
pub mod pagination;
pub mod ranking;
pub mod search;
pub mod service;
pub mod slug;
pub mod store;
pub mod types;
pub mod validation;

mod error;

pub use blog::Blog;
pub use error::{Error, ErrorKind, Result, StoreResultExt};
