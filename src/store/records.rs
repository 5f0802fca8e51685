//! How each entity is stored: table, unique fields and soft deletion.

use redb::{TableDefinition, WriteTransaction};
use time::OffsetDateTime;

use super::{Record, StoreError, create_record_tables, load_in};
use crate::types::{Article, Category, Comment, Tag, User};

pub(super) fn create_tables(txn: &WriteTransaction) -> Result<(), StoreError> {
    create_record_tables::<Article>(txn)?;
    create_record_tables::<Category>(txn)?;
    create_record_tables::<Tag>(txn)?;
    create_record_tables::<User>(txn)?;
    create_record_tables::<Comment>(txn)?;
    Ok(())
}

impl Record for Article {
    const ENTITY: &'static str = "article";
    const TABLE: TableDefinition<'static, u64, &'static [u8]> = TableDefinition::new("articles");
    const UNIQUE: &'static [&'static str] = &["slug"];

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("slug", self.slug.clone())]
    }

    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Counters only move through [`Store::increment`](super::Store::increment)
    /// and the like/comment operations; a deletion is never undone by a write.
    fn keep_from(&mut self, stored: &Self) {
        self.view_count = stored.view_count;
        self.like_count = stored.like_count;
        self.comment_count = stored.comment_count;
        if stored.deleted_at.is_some() {
            self.deleted_at = stored.deleted_at;
        }
    }

    fn check_references(&self, txn: &WriteTransaction) -> Result<(), StoreError> {
        let Some(category_id) = self.category_id else {
            return Ok(());
        };
        if self.is_deleted() || load_in::<Category>(txn, category_id)?.is_some() {
            return Ok(());
        }
        Err(StoreError::MissingReference {
            entity: Category::ENTITY,
            id: category_id,
        })
    }
}

impl Record for Category {
    const ENTITY: &'static str = "category";
    const TABLE: TableDefinition<'static, u64, &'static [u8]> =
        TableDefinition::new("categories");
    const UNIQUE: &'static [&'static str] = &["name", "slug"];

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("name", self.name.clone()), ("slug", self.slug.clone())]
    }
}

impl Record for Tag {
    const ENTITY: &'static str = "tag";
    const TABLE: TableDefinition<'static, u64, &'static [u8]> = TableDefinition::new("tags");
    const UNIQUE: &'static [&'static str] = &["name", "slug"];

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("name", self.name.clone()), ("slug", self.slug.clone())]
    }
}

impl Record for User {
    const ENTITY: &'static str = "user";
    const TABLE: TableDefinition<'static, u64, &'static [u8]> = TableDefinition::new("users");
    const UNIQUE: &'static [&'static str] = &["username", "email"];

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![
            ("username", self.username.clone()),
            ("email", self.email.clone()),
        ]
    }
}

impl Record for Comment {
    const ENTITY: &'static str = "comment";
    const TABLE: TableDefinition<'static, u64, &'static [u8]> = TableDefinition::new("comments");

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    fn keep_from(&mut self, stored: &Self) {
        if stored.deleted_at.is_some() {
            self.deleted_at = stored.deleted_at;
        }
    }
}
