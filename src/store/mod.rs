//! Embedded persistence over `redb`.
//!
//! Every entity lives in its own table as a `bincode` blob keyed by id. Unique
//! fields get a side table mapping the field value to the owning id; those tables
//! are checked and written inside the same write transaction as the record, so a
//! racing duplicate surfaces as [`StoreError::Duplicate`].

mod article;
mod records;

use std::{fmt, path::Path};

use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
    backends::InMemoryBackend,
};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::pagination::{Page, PageRequest};

pub use article::{Counter, MonthBucket};

const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Failures of the embedded store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("duplicate {field} `{value}`")]
    Duplicate { field: &'static str, value: String },
    #[error("cannot open database: {0}")]
    Database(#[from] redb::DatabaseError),
    #[error("cannot begin transaction: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("cannot open table: {0}")]
    Table(#[from] redb::TableError),
    #[error("storage failure: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("cannot commit: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("corrupted record: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("{entity} {id} does not exist")]
    MissingReference { entity: &'static str, id: u64 },
    #[error("still referenced by {count} {entity} records")]
    Referenced { entity: &'static str, count: u64 },
}

/// Something the store can persist.
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Human name, used in errors and logs.
    const ENTITY: &'static str;
    const TABLE: TableDefinition<'static, u64, &'static [u8]>;
    /// Fields backed by a unique index.
    const UNIQUE: &'static [&'static str] = &[];

    fn id(&self) -> u64;
    fn set_id(&mut self, id: u64);
    fn created_at(&self) -> OffsetDateTime;

    /// Current `(field, value)` for every entry of [`Record::UNIQUE`].
    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Soft-deleted records are hidden from lookups and listings but keep their
    /// unique values reserved.
    fn is_deleted(&self) -> bool {
        false
    }

    /// Take the fields the store maintains itself from the `stored` version
    /// before it is overwritten.
    fn keep_from(&mut self, _stored: &Self) {}

    /// Verify the records this one points at, inside the transaction that
    /// writes it.
    ///
    /// # Errors
    /// [`StoreError::MissingReference`] for a dangling reference.
    fn check_references(&self, _txn: &WriteTransaction) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Insert records.
pub trait Creator<T: Record> {
    /// Insert `record` under a freshly allocated id and return it with the id set.
    ///
    /// # Errors
    /// [`StoreError::Duplicate`] when a unique field is already taken.
    fn create(&self, record: T) -> Result<T, StoreError>;
}

/// Read live records.
pub trait Finder<T: Record> {
    /// # Errors
    /// [`StoreError::NotFound`] for missing and soft-deleted records.
    fn find(&self, id: u64) -> Result<T, StoreError>;

    /// Look a record up by one of its unique fields.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] for missing and soft-deleted records.
    fn find_by(&self, field: &'static str, value: &str) -> Result<T, StoreError>;

    /// Whether `value` is reserved on `field`, soft-deleted owners included.
    ///
    /// # Errors
    /// Storage failures only.
    fn exists_by(&self, field: &'static str, value: &str) -> Result<bool, StoreError>;

    /// Load every live record of `ids`, in the given order, skipping the rest.
    ///
    /// # Errors
    /// Storage failures only.
    fn find_many(&self, ids: &[u64]) -> Result<Vec<T>, StoreError>;
}

/// Overwrite and delete records.
pub trait Updater<T: Record> {
    /// Overwrite the stored record with the same id, moving its unique index
    /// entries along, and return what was written. Store-maintained fields such
    /// as counters keep their stored values.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if there is no such record, [`StoreError::Duplicate`]
    /// if a changed unique field collides with another record.
    fn update(&self, record: &T) -> Result<T, StoreError>;

    /// Delete a record for good, releasing its unique values.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if there is no such record.
    fn remove(&self, id: u64) -> Result<T, StoreError>;
}

/// Filtered listings.
pub trait Paginator<T: Record> {
    /// Every live record accepted by `filter`, in id order.
    ///
    /// # Errors
    /// Storage failures only.
    fn list(&self, filter: impl Fn(&T) -> bool) -> Result<Vec<T>, StoreError>;

    /// # Errors
    /// Storage failures only.
    fn count(&self, filter: impl Fn(&T) -> bool) -> Result<u64, StoreError> {
        Ok(self.list(filter)?.len() as u64)
    }

    /// Live records accepted by `filter`, newest first, cut to `page`.
    ///
    /// # Errors
    /// Storage failures only.
    fn paginate(
        &self,
        filter: impl Fn(&T) -> bool,
        page: PageRequest,
    ) -> Result<Page<T>, StoreError> {
        let mut records = self.list(filter)?;
        newest_first(&mut records);
        Ok(page.window(records))
    }
}

/// Sort by creation time, newest first; ids break ties so later inserts win.
pub fn newest_first<T: Record>(records: &mut [T]) {
    records.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id().cmp(&a.id()))
    });
}

/// The embedded database. Every capability trait is implemented once here for all [`Record`] types.
pub struct Store {
    db: Database,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) a database file.
    ///
    /// # Errors
    /// Fails when the file cannot be opened or the tables cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened store");
        Self::init(db)
    }

    /// A throwaway store that lives in memory.
    ///
    /// # Errors
    /// Fails when the tables cannot be created.
    pub fn in_memory() -> Result<Self, StoreError> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, StoreError> {
        let txn = db.begin_write()?;
        txn.open_table(SEQUENCES)?;
        records::create_tables(&txn)?;
        article::create_tables(&txn)?;
        txn.commit()?;
        Ok(Self { db })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

fn index_name(entity: &str, field: &str) -> String {
    format!("{entity}_by_{field}")
}

fn create_record_tables<T: Record>(txn: &WriteTransaction) -> Result<(), StoreError> {
    txn.open_table(T::TABLE)?;
    for field in T::UNIQUE {
        let name = index_name(T::ENTITY, field);
        txn.open_table(TableDefinition::<&str, u64>::new(&name))?;
    }
    Ok(())
}

fn next_id(txn: &WriteTransaction, entity: &str) -> Result<u64, StoreError> {
    let mut sequences = txn.open_table(SEQUENCES)?;
    let current = sequences.get(entity)?.map_or(0, |value| value.value());
    let next = current + 1;
    sequences.insert(entity, next)?;
    Ok(next)
}

/// Load a record inside a write transaction, soft-deleted ones included.
fn load_in<T: Record>(txn: &WriteTransaction, id: u64) -> Result<Option<T>, StoreError> {
    let table = txn.open_table(T::TABLE)?;
    let bytes = table.get(id)?;
    bytes.map(|bytes| decode(bytes.value())).transpose()
}

fn insert_in<T: Record>(txn: &WriteTransaction, mut record: T) -> Result<T, StoreError> {
    let id = next_id(txn, T::ENTITY)?;
    record.set_id(id);
    record.check_references(txn)?;
    reserve_unique(txn, &record, None)?;
    let mut table = txn.open_table(T::TABLE)?;
    table.insert(id, encode(&record)?.as_slice())?;
    Ok(record)
}

fn save_in<T: Record>(txn: &WriteTransaction, record: &T) -> Result<T, StoreError> {
    let previous = load_in::<T>(txn, record.id())?.ok_or(StoreError::NotFound)?;
    let mut record = record.clone();
    record.keep_from(&previous);
    record.check_references(txn)?;
    reserve_unique(txn, &record, Some(&previous))?;
    let mut table = txn.open_table(T::TABLE)?;
    table.insert(record.id(), encode(&record)?.as_slice())?;
    Ok(record)
}

/// Claim every unique value of `record`, releasing the values `previous` held on
/// fields that changed.
fn reserve_unique<T: Record>(
    txn: &WriteTransaction,
    record: &T,
    previous: Option<&T>,
) -> Result<(), StoreError> {
    let old_keys = previous.map(Record::unique_keys).unwrap_or_default();
    for (field, value) in record.unique_keys() {
        let old = old_keys
            .iter()
            .find(|(old_field, _)| *old_field == field)
            .map(|(_, old_value)| old_value.as_str());
        if old == Some(value.as_str()) {
            continue;
        }

        let name = index_name(T::ENTITY, field);
        let mut index = txn.open_table(TableDefinition::<&str, u64>::new(&name))?;
        let owner = index.get(value.as_str())?.map(|owner| owner.value());
        if owner.is_some_and(|owner| owner != record.id()) {
            warn!(entity = T::ENTITY, field, value, "unique value already taken");
            return Err(StoreError::Duplicate { field, value });
        }
        if let Some(old) = old {
            index.remove(old)?;
        }
        index.insert(value.as_str(), record.id())?;
    }
    Ok(())
}

fn release_unique<T: Record>(txn: &WriteTransaction, record: &T) -> Result<(), StoreError> {
    for (field, value) in record.unique_keys() {
        let name = index_name(T::ENTITY, field);
        let mut index = txn.open_table(TableDefinition::<&str, u64>::new(&name))?;
        index.remove(value.as_str())?;
    }
    Ok(())
}

impl<T: Record> Creator<T> for Store {
    fn create(&self, record: T) -> Result<T, StoreError> {
        let txn = self.db.begin_write()?;
        let record = insert_in(&txn, record)?;
        txn.commit()?;
        debug!(entity = T::ENTITY, id = record.id(), "record created");
        Ok(record)
    }
}

impl<T: Record> Finder<T> for Store {
    fn find(&self, id: u64) -> Result<T, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(T::TABLE)?;
        let bytes = table.get(id)?.ok_or(StoreError::NotFound)?;
        let record: T = decode(bytes.value())?;
        if record.is_deleted() {
            return Err(StoreError::NotFound);
        }
        Ok(record)
    }

    fn find_by(&self, field: &'static str, value: &str) -> Result<T, StoreError> {
        let id = {
            let txn = self.db.begin_read()?;
            let name = index_name(T::ENTITY, field);
            let index = txn.open_table(TableDefinition::<&str, u64>::new(&name))?;
            let owner = index.get(value)?.ok_or(StoreError::NotFound)?;
            owner.value()
        };
        self.find(id)
    }

    fn exists_by(&self, field: &'static str, value: &str) -> Result<bool, StoreError> {
        let txn = self.db.begin_read()?;
        let name = index_name(T::ENTITY, field);
        let index = txn.open_table(TableDefinition::<&str, u64>::new(&name))?;
        Ok(index.get(value)?.is_some())
    }

    fn find_many(&self, ids: &[u64]) -> Result<Vec<T>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(T::TABLE)?;
        let mut records = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(bytes) = table.get(id)? {
                let record: T = decode(bytes.value())?;
                if !record.is_deleted() {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}

impl<T: Record> Updater<T> for Store {
    fn update(&self, record: &T) -> Result<T, StoreError> {
        let txn = self.db.begin_write()?;
        let record = save_in(&txn, record)?;
        txn.commit()?;
        Ok(record)
    }

    fn remove(&self, id: u64) -> Result<T, StoreError> {
        let txn = self.db.begin_write()?;
        let record = load_in::<T>(&txn, id)?.ok_or(StoreError::NotFound)?;
        release_unique(&txn, &record)?;
        {
            let mut table = txn.open_table(T::TABLE)?;
            table.remove(id)?;
        }
        txn.commit()?;
        debug!(entity = T::ENTITY, id, "record removed");
        Ok(record)
    }
}

impl<T: Record> Paginator<T> for Store {
    fn list(&self, filter: impl Fn(&T) -> bool) -> Result<Vec<T>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(T::TABLE)?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, bytes) = entry?;
            let record: T = decode(bytes.value())?;
            if !record.is_deleted() && filter(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
impl Store {
    /// Replace a record's bytes with something that cannot be decoded.
    pub(crate) fn corrupt<T: Record>(&self, id: u64) {
        let txn = self.db.begin_write().unwrap();
        {
            let mut table = txn.open_table(T::TABLE).unwrap();
            table.insert(id, [0xFF_u8; 3].as_slice()).unwrap();
        }
        txn.commit().unwrap();
    }
}
