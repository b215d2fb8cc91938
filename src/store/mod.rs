//! Persistence store abstraction: transactional key/row access by entity.
//!
//! The dispatch core only sees these traits. A [`StoreScope`] is opened fresh
//! for each request and released when dropped, on every exit path.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::descriptor::EntityDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Store-assigned primary key.
pub type Key = i64;

/// One row: field name to JSON value, primary key included once persisted.
pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("no row for key")]
    NotFound,
    #[error("constraint violation: {0}")]
    Conflict(String),
    #[error("backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Open a scope for one request's worth of calls.
    async fn scope(&self) -> Result<Box<dyn StoreScope>, StoreError>;
}

/// Single-call-transactional row operations, addressed by entity descriptor.
#[async_trait]
pub trait StoreScope: Send {
    /// Persist a new record; the store assigns the primary key and returns
    /// the record with it set.
    async fn insert(
        &mut self,
        entity: &EntityDescriptor,
        record: Record,
    ) -> Result<Record, StoreError>;

    async fn get(
        &mut self,
        entity: &EntityDescriptor,
        key: Key,
    ) -> Result<Option<Record>, StoreError>;

    async fn list(&mut self, entity: &EntityDescriptor) -> Result<Vec<Record>, StoreError>;

    /// Overwrite the row addressed by the primary key carried in `record`.
    async fn update(
        &mut self,
        entity: &EntityDescriptor,
        record: Record,
    ) -> Result<Record, StoreError>;

    /// Remove the row; `NotFound` if there is none.
    async fn delete(&mut self, entity: &EntityDescriptor, key: Key) -> Result<(), StoreError>;
}
