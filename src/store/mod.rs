//! Storage backend contract used by the CRUD engine, with PostgreSQL and in-memory implementations.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, PgStore};

use crate::config::{ResolvedEntity, SortSpec};
use crate::error::AppError;
use crate::record::{Record, RecordKey};
use async_trait::async_trait;
use serde_json::Value;

/// One statement per call; each call is atomic on its own. A unique-constraint violation on
/// `insert` or `update` is reported as `AppError::Conflict`.
#[async_trait]
pub trait Store: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<(), AppError>;

    /// Window `[skip, skip + limit)` of the rows, ordered by `sort` when given, storage order otherwise.
    async fn list(
        &self,
        entity: &ResolvedEntity,
        sort: Option<&SortSpec>,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Record>, AppError>;

    async fn fetch(&self, entity: &ResolvedEntity, key: &RecordKey) -> Result<Option<Record>, AppError>;

    /// First row whose `column` equals `value`.
    async fn find_by(
        &self,
        entity: &ResolvedEntity,
        column: &str,
        value: &Value,
    ) -> Result<Option<Record>, AppError>;

    async fn insert(&self, entity: &ResolvedEntity, record: &Record) -> Result<Record, AppError>;

    /// Overwrite the columns present in `changes`. None when no row has `key`.
    async fn update(
        &self,
        entity: &ResolvedEntity,
        key: &RecordKey,
        changes: &Record,
    ) -> Result<Option<Record>, AppError>;

    /// Remove the row. None when no row has `key`.
    async fn delete(&self, entity: &ResolvedEntity, key: &RecordKey) -> Result<Option<Record>, AppError>;
}
