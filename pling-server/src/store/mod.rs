pub mod memory;

pub use memory::MemoryGateway;

use serde_json::Value;
use std::future::Future;
use thiserror::Error;

/// Table holding persisted notifications
pub const NOTIFICATIONS_TABLE: &str = "notifications";
/// Table holding user profiles
pub const USERS_TABLE: &str = "users";

/// Persistent-store failure taxonomy.
///
/// The facade only distinguishes `NotFound` (readiness probing) from the
/// rest; the circuit breaker treats every variant as a failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("row or table not found")]
    NotFound,

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("permanent store failure: {0}")]
    Permanent(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Narrow query/insert/update contract over the remote persistent store.
///
/// Filters and rows are JSON objects; a filter matches rows whose fields
/// equal every filter field.
pub trait StoreGateway: Send + Sync {
    fn select(
        &self,
        table: &str,
        filter: &Value,
        limit: Option<usize>,
        order: Option<(&str, SortOrder)>,
    ) -> impl Future<Output = Result<Vec<Value>, StoreError>> + Send;

    fn insert(
        &self,
        table: &str,
        row: Value,
    ) -> impl Future<Output = Result<Value, StoreError>> + Send;

    fn update(
        &self,
        table: &str,
        filter: &Value,
        patch: &Value,
    ) -> impl Future<Output = Result<Value, StoreError>> + Send;

    fn count(
        &self,
        table: &str,
        filter: &Value,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}
