use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

use super::{NOTIFICATIONS_TABLE, SortOrder, StoreError, StoreGateway, USERS_TABLE};

/// In-process gateway over plain JSON tables.
///
/// Stand-in for the remote persistent store in tests and local runs, with a
/// failure toggle for outage simulation and a call counter to assert that
/// the breaker short-circuits.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    tables: Arc<RwLock<HashMap<String, Vec<Value>>>>,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicU64>,
}

impl MemoryGateway {
    /// Gateway with the standard tables present
    pub fn new() -> Self {
        let gateway = Self::empty();
        gateway.create_table(NOTIFICATIONS_TABLE);
        gateway.create_table(USERS_TABLE);
        gateway
    }

    /// Gateway with no tables at all (readiness probing fails)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn create_table(&self, name: &str) {
        self.tables.write().entry(name.to_string()).or_default();
    }

    /// Make every subsequent call fail with a transient error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of gateway calls attempted (including failed ones)
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            debug!("Memory gateway: injected transient failure");
            return Err(StoreError::Transient("injected failure".to_string()));
        }
        Ok(())
    }
}

/// A filter matches rows whose fields equal every filter field
fn matches(row: &Value, filter: &Value) -> bool {
    match filter.as_object() {
        Some(fields) => fields.iter().all(|(k, v)| row.get(k) == Some(v)),
        None => true,
    }
}

impl StoreGateway for MemoryGateway {
    async fn select(
        &self,
        table: &str,
        filter: &Value,
        limit: Option<usize>,
        order: Option<(&str, SortOrder)>,
    ) -> Result<Vec<Value>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read();
        let rows = tables.get(table).ok_or(StoreError::NotFound)?;

        let mut result: Vec<Value> = rows.iter().filter(|r| matches(r, filter)).cloned().collect();

        if let Some((field, direction)) = order {
            result.sort_by(|a, b| {
                let left = a.get(field).map(|v| v.to_string()).unwrap_or_default();
                let right = b.get(field).map(|v| v.to_string()).unwrap_or_default();
                match direction {
                    SortOrder::Ascending => left.cmp(&right),
                    SortOrder::Descending => right.cmp(&left),
                }
            });
        }
        if let Some(limit) = limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let rows = tables.get_mut(table).ok_or(StoreError::NotFound)?;
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, filter: &Value, patch: &Value) -> Result<Value, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let rows = tables.get_mut(table).ok_or(StoreError::NotFound)?;

        let row = rows
            .iter_mut()
            .find(|r| matches(r, filter))
            .ok_or(StoreError::NotFound)?;

        if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
            for (k, v) in fields {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(row.clone())
    }

    async fn count(&self, table: &str, filter: &Value) -> Result<u64, StoreError> {
        self.check_available()?;
        let tables = self.tables.read();
        let rows = tables.get(table).ok_or(StoreError::NotFound)?;
        Ok(rows.iter().filter(|r| matches(r, filter)).count() as u64)
    }
}
