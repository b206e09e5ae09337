//! Optional remote replica
//!
//! A document-store abstraction the acquisition loop replicates events into
//! when one is configured. The trait is deliberately small: upsert and a
//! filtered query. `MemoryRemote` backs tests and offline runs.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::RemoteError;

/// Field comparison operators for remote queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A single `field <op> value` predicate.
#[derive(Debug, Clone)]
pub struct QueryFilter {
    pub field: String,
    pub comparator: Comparator,
    pub value: Value,
}

impl QueryFilter {
    pub fn new(field: impl Into<String>, comparator: Comparator, value: Value) -> Self {
        Self {
            field: field.into(),
            comparator,
            value,
        }
    }

    fn matches(&self, doc: &Value) -> bool {
        // A document without the field differs from every value: only Ne
        // matches it.
        let Some(actual) = doc.get(&self.field) else {
            return self.comparator == Comparator::Ne;
        };
        let ordering = compare_values(actual, &self.value);
        match (self.comparator, ordering) {
            (Comparator::Eq, Some(o)) => o == std::cmp::Ordering::Equal,
            (Comparator::Ne, Some(o)) => o != std::cmp::Ordering::Equal,
            (Comparator::Ne, None) => true,
            (Comparator::Lt, Some(o)) => o == std::cmp::Ordering::Less,
            (Comparator::Le, Some(o)) => o != std::cmp::Ordering::Greater,
            (Comparator::Gt, Some(o)) => o == std::cmp::Ordering::Greater,
            (Comparator::Ge, Some(o)) => o != std::cmp::Ordering::Less,
            (_, None) => false,
        }
    }
}

/// Numbers compare numerically, everything else by string form.
fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => {
            let x = a.as_str().map(str::to_string).unwrap_or_else(|| a.to_string());
            let y = b.as_str().map(str::to_string).unwrap_or_else(|| b.to_string());
            Some(x.cmp(&y))
        }
    }
}

/// Write/read interface to a remote document store.
pub trait RemoteStore: Send + Sync {
    /// Whether the backing service is reachable. Callers skip replication
    /// (without failing) when this returns false.
    fn is_available(&self) -> bool;

    /// Insert or overwrite a document. With no `id`, the store assigns one.
    /// When `with_server_timestamp` is set, an `updated_at` field is stamped
    /// on the stored copy.
    fn upsert(
        &self,
        collection: &str,
        doc: Value,
        id: Option<&str>,
        with_server_timestamp: bool,
    ) -> Result<String, RemoteError>;

    /// Filtered query. `order_by` takes `"field"` or `"field desc"`.
    fn query(
        &self,
        collection: &str,
        filters: &[QueryFilter],
        order_by: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, RemoteError>;
}

/// In-memory `RemoteStore`. Used by tests and as the stand-in when no real
/// remote is configured but replication code paths should still run.
pub struct MemoryRemote {
    collections: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    available: Mutex<bool>,
    next_id: Mutex<u64>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(BTreeMap::new()),
            available: Mutex::new(true),
            next_id: Mutex::new(1),
        }
    }

    /// Simulate an outage. Subsequent calls fail with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        *self.available.lock() = available;
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

impl RemoteStore for MemoryRemote {
    fn is_available(&self) -> bool {
        *self.available.lock()
    }

    fn upsert(
        &self,
        collection: &str,
        mut doc: Value,
        id: Option<&str>,
        with_server_timestamp: bool,
    ) -> Result<String, RemoteError> {
        if !self.is_available() {
            return Err(RemoteError::Unavailable);
        }

        let id = match id {
            Some(id) => id.to_string(),
            None => {
                let mut next = self.next_id.lock();
                let id = format!("doc-{next:08}");
                *next += 1;
                id
            }
        };

        if with_server_timestamp {
            if let Value::Object(map) = &mut doc {
                map.insert("updated_at".into(), Value::String(Utc::now().to_rfc3339()));
            }
        }

        debug!(collection, id = %id, "remote upsert");
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), doc);
        Ok(id)
    }

    fn query(
        &self,
        collection: &str,
        filters: &[QueryFilter],
        order_by: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, RemoteError> {
        if !self.is_available() {
            return Err(RemoteError::Unavailable);
        }

        let collections = self.collections.lock();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<Value> = docs
            .values()
            .filter(|doc| filters.iter().all(|f| f.matches(doc)))
            .cloned()
            .collect();

        if let Some(order) = order_by {
            let (field, descending) = match order.strip_suffix(" desc") {
                Some(field) => (field, true),
                None => (order, false),
            };
            results.sort_by(|a, b| {
                let av = a.get(field).unwrap_or(&Value::Null);
                let bv = b.get(field).unwrap_or(&Value::Null);
                let ord = compare_values(av, bv).unwrap_or(std::cmp::Ordering::Equal);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        if let Some(limit) = limit {
            results.truncate(limit);
        }
        Ok(results)
    }
}
