//! Document-store boundary.
//!
//! The jobs talk to the farm's document collections only through the
//! [`DocumentStore`] trait. Production runs use [`PgDocumentStore`], which keeps
//! each collection as JSONB rows in PostgreSQL; unit tests use the in-memory
//! store.
//!
//! Besides plain reads and writes, the trait exposes one atomic primitive,
//! [`DocumentStore::update_where`], used for every read-modify-write on
//! authoritative aggregates (daily totals, monthly summaries).

use std::cmp::Ordering;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

#[cfg(test)]
mod memory;
mod postgres;

#[cfg(test)]
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

// ---

/// Field map of a single document.
pub type Fields = Map<String, Value>;

/// Computes the patch for [`DocumentStore::update_where`] from the current
/// document fields, or from `None` when no document matches yet. An error
/// aborts the update and leaves the store untouched.
pub type UpdateFn<'a> = &'a (dyn Fn(Option<&Fields>) -> Result<Fields> + Send + Sync);

/// A stored document with its store-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    // ---
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ---
    /// Every document of a collection, in insertion order.
    async fn list(&self, collection: &str) -> Result<Vec<Document>>;

    /// Documents whose `field` equals `value`, in insertion order.
    async fn find_eq(&self, collection: &str, field: &str, value: &Value)
        -> Result<Vec<Document>>;

    /// Up to `limit` documents ordered by `order_by` descending. Documents
    /// lacking the field sort last.
    async fn latest(&self, collection: &str, order_by: &str, limit: usize)
        -> Result<Vec<Document>>;

    /// Insert a new document and return its id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String>;

    /// Merge `fields` into an existing document; untouched fields are kept.
    async fn merge(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Atomically locate the first document with `field == value` and merge
    /// `apply(Some(current))` into it, or insert `apply(None)` as a new
    /// document if none exists. Returns the resulting document.
    async fn update_where(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        apply: UpdateFn<'_>,
    ) -> Result<Document>;
}

/// Descending order on JSON values with missing values last. Numbers compare
/// numerically, everything else by its string form.
pub(crate) fn cmp_desc(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    // ---
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            y.partial_cmp(&x).unwrap_or(Ordering::Equal)
        }
        (Some(x), Some(y)) => value_text(y).cmp(&value_text(x)),
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
