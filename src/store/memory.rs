//! In-memory document store for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{cmp_desc, Document, DocumentStore, Fields, UpdateFn};

// ---

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    failing: Mutex<HashSet<String>>,
    next_id: Mutex<u64>,
}

impl MemoryStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `collection` fail from now on.
    pub fn fail_writes_to(&self, collection: &str) {
        self.failing.lock().unwrap().insert(collection.to_string());
    }

    /// Let writes succeed again everywhere.
    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Snapshot of a collection, in insertion order.
    pub fn docs(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Insert a document directly, bypassing failure injection.
    pub fn seed(&self, collection: &str, fields: Value) -> String {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        self.insert(collection, fields)
    }

    fn allocate_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("doc-{}", *next)
    }

    fn insert(&self, collection: &str, fields: Fields) -> String {
        // ---
        let id = self.allocate_id();
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                fields,
            });
        id
    }

    fn check_writable(&self, collection: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(collection) {
            return Err(anyhow!("injected write failure on {}", collection));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    // ---
    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self.docs(collection))
    }

    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        Ok(self
            .docs(collection)
            .into_iter()
            .filter(|d| d.get(field) == Some(value))
            .collect())
    }

    async fn latest(
        &self,
        collection: &str,
        order_by: &str,
        limit: usize,
    ) -> Result<Vec<Document>> {
        // ---
        let mut docs = self.docs(collection);
        // Stable sort keeps insertion order among ties; reverse first so the
        // newest insert wins like `created_at DESC`.
        docs.reverse();
        docs.sort_by(|a, b| cmp_desc(a.get(order_by), b.get(order_by)));
        docs.truncate(limit);
        Ok(docs)
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String> {
        self.check_writable(collection)?;
        Ok(self.insert(collection, fields))
    }

    async fn merge(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        // ---
        self.check_writable(collection)?;
        let mut collections = self.collections.lock().unwrap();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| anyhow!("No document {} in {}", id, collection))?;
        doc.fields.extend(fields);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        // ---
        self.check_writable(collection)?;
        if let Some(docs) = self.collections.lock().unwrap().get_mut(collection) {
            docs.retain(|d| d.id != id);
        }
        Ok(())
    }

    async fn update_where(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        apply: UpdateFn<'_>,
    ) -> Result<Document> {
        // ---
        self.check_writable(collection)?;
        let mut collections = self.collections.lock().unwrap();
        let docs = collections.entry(collection.to_string()).or_default();

        if let Some(doc) = docs.iter_mut().find(|d| d.get(field) == Some(value)) {
            let patch = apply(Some(&doc.fields))?;
            doc.fields.extend(patch);
            return Ok(doc.clone());
        }

        let doc = Document {
            id: self.allocate_id(),
            fields: apply(None)?,
        };
        docs.push(doc.clone());
        Ok(doc)
    }
}
