//! Process-local document store.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use serde_json::Value;

use crate::document::validate_field;
use crate::{DocId, Document, DocumentStore, Filter, StoreError};

#[derive(Default)]
struct Inner {
    next_id: i64,
    collections: BTreeMap<String, Vec<(DocId, Document)>>,
}

/// In-memory store. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Other("memory store lock poisoned".into()))
    }
}

impl DocumentStore for MemoryStore {
    fn insert_one(&self, collection: &str, doc: Document) -> Result<DocId, StoreError> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = DocId(inner.next_id);
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .push((id, doc));
        Ok(id)
    }

    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<(DocId, Document)>, StoreError> {
        filter.validate()?;
        let inner = self.lock()?;
        Ok(inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, d)| filter.matches(d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn update_one(&self, collection: &str, id: DocId, set: Document) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let doc = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|(i, _)| *i == id))
            .map(|(_, d)| d)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id,
            })?;
        for (k, v) in set {
            doc.insert(k, v);
        }
        Ok(())
    }

    fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: &Filter,
    ) -> Result<Vec<Value>, StoreError> {
        validate_field(field)?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (_, doc) in self.find(collection, filter)? {
            if let Some(v) = doc.get(field)
                && seen.insert(v.to_string())
            {
                out.push(v.clone());
            }
        }
        Ok(out)
    }
}
