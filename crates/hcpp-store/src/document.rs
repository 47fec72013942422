//! Document-store interface shared by every backend.
//!
//! Documents are flat JSON objects grouped into named collections. The store
//! enforces no key uniqueness: callers that need "one record per package"
//! must query before inserting.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::StoreError;

/// A stored document body.
pub type Document = Map<String, Value>;

/// Store-assigned identifier of one document within its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(pub i64);

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Query predicate over top-level document fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(String, Value),
    Exists(String),
    Missing(String),
    IsArray(String),
    NonEmptyArray(String),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::Eq(field.to_string(), value.into())
    }

    pub fn exists(field: &str) -> Self {
        Self::Exists(field.to_string())
    }

    pub fn missing(field: &str) -> Self {
        Self::Missing(field.to_string())
    }

    pub fn is_array(field: &str) -> Self {
        Self::IsArray(field.to_string())
    }

    pub fn non_empty_array(field: &str) -> Self {
        Self::NonEmptyArray(field.to_string())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::All => other,
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Evaluate against a document held in memory.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Eq(field, value) => doc.get(field) == Some(value),
            Self::Exists(field) => doc.contains_key(field),
            Self::Missing(field) => !doc.contains_key(field),
            Self::IsArray(field) => doc.get(field).is_some_and(Value::is_array),
            Self::NonEmptyArray(field) => doc
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|a| !a.is_empty()),
            Self::And(parts) => parts.iter().all(|f| f.matches(doc)),
        }
    }

    /// Check every field name is a plain identifier (`[A-Za-z0-9_]+`).
    pub fn validate(&self) -> Result<(), StoreError> {
        match self {
            Self::All => Ok(()),
            Self::Eq(field, _)
            | Self::Exists(field)
            | Self::Missing(field)
            | Self::IsArray(field)
            | Self::NonEmptyArray(field) => validate_field(field),
            Self::And(parts) => parts.iter().try_for_each(Filter::validate),
        }
    }
}

pub(crate) fn validate_field(field: &str) -> Result<(), StoreError> {
    if !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}

/// Keyed document store: insert, filter, field-set update, count, distinct.
pub trait DocumentStore {
    fn insert_one(&self, collection: &str, doc: Document) -> Result<DocId, StoreError>;

    /// All matching documents in insertion order.
    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<(DocId, Document)>, StoreError>;

    /// Replace the given top-level fields of one document; other fields are kept.
    fn update_one(&self, collection: &str, id: DocId, set: Document) -> Result<(), StoreError>;

    fn count(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        Ok(self.find(collection, filter)?.len())
    }

    /// Distinct values of `field` among matching documents, in first-seen order.
    fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: &Filter,
    ) -> Result<Vec<Value>, StoreError>;

    fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<(DocId, Document)>, StoreError> {
        Ok(self.find(collection, filter)?.into_iter().next())
    }
}

/// Typed view of one collection.
///
/// Serializes records of type `T` into documents and back, so callers work
/// with explicit record structs instead of ad hoc key lookups.
pub struct Collection<'s, T> {
    store: &'s dyn DocumentStore,
    name: String,
    _record: PhantomData<fn() -> T>,
}

impl<'s, T> Collection<'s, T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: &'s dyn DocumentStore, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            _record: PhantomData,
        }
    }

    pub fn insert(&self, record: &T) -> Result<DocId, StoreError> {
        self.store.insert_one(&self.name, to_document(record)?)
    }

    pub fn find(&self, filter: &Filter) -> Result<Vec<(DocId, T)>, StoreError> {
        self.store
            .find(&self.name, filter)?
            .into_iter()
            .map(|(id, doc)| Ok((id, serde_json::from_value(Value::Object(doc))?)))
            .collect()
    }

    pub fn find_one(&self, filter: &Filter) -> Result<Option<(DocId, T)>, StoreError> {
        match self.store.find_one(&self.name, filter)? {
            Some((id, doc)) => Ok(Some((id, serde_json::from_value(Value::Object(doc))?))),
            None => Ok(None),
        }
    }

    pub fn exists(&self, filter: &Filter) -> Result<bool, StoreError> {
        Ok(self.store.count(&self.name, filter)? > 0)
    }

    pub fn count(&self, filter: &Filter) -> Result<usize, StoreError> {
        self.store.count(&self.name, filter)
    }

    pub fn set_fields(&self, id: DocId, fields: Document) -> Result<(), StoreError> {
        self.store.update_one(&self.name, id, fields)
    }
}

/// Serialize a record into a document body.
pub fn to_document<T: Serialize>(record: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn filter_matching() {
        let d = doc(json!({"packagename": "a", "pp_segments": ["x"], "flags": []}));
        assert!(Filter::All.matches(&d));
        assert!(Filter::eq("packagename", "a").matches(&d));
        assert!(!Filter::eq("packagename", "b").matches(&d));
        assert!(Filter::exists("flags").matches(&d));
        assert!(Filter::missing("rationale_overall").matches(&d));
        assert!(Filter::is_array("flags").matches(&d));
        assert!(!Filter::non_empty_array("flags").matches(&d));
        assert!(Filter::non_empty_array("pp_segments").matches(&d));
        assert!(!Filter::is_array("packagename").matches(&d));
    }

    #[test]
    fn and_flattens() {
        let f = Filter::All
            .and(Filter::exists("a"))
            .and(Filter::exists("b"))
            .and(Filter::missing("c"));
        match &f {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
        assert!(f.matches(&doc(json!({"a": 1, "b": 2}))));
        assert!(!f.matches(&doc(json!({"a": 1, "b": 2, "c": 3}))));
    }

    #[test]
    fn validate_rejects_paths() {
        assert!(Filter::exists("pp_segments").validate().is_ok());
        assert!(matches!(
            Filter::exists("a.b").validate(),
            Err(StoreError::InvalidField(_))
        ));
        assert!(Filter::And(vec![Filter::exists("ok"), Filter::missing("no'pe")])
            .validate()
            .is_err());
    }

    #[test]
    fn to_document_requires_object() {
        assert!(matches!(to_document(&42), Err(StoreError::NotAnObject)));
        assert_eq!(to_document(&json!({"a": 1})).unwrap()["a"], 1);
    }
}
