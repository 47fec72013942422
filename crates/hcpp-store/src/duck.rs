//! DuckDB-backed document store.

use std::path::Path;

use arrow::record_batch::RecordBatch;
use duckdb::{Connection, params, params_from_iter};
use serde_json::Value;
use tracing::{debug, info};

use crate::document::validate_field;
use crate::{DocId, Document, DocumentStore, Filter, StoreError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
    collection VARCHAR NOT NULL,
    id         BIGINT  NOT NULL,
    body       JSON    NOT NULL
)";

/// DuckDB store holding every collection in one `documents` table.
///
/// Each row is `(collection, id, body)` with the document as a JSON value.
/// Filters are translated to DuckDB JSON functions over top-level keys.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// Use [`open`](Self::open) for in-memory and [`open_persistent`](Self::open_persistent)
/// for a database file that survives across runs, which is what makes
/// re-running a batch job skip already-annotated packages.
pub struct DuckStore {
    conn: Connection,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "opened document store");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Total number of documents across all collections.
    pub fn total_count(&self) -> Result<usize, StoreError> {
        self.count_where("TRUE", Vec::new())
    }

    fn next_id(&self, collection: &str) -> Result<i64, StoreError> {
        let id = self.conn.query_row(
            "SELECT (coalesce(max(id), 0) + 1)::BIGINT FROM documents WHERE collection = ?",
            [collection],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(id)
    }

    fn count_where(&self, where_sql: &str, params: Vec<String>) -> Result<usize, StoreError> {
        let sql = format!("SELECT count(*)::BIGINT AS cnt FROM documents WHERE {where_sql}");
        let mut stmt = self.conn.prepare(&sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow(params_from_iter(params))?.collect();
        let batch = batches
            .first()
            .ok_or_else(|| StoreError::Other("count returned no batch".into()))?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }
}

/// Translate a filter into a SQL predicate, appending bound values to `params`.
///
/// Field names are validated as identifiers before being inlined into JSON paths.
fn filter_sql(filter: &Filter, params: &mut Vec<String>) -> Result<String, StoreError> {
    let path = |field: &str| -> Result<String, StoreError> {
        validate_field(field)?;
        Ok(format!("'$.{field}'"))
    };
    let sql = match filter {
        Filter::All => "TRUE".to_string(),
        Filter::Eq(field, value) => {
            params.push(value.to_string());
            format!("json_extract(body, {})::VARCHAR = ?", path(field)?)
        }
        Filter::Exists(field) => format!("json_extract(body, {}) IS NOT NULL", path(field)?),
        Filter::Missing(field) => format!("json_extract(body, {}) IS NULL", path(field)?),
        Filter::IsArray(field) => format!("json_type(body, {}) = 'ARRAY'", path(field)?),
        Filter::NonEmptyArray(field) => {
            let p = path(field)?;
            format!("(json_type(body, {p}) = 'ARRAY' AND json_array_length(body, {p}) > 0)")
        }
        Filter::And(parts) if parts.is_empty() => "TRUE".to_string(),
        Filter::And(parts) => {
            let clauses = parts
                .iter()
                .map(|p| filter_sql(p, params).map(|s| format!("({s})")))
                .collect::<Result<Vec<_>, _>>()?;
            clauses.join(" AND ")
        }
    };
    Ok(sql)
}

/// `collection = ? AND (<filter>)` with the collection as the first parameter.
fn scoped(collection: &str, filter: &Filter) -> Result<(String, Vec<String>), StoreError> {
    let mut params = vec![collection.to_string()];
    let predicate = filter_sql(filter, &mut params)?;
    Ok((format!("collection = ? AND ({predicate})"), params))
}

fn parse_body(raw: &str) -> Result<Document, StoreError> {
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject),
    }
}

impl DocumentStore for DuckStore {
    fn insert_one(&self, collection: &str, doc: Document) -> Result<DocId, StoreError> {
        let id = self.next_id(collection)?;
        let body = serde_json::to_string(&doc)?;
        self.conn.execute(
            "INSERT INTO documents (collection, id, body) VALUES (?, ?, ?)",
            params![collection, id, body],
        )?;
        debug!(collection, id, "inserted document");
        Ok(DocId(id))
    }

    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<(DocId, Document)>, StoreError> {
        let (where_sql, params) = scoped(collection, filter)?;
        let sql = format!("SELECT id, body::VARCHAR FROM documents WHERE {where_sql} ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            out.push((DocId(id), parse_body(&raw)?));
        }
        Ok(out)
    }

    fn update_one(&self, collection: &str, id: DocId, set: Document) -> Result<(), StoreError> {
        let (_, mut doc) = self
            .find(collection, &Filter::All)?
            .into_iter()
            .find(|(i, _)| *i == id)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id,
            })?;
        for (k, v) in set {
            doc.insert(k, v);
        }
        let body = serde_json::to_string(&doc)?;
        self.conn.execute(
            "UPDATE documents SET body = ? WHERE collection = ? AND id = ?",
            params![body, collection, id.0],
        )?;
        debug!(collection, id = id.0, "updated document");
        Ok(())
    }

    fn count(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        let (where_sql, params) = scoped(collection, filter)?;
        self.count_where(&where_sql, params)
    }

    fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: &Filter,
    ) -> Result<Vec<Value>, StoreError> {
        validate_field(field)?;
        let (where_sql, params) = scoped(collection, filter)?;
        let sql = format!(
            "SELECT v FROM (
                SELECT json_extract(body, '$.{field}')::VARCHAR AS v, min(id) AS first_id
                FROM documents
                WHERE {where_sql} AND json_extract(body, '$.{field}') IS NOT NULL
                GROUP BY v
            )
            ORDER BY first_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }
}
