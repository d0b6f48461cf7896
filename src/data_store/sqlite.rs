use super::{DataStore, DataStoreError, Table, Value};
use crate::composer::ComposedQuery;
use crate::predicate::Bindings;
use async_trait::async_trait;
use log::debug;
use rusqlite::types::{ToSql, ValueRef};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite-backed [`DataStore`].
///
/// rusqlite is synchronous, so every query runs on tokio's blocking pool.
/// One connection is shared; queries against it are serialized.
#[derive(Clone)]
pub struct SqliteDataStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDataStore {
    /// Opens an existing database file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataStoreError> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| DataStoreError::Connection(format!("{}: {}", path.display(), e)))?;
        debug!("Opened {} read-only", path.display());
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        SqliteDataStore {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

#[async_trait]
impl DataStore for SqliteDataStore {
    async fn execute(&self, query: &ComposedQuery) -> Result<Table, DataStoreError> {
        let conn = self.conn.clone();
        let sql = query.sql().to_string();
        let bindings = query.bindings().clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| DataStoreError::TaskFailed("connection lock poisoned".to_string()))?;
            run_query(&conn, &sql, &bindings)
        })
        .await
        .map_err(|e| DataStoreError::TaskFailed(e.to_string()))?
    }
}

fn run_query(conn: &Connection, sql: &str, bindings: &Bindings) -> Result<Table, DataStoreError> {
    let mut statement = conn.prepare(sql)?;
    let columns: Vec<String> = statement
        .column_names()
        .iter()
        .map(ToString::to_string)
        .collect();

    let names: Vec<String> = bindings.keys().map(|name| format!(":{}", name)).collect();
    let params: Vec<(&str, &dyn ToSql)> = names
        .iter()
        .zip(bindings.values())
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect();

    let mut rows = statement.query(params.as_slice())?;
    let mut table = Table {
        columns,
        rows: Vec::new(),
    };
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(table.columns.len());
        for index in 0..table.columns.len() {
            values.push(Value::from(row.get_ref(index)?));
        }
        table.rows.push(values);
    }

    Ok(table)
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }
}
