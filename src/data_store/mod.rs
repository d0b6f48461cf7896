mod sqlite;

pub use sqlite::SqliteDataStore;

use crate::composer::ComposedQuery;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// DataStore executes a composed query and returns the result table
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Execute the query with its named bindings
    ///
    /// Implementations must only bind values through the driver's parameter
    /// API, never by formatting them into the SQL text.
    async fn execute(&self, query: &ComposedQuery) -> Result<Table, DataStoreError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Rows in column order, as returned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Every value of the named column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(index)).collect())
    }

    /// Value at `row` in the named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }
}

/// Cloneable so one failed execution can be reported to every caller that
/// was waiting on it.
#[derive(Error, Debug, Clone)]
pub enum DataStoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Sqlite(Arc<rusqlite::Error>),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Query task failed: {0}")]
    TaskFailed(String),
}

impl From<rusqlite::Error> for DataStoreError {
    fn from(e: rusqlite::Error) -> Self {
        DataStoreError::Sqlite(Arc::new(e))
    }
}
