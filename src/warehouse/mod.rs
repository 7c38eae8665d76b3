//! Tabular query seam.
//!
//! Queries are static templates with `{name:Type}` placeholders; parameters travel separately
//! so the executor never splices values into SQL text. Results come back as loosely typed
//! [`Row`]s and are bound to one struct per query through [`FromRow`] at the boundary.

pub mod clickhouse;
pub mod queries;

use crate::error::{NetError, SchemaMismatchError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub use clickhouse::ClickHouseExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query {
    pub name: &'static str,
    pub sql: &'static str,
}

/// Named parameter values, already rendered in the warehouse's text format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: BTreeMap<String, String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_str(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn with_u64(mut self, name: &str, value: u64) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }

    /// Renders an `Array(String)` literal. Single quotes and backslashes are escaped.
    pub fn with_str_list<I, S>(mut self, name: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rendered: Vec<String> = items
            .into_iter()
            .map(|item| {
                let escaped = item.as_ref().replace('\\', "\\\\").replace('\'', "\\'");
                format!("'{escaped}'")
            })
            .collect();
        self.values
            .insert(name.to_string(), format!("[{}]", rendered.join(",")));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One result row as a JSON object. 64-bit integers may arrive quoted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Map<String, Value>);

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl Row {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    fn mismatch(query: &'static str, column: &str, expected: &'static str) -> SchemaMismatchError {
        SchemaMismatchError {
            query,
            column: column.to_string(),
            expected,
        }
    }

    pub fn str_col(&self, query: &'static str, column: &str) -> Result<String, SchemaMismatchError> {
        match self.0.get(column) {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(Self::mismatch(query, column, "string")),
        }
    }

    /// Nullable string column. An absent column is still a mismatch.
    pub fn opt_str_col(
        &self,
        query: &'static str,
        column: &str,
    ) -> Result<Option<String>, SchemaMismatchError> {
        match self.0.get(column) {
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Null) => Ok(None),
            _ => Err(Self::mismatch(query, column, "nullable string")),
        }
    }

    pub fn u64_col(&self, query: &'static str, column: &str) -> Result<u64, SchemaMismatchError> {
        let parsed = match self.0.get(column) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| Self::mismatch(query, column, "unsigned integer"))
    }

    pub fn str_array_col(
        &self,
        query: &'static str,
        column: &str,
    ) -> Result<Vec<String>, SchemaMismatchError> {
        let Some(Value::Array(items)) = self.0.get(column) else {
            return Err(Self::mismatch(query, column, "array of strings"));
        };
        items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                _ => Err(Self::mismatch(query, column, "array of strings")),
            })
            .collect()
    }
}

pub trait FromRow: Sized {
    fn from_row(query: &'static str, row: &Row) -> Result<Self, SchemaMismatchError>;
}

/// Bind every row or fail on the first schema mismatch.
pub fn bind_rows<T: FromRow>(query: &Query, rows: &[Row]) -> Result<Vec<T>, SchemaMismatchError> {
    rows.iter().map(|row| T::from_row(query.name, row)).collect()
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &Query, params: &QueryParams) -> Result<Vec<Row>, NetError>;
}

/// Execute and bind in one step.
pub async fn fetch_typed<T: FromRow>(
    executor: &dyn QueryExecutor,
    query: &Query,
    params: &QueryParams,
) -> crate::Result<Vec<T>> {
    let rows = executor.execute(query, params).await?;
    let bound = bind_rows::<T>(query, &rows)?;
    tracing::debug!("[WAREHOUSE] {} returned {} rows", query.name, bound.len());
    Ok(bound)
}
