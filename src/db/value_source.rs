use super::DbPool;
use crate::error::{NlqError, Result};
use crate::filters::strip_table_prefix;
use crate::resolver::ValueSource;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Distinct values read straight from MySQL.
pub struct SqlValueSource {
    pool: DbPool,
}

impl SqlValueSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// `SELECT DISTINCT` over one column, cast to text so every column type reads
/// back the same way. A column qualified with its own table is accepted.
pub fn distinct_values_query(table: &str, column: &str) -> Result<String> {
    let column = quote_identifier(strip_table_prefix(table, column))?;
    let table = quote_identifier(table)?;
    Ok(format!(
        "SELECT DISTINCT CAST({col} AS CHAR) FROM {table} WHERE {col} IS NOT NULL",
        col = column,
        table = table
    ))
}

/// Backtick-quote a plain identifier. Names come from generator output, so
/// anything outside `[A-Za-z0-9_]` is refused rather than escaped.
pub fn quote_identifier(name: &str) -> Result<String> {
    let name = name.trim();
    if IDENTIFIER.is_match(name) {
        Ok(format!("`{}`", name))
    } else {
        Err(NlqError::InvalidInput(format!("'{}' is not a valid identifier", name)))
    }
}

#[async_trait]
impl ValueSource for SqlValueSource {
    async fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<String>> {
        let query = distinct_values_query(table, column)?;
        let rows: Vec<(Option<String>,)> = sqlx::query_as(&query).fetch_all(&self.pool).await?;
        let values: Vec<String> = rows.into_iter().filter_map(|(value,)| value).collect();
        debug!(table, column, count = values.len(), "loaded distinct values");
        Ok(values)
    }
}
