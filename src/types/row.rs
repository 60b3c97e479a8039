use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::SqlValue;

/// A single row result from a query.
/// Values are stored in column order and accessed by column name or index.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Gets a value by column name.
    pub fn get(&self, column: &str) -> Result<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| Error::ColumnNotFound(column.to_string()))
    }

    /// Gets a value by its position in the row.
    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Returns all column names in this row.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the values in column order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Returns the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of a query execution, as reported by the driver.
///
/// Row-returning statements fill `rows`; write statements report
/// `affected_rows` and, for inserts into an auto-increment table,
/// `last_insert_id`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Row>,
    affected_rows: u64,
    last_insert_id: Option<u64>,
    warnings: u16,
}

impl QueryResult {
    /// Creates a QueryResult from column names and rows of values.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        let shared: Arc<[String]> = columns.clone().into();
        let rows = rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&shared), values))
            .collect();
        Self {
            columns,
            rows,
            ..Self::default()
        }
    }

    /// An empty result with no columns, rows or counters.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_affected_rows(mut self, affected_rows: u64) -> Self {
        self.affected_rows = affected_rows;
        self
    }

    pub fn with_last_insert_id(mut self, last_insert_id: Option<u64>) -> Self {
        self.last_insert_id = last_insert_id;
        self
    }

    pub fn with_warnings(mut self, warnings: u16) -> Self {
        self.warnings = warnings;
        self
    }

    /// Extracts a single row from the result.
    /// Returns an error if the result contains zero or more than one row.
    pub fn single_row(self) -> Result<Row> {
        let actual = self.rows.len();
        let mut rows = self.rows.into_iter();
        match (rows.next(), rows.next()) {
            (Some(row), None) => Ok(row),
            _ => Err(Error::UnexpectedRowCount {
                expected: 1,
                actual,
            }),
        }
    }

    /// Returns all rows from the result.
    pub fn rows(self) -> Vec<Row> {
        self.rows
    }

    /// Returns a reference to the rows without consuming the result.
    pub fn rows_ref(&self) -> &[Row] {
        &self.rows
    }

    /// Returns the column names from this result.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows changed by a write statement.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Auto-increment id generated by the statement, if any.
    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    /// Returns the number of rows in this result.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if this result contains no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
