use crate::types::SqlValue;

/// A pre-built query carrying its own SQL and bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    sql: String,
    values: Vec<SqlValue>,
}

impl QueryDescriptor {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            values: Vec::new(),
        }
    }

    /// Append a positional bind value.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

/// What to send to the server: raw SQL with positional values, or a
/// descriptor that owns its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRequest {
    Raw { sql: String, values: Vec<SqlValue> },
    Descriptor(QueryDescriptor),
}

impl QueryRequest {
    pub fn raw(sql: impl Into<String>, values: Vec<SqlValue>) -> Self {
        QueryRequest::Raw {
            sql: sql.into(),
            values,
        }
    }

    /// Bind positional values to a raw query.
    /// A descriptor keeps its own parameters and ignores these.
    pub fn with_values(self, values: Vec<SqlValue>) -> Self {
        match self {
            QueryRequest::Raw { sql, .. } => QueryRequest::Raw { sql, values },
            descriptor @ QueryRequest::Descriptor(_) => descriptor,
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            QueryRequest::Raw { sql, .. } => sql,
            QueryRequest::Descriptor(d) => d.sql(),
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        match self {
            QueryRequest::Raw { values, .. } => values,
            QueryRequest::Descriptor(d) => d.values(),
        }
    }
}

impl From<&str> for QueryRequest {
    fn from(sql: &str) -> Self {
        QueryRequest::raw(sql, Vec::new())
    }
}

impl From<String> for QueryRequest {
    fn from(sql: String) -> Self {
        QueryRequest::raw(sql, Vec::new())
    }
}

impl From<QueryDescriptor> for QueryRequest {
    fn from(descriptor: QueryDescriptor) -> Self {
        QueryRequest::Descriptor(descriptor)
    }
}
