mod row;
mod sql_value;

pub use row::{QueryResult, Row};
pub use sql_value::SqlValue;
