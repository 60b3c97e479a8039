use thiserror::Error;

/// Error type for mysqlconn operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid connection string: {0}")]
    InvalidUrl(String),

    #[error("Invalid protocol: expected `mysql`, got `{0}`")]
    InvalidProtocol(String),

    #[error("Invalid hostname")]
    InvalidHost,

    #[error("Invalid username")]
    InvalidUser,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Ping failed: {0}")]
    PingFailed(String),

    #[error("Change user failed: {0}")]
    ChangeUserFailed(String),

    #[error("Close failed: {0}")]
    CloseFailed(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount { expected: usize, actual: usize },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for errors produced while parsing a connection string.
    /// These are raised before any network activity takes place.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidUrl(_)
                | Error::InvalidProtocol(_)
                | Error::InvalidHost
                | Error::InvalidUser
                | Error::InvalidPassword
        )
    }
}

/// Result type alias for mysqlconn operations
pub type Result<T> = std::result::Result<T, Error>;
