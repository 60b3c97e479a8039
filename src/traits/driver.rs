use async_trait::async_trait;

use crate::config::ChangeUserOptions;
use crate::error::Result;
use crate::types::{QueryResult, SqlValue};

/// Trait for database driver implementations.
/// A driver owns exactly one session and is responsible for:
/// - Opening and closing it
/// - Converting SqlValue parameters to native types
/// - Executing queries and converting results to QueryResult
///
/// Operations issued before `connect` open the session implicitly.
/// Once `close` has succeeded, every operation fails with `ConnectionClosed`.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Open the session. A no-op if it is already open.
    async fn connect(&self) -> Result<()>;

    /// Execute a SQL query with the given parameters.
    /// Parameters use MySQL-style `?` placeholders.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult>;

    /// Check that the session is alive.
    async fn ping(&self) -> Result<()>;

    /// Re-authenticate the session without reconnecting the socket.
    async fn change_user(&self, options: &ChangeUserOptions) -> Result<()>;

    /// Gracefully end the session.
    async fn close(&self) -> Result<()>;

    /// Server-assigned id of the session, once connected.
    fn thread_id(&self) -> Option<u32>;
}
