use std::sync::OnceLock;

use async_trait::async_trait;
use mysql_async as my;
use mysql_async::prelude::{Protocol, Queryable};
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use url::Url;

use crate::config::{ChangeUserOptions, ConnectionConfig};
use crate::error::{Error, Result};
use crate::traits::DatabaseDriver;
use crate::types::{QueryResult, SqlValue};

enum Session {
    Idle,
    Open(my::Conn),
    Closed,
}

/// MySQL driver implementation using mysql_async.
///
/// Holds a single session behind an async mutex, so overlapping calls on
/// the same driver run one after another in the order they acquire it.
pub struct MysqlDriver {
    config: ConnectionConfig,
    session: Mutex<Session>,
    thread_id: OnceLock<u32>,
}

impl MysqlDriver {
    /// Create a driver for the given configuration. No I/O happens until
    /// `connect` or the first operation.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            session: Mutex::new(Session::Idle),
            thread_id: OnceLock::new(),
        }
    }

    async fn open(&self) -> Result<my::Conn> {
        let url = connection_url(&self.config)?;
        let opts = my::Opts::from_url(url.as_str())
            .map_err(|e| Error::ConnectionFailed(e.to_string()))?;

        debug!(
            "Connecting to MySQL at {}:{} as {}",
            self.config.host, self.config.port, self.config.user
        );
        let conn = my::Conn::new(opts).await.map_err(|e| {
            error!("MySQL connection failed: {}", e);
            Error::ConnectionFailed(e.to_string())
        })?;

        let _ = self.thread_id.set(conn.id());
        info!("Connected to MySQL, connection id {}", conn.id());
        Ok(conn)
    }

    /// Returns the open connection, connecting first if nothing has been
    /// attempted yet. A failed connect leaves the session closed.
    async fn ensure_open<'a>(&self, session: &'a mut Session) -> Result<&'a mut my::Conn> {
        if matches!(session, Session::Idle) {
            match self.open().await {
                Ok(conn) => *session = Session::Open(conn),
                Err(e) => {
                    *session = Session::Closed;
                    return Err(e);
                }
            }
        }

        match session {
            Session::Open(conn) => Ok(conn),
            _ => Err(Error::ConnectionClosed),
        }
    }
}

#[async_trait]
impl DatabaseDriver for MysqlDriver {
    async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        self.ensure_open(&mut session).await.map(|_| ())
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
        let mut session = self.session.lock().await;
        let conn = self.ensure_open(&mut session).await?;

        debug!("Executing query with {} parameter(s): {}", params.len(), sql);
        // Always the binary protocol, so column types survive regardless of
        // whether the statement carries parameters.
        let result = conn
            .exec_iter(sql, conv_params(params))
            .await
            .map_err(query_error)?;

        collect(result).await.map_err(query_error)
    }

    async fn ping(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let conn = self.ensure_open(&mut session).await?;
        conn.ping()
            .await
            .map_err(|e| Error::PingFailed(e.to_string()))
    }

    async fn change_user(&self, options: &ChangeUserOptions) -> Result<()> {
        let mut session = self.session.lock().await;
        let conn = self.ensure_open(&mut session).await?;

        let mut opts = my::ChangeUserOpts::default();
        if let Some(user) = &options.user {
            opts = opts.with_user(Some(user.clone()));
        }
        if let Some(password) = &options.password {
            opts = opts.with_pass(Some(password.clone()));
        }
        if let Some(database) = &options.database {
            opts = opts.with_db_name(Some(database.clone()));
        }

        conn.change_user(opts).await.map_err(|e| {
            error!("MySQL change user failed: {}", e);
            Error::ChangeUserFailed(e.to_string())
        })
    }

    async fn close(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        match std::mem::replace(&mut *session, Session::Closed) {
            Session::Open(conn) => conn.disconnect().await.map_err(|e| {
                error!("MySQL disconnect failed: {}", e);
                Error::CloseFailed(e.to_string())
            }),
            Session::Idle => Ok(()),
            Session::Closed => Err(Error::ConnectionClosed),
        }
    }

    fn thread_id(&self) -> Option<u32> {
        self.thread_id.get().copied()
    }
}

const STMT_CACHE_SIZE: &str = "stmt_cache_size";

/// Render the configuration as a `mysql://` URL understood by mysql_async.
/// Options become query pairs and are validated by the driver.
fn connection_url(config: &ConnectionConfig) -> Result<Url> {
    let invalid = |what: &str| Error::Config(format!("invalid {} in connection config", what));

    let mut url = Url::parse("mysql://localhost").map_err(|e| Error::Config(e.to_string()))?;

    let host = if config.host.contains(':') && !config.host.starts_with('[') {
        format!("[{}]", config.host)
    } else {
        config.host.clone()
    };
    url.set_host(Some(&host)).map_err(|_| invalid("host"))?;
    url.set_port(Some(config.port)).map_err(|_| invalid("port"))?;
    url.set_username(&config.user).map_err(|_| invalid("user"))?;

    let password = Some(config.password.as_str()).filter(|p| !p.is_empty());
    url.set_password(password).map_err(|_| invalid("password"))?;
    url.set_path(&config.database);

    // No prepared-statement cache unless the caller asks for one.
    let mut pairs = url.query_pairs_mut();
    if !config.options.contains_key(STMT_CACHE_SIZE) {
        pairs.append_pair(STMT_CACHE_SIZE, "0");
    }
    pairs.extend_pairs(&config.options);
    drop(pairs);

    Ok(url)
}

fn query_error(e: my::Error) -> Error {
    error!("MySQL query failed: {}", e);
    Error::QueryFailed(e.to_string())
}

async fn collect<P: Protocol>(mut result: my::QueryResult<'_, 'static, P>) -> my::Result<QueryResult> {
    // Taken from the result set metadata so empty results keep their columns.
    let columns = result
        .columns()
        .map(|columns| column_names(&columns))
        .unwrap_or_default();

    let rows: Vec<my::Row> = result.collect().await?;
    let affected_rows = result.affected_rows();
    let last_insert_id = result.last_insert_id();
    let warnings = result.warnings();
    result.drop_result().await?;

    let rows = rows.into_iter().map(convert_row).collect();

    Ok(QueryResult::new(columns, rows)
        .with_affected_rows(affected_rows)
        .with_last_insert_id(last_insert_id)
        .with_warnings(warnings))
}

fn column_names(columns: &[my::Column]) -> Vec<String> {
    columns.iter().map(|c| c.name_str().into_owned()).collect()
}

fn conv_params(params: &[SqlValue]) -> my::Params {
    if params.is_empty() {
        my::Params::Empty
    } else {
        my::Params::Positional(params.iter().map(sql_value_to_mysql).collect())
    }
}

fn sql_value_to_mysql(value: &SqlValue) -> my::Value {
    match value {
        SqlValue::Null => my::Value::NULL,
        SqlValue::Text(s) => my::Value::Bytes(s.as_bytes().to_vec()),
        SqlValue::Int32(i) => my::Value::Int(i64::from(*i)),
        SqlValue::Int64(i) => my::Value::Int(*i),
        SqlValue::UInt64(u) => my::Value::UInt(*u),
        SqlValue::Double(d) => my::Value::Double(*d),
        SqlValue::Bool(b) => my::Value::Int(i64::from(*b)),
        SqlValue::Bytes(b) => my::Value::Bytes(b.clone()),
    }
}

fn convert_row(mut row: my::Row) -> Vec<SqlValue> {
    (0..row.len())
        .map(|i| mysql_value_to_sql(row.take(i).unwrap_or(my::Value::NULL)))
        .collect()
}

fn mysql_value_to_sql(value: my::Value) -> SqlValue {
    match value {
        my::Value::NULL => SqlValue::Null,
        my::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text),
            Err(e) => SqlValue::Bytes(e.into_bytes()),
        },
        my::Value::Int(i) => SqlValue::Int64(i),
        my::Value::UInt(u) => SqlValue::UInt64(u),
        my::Value::Float(f) => SqlValue::Double(f64::from(f)),
        my::Value::Double(d) => SqlValue::Double(d),
        my::Value::Date(year, month, day, hour, min, sec, micro) => {
            let mut text = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, min, sec
            );
            if micro > 0 {
                text.push_str(&format!(".{:06}", micro));
            }
            SqlValue::Text(text)
        }
        my::Value::Time(is_neg, days, hours, minutes, seconds, micros) => {
            let hours = u64::from(days) * 24 + u64::from(hours);
            let sign = if is_neg { "-" } else { "" };
            let mut text = format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds);
            if micros > 0 {
                text.push_str(&format!(".{:06}", micros));
            }
            SqlValue::Text(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url() {
        let config = ConnectionConfig::new("db.example.com", "alice", "p@ss word", "shop")
            .with_port(3307)
            .with_option("stmt_cache_size", "0");

        let url = connection_url(&config).unwrap();
        assert_eq!(url.host_str(), Some("db.example.com"));
        assert_eq!(url.port(), Some(3307));
        assert_eq!(url.username(), "alice");
        assert_eq!(url.path(), "/shop");
        assert_ne!(url.password(), Some("p@ss word"));
        assert_eq!(url.query(), Some("stmt_cache_size=0"));
    }

    #[test]
    fn test_connection_url_ipv6() {
        let config = ConnectionConfig::new("::1", "alice", "secret", "");
        let url = connection_url(&config).unwrap();
        assert_eq!(url.host_str(), Some("[::1]"));
    }

    #[test]
    fn test_connection_url_disables_statement_cache_by_default() {
        let config = ConnectionConfig::new("localhost", "alice", "secret", "shop")
            .with_option("prefer_socket", "false");
        let url = connection_url(&config).unwrap();
        assert_eq!(url.query(), Some("stmt_cache_size=0&prefer_socket=false"));

        let config = ConnectionConfig::new("localhost", "alice", "secret", "shop")
            .with_option("stmt_cache_size", "32");
        let url = connection_url(&config).unwrap();
        assert_eq!(url.query(), Some("stmt_cache_size=32"));
    }

    #[test]
    fn test_column_names_from_metadata() {
        use mysql_async::consts::ColumnType;

        let columns = [
            my::Column::new(ColumnType::MYSQL_TYPE_LONG).with_name(b"id"),
            my::Column::new(ColumnType::MYSQL_TYPE_VAR_STRING).with_name(b"name"),
        ];
        assert_eq!(column_names(&columns), vec!["id".to_string(), "name".to_string()]);
        assert!(column_names(&[]).is_empty());
    }

    #[test]
    fn test_binary_values_keep_their_type() {
        // Binary protocol rows carry typed values, not text.
        let row = [
            my::Value::Int(5),
            my::Value::UInt(u64::MAX),
            my::Value::Double(1.5),
            my::Value::NULL,
        ];
        let values: Vec<SqlValue> = row.into_iter().map(mysql_value_to_sql).collect();

        assert_eq!(values[0], SqlValue::Int64(5));
        assert_eq!(values[0].as_i64(), Some(5));
        assert_eq!(values[1], SqlValue::UInt64(u64::MAX));
        assert_eq!(values[2], SqlValue::Double(1.5));
        assert!(values[3].is_null());

        match conv_params(&[SqlValue::Int32(5), SqlValue::from("x")]) {
            my::Params::Positional(values) => assert_eq!(
                values,
                vec![my::Value::Int(5), my::Value::Bytes(b"x".to_vec())]
            ),
            _ => panic!("Expected positional params"),
        }
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(sql_value_to_mysql(&SqlValue::Bool(true)), my::Value::Int(1));
        assert_eq!(
            sql_value_to_mysql(&SqlValue::from("abc")),
            my::Value::Bytes(b"abc".to_vec())
        );
        assert_eq!(
            mysql_value_to_sql(my::Value::Bytes(vec![0xff, 0xfe])),
            SqlValue::Bytes(vec![0xff, 0xfe])
        );
        assert_eq!(
            mysql_value_to_sql(my::Value::Date(2024, 2, 29, 13, 5, 9, 0)),
            SqlValue::from("2024-02-29 13:05:09")
        );
        assert_eq!(
            mysql_value_to_sql(my::Value::Time(true, 1, 2, 3, 4, 500)),
            SqlValue::from("-26:03:04.000500")
        );
        assert!(matches!(conv_params(&[]), my::Params::Empty));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_then_stays_closed() {
        // Nothing listens on port 1.
        let driver = MysqlDriver::new(
            ConnectionConfig::new("127.0.0.1", "alice", "secret", "shop").with_port(1),
        );

        let err = driver.connect().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed(_)), "got {:?}", err);
        assert_eq!(driver.thread_id(), None);

        let err = driver.execute("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_close_before_connect() {
        let driver = MysqlDriver::new(ConnectionConfig::new("127.0.0.1", "a", "b", "c"));
        driver.close().await.unwrap();

        let err = driver.ping().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed), "got {:?}", err);
    }
}
