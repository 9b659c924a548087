use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Row as _};

use uriprobe_core::{BackendError, Endpoint, ProbeSettings};

use crate::session::{Connector, Row, Session, SqlSession, Value};
use crate::sql::{bounded, from_sqlx};

use super::DEFAULT_PORT;

/// Opens MySQL and MariaDB sessions through sqlx.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

pub struct MySqlSession {
    conn: MySqlConnection,
    read_timeout: Duration,
}

/// Server error numbers travel as the code, SQLSTATE only as a fallback.
fn mysql_error(err: sqlx::Error) -> BackendError {
    from_sqlx(err, |db| {
        db.try_downcast_ref::<MySqlDatabaseError>()
            .map(|mysql| mysql.number().to_string())
            .or_else(|| db.code().map(|code| code.into_owned()))
    })
}

fn connect_options(endpoint: &Endpoint) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(endpoint.host_or_localhost())
        .port(endpoint.port_or(DEFAULT_PORT));
    if let Some(user) = endpoint.user() {
        options = options.username(user);
    }
    if let Some(password) = endpoint.password() {
        options = options.password(password);
    }
    if let Some(database) = endpoint.database() {
        options = options.database(database);
    }
    options.disable_statement_logging()
}

#[async_trait]
impl Connector for MySqlConnector {
    type Session = MySqlSession;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        settings: &ProbeSettings,
    ) -> Result<MySqlSession, BackendError> {
        let options = connect_options(endpoint);
        let conn = bounded(
            settings.timeouts.connect(),
            "mysql connect",
            MySqlConnection::connect_with(&options),
            mysql_error,
        )
        .await?;
        Ok(MySqlSession {
            conn,
            read_timeout: settings.timeouts.read(),
        })
    }
}

#[async_trait]
impl Session for MySqlSession {
    async fn ping(&mut self) -> Result<(), BackendError> {
        bounded(self.read_timeout, "mysql ping", self.conn.ping(), mysql_error).await
    }

    async fn validate(&mut self) -> Result<(), BackendError> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }

    async fn close(self) -> Result<(), BackendError> {
        self.conn.close().await.map_err(mysql_error)
    }
}

#[async_trait]
impl SqlSession for MySqlSession {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>, BackendError> {
        // SHOW statements are not all preparable; parameterless SQL goes over the text protocol.
        let rows = if params.is_empty() {
            bounded(
                self.read_timeout,
                "mysql query",
                sqlx::Executor::fetch_all(&mut self.conn, sqlx::raw_sql(sql)),
                mysql_error,
            )
            .await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = query.bind(*param);
            }
            bounded(
                self.read_timeout,
                "mysql query",
                query.fetch_all(&mut self.conn),
                mysql_error,
            )
            .await?
        };
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, BackendError> {
        let result = bounded(
            self.read_timeout,
            "mysql execute",
            sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql)),
            mysql_error,
        )
        .await?;
        Ok(result.rows_affected())
    }
}

fn decode_row(row: &MySqlRow) -> Row {
    Row::new(
        row.columns()
            .iter()
            .map(|column| (column.name().to_string(), decode_value(row, column.ordinal())))
            .collect(),
    )
}

/// Try the common shapes in turn; anything undecodable reads as NULL.
fn decode_value(row: &MySqlRow, index: usize) -> Value {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map_or(Value::Null, Value::Int);
    }
    if let Ok(value) = row.try_get::<Option<u64>, _>(index) {
        return value.map_or(Value::Null, |n| Value::Int(i64::try_from(n).unwrap_or(i64::MAX)));
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map_or(Value::Null, Value::Float);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map_or(Value::Null, Value::Text);
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return value.map_or(Value::Null, |bytes| {
            Value::Text(String::from_utf8_lossy(&bytes).into_owned())
        });
    }
    Value::Null
}
