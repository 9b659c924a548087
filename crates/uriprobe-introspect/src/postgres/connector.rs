use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, ConnectOptions, Connection, Row as _, TypeInfo};

use uriprobe_core::{BackendError, Endpoint, ProbeSettings};

use crate::session::{Connector, Row, Session, SqlSession, Value};
use crate::sql::{bounded, from_sqlx};

/// Opens PostgreSQL sessions through sqlx.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

pub struct PgSession {
    conn: PgConnection,
    read_timeout: Duration,
}

fn pg_error(err: sqlx::Error) -> BackendError {
    from_sqlx(err, |db| db.code().map(|code| code.into_owned()))
}

#[async_trait]
impl Connector for PgConnector {
    type Session = PgSession;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        settings: &ProbeSettings,
    ) -> Result<PgSession, BackendError> {
        let options = PgConnectOptions::from_str(endpoint.raw())
            .map_err(pg_error)?
            .application_name("uriprobe")
            .disable_statement_logging();
        let conn = bounded(
            settings.timeouts.connect(),
            "postgres connect",
            PgConnection::connect_with(&options),
            pg_error,
        )
        .await?;
        Ok(PgSession {
            conn,
            read_timeout: settings.timeouts.read(),
        })
    }
}

#[async_trait]
impl Session for PgSession {
    async fn ping(&mut self) -> Result<(), BackendError> {
        bounded(self.read_timeout, "postgres ping", self.conn.ping(), pg_error).await
    }

    async fn validate(&mut self) -> Result<(), BackendError> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }

    async fn close(self) -> Result<(), BackendError> {
        self.conn.close().await.map_err(pg_error)
    }
}

#[async_trait]
impl SqlSession for PgSession {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>, BackendError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(*param);
        }
        let rows = bounded(
            self.read_timeout,
            "postgres query",
            query.fetch_all(&mut self.conn),
            pg_error,
        )
        .await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, BackendError> {
        let result = bounded(
            self.read_timeout,
            "postgres execute",
            sqlx::query(sql).execute(&mut self.conn),
            pg_error,
        )
        .await?;
        Ok(result.rows_affected())
    }
}

fn decode_row(row: &PgRow) -> Row {
    Row::new(
        row.columns()
            .iter()
            .map(|column| {
                let value = decode_value(row, column.ordinal(), column.type_info().name());
                (column.name().to_string(), value)
            })
            .collect(),
    )
}

fn decode_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let decoded = match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .map(|value| value.map(Value::Bool)),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map(|value| value.map(|n| Value::Int(n.into()))),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map(|value| value.map(|n| Value::Int(n.into()))),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .map(|value| value.map(Value::Int)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .map(|value| value.map(|n| Value::Float(n.into()))),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)
            .map(|value| value.map(Value::Float)),
        _ => row
            .try_get::<Option<String>, _>(index)
            .map(|value| value.map(Value::Text)),
    };
    decoded.ok().flatten().unwrap_or(Value::Null)
}
