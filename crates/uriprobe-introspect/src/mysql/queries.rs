use uriprobe_core::BackendError;

use crate::session::SqlSession;

pub const ACCESS_CHECK_TABLE: &str = "__uriprobe_access_check";

const SYSTEM_SCHEMAS: &str = "('mysql', 'information_schema', 'performance_schema', 'sys')";

pub struct RawIdentity {
    pub version: String,
    pub database: Option<String>,
    pub user: Option<String>,
}

pub async fn fetch_identity<S: SqlSession>(session: &mut S) -> Result<Option<RawIdentity>, BackendError> {
    let row = session
        .query_one(
            "SELECT VERSION() AS version, DATABASE() AS current_db, USER() AS username",
            &[],
        )
        .await?;
    Ok(row.and_then(|row| {
        Some(RawIdentity {
            version: row.text("version")?,
            database: row.text("current_db"),
            user: row.text("username"),
        })
    }))
}

/// Data plus index bytes of the selected schema.
pub async fn fetch_schema_size<S: SqlSession>(session: &mut S) -> Result<Option<i64>, BackendError> {
    let row = session
        .query_one(
            r#"
            SELECT CAST(COALESCE(SUM(data_length + index_length), 0) AS SIGNED) AS raw_size
            FROM information_schema.TABLES
            WHERE table_schema = DATABASE()
            "#,
            &[],
        )
        .await?;
    Ok(row.and_then(|row| row.int("raw_size")))
}

pub struct RawDatabase {
    pub name: String,
    pub raw_size: i64,
    pub table_count: i64,
}

pub async fn list_databases<S: SqlSession>(session: &mut S) -> Result<Vec<RawDatabase>, BackendError> {
    let sql = format!(
        r#"
        SELECT s.schema_name AS name,
               CAST(COALESCE(SUM(t.data_length + t.index_length), 0) AS SIGNED) AS raw_size,
               CAST(COUNT(t.table_name) AS SIGNED) AS table_count
        FROM information_schema.SCHEMATA s
        LEFT JOIN information_schema.TABLES t ON t.table_schema = s.schema_name
        WHERE s.schema_name NOT IN {SYSTEM_SCHEMAS}
        GROUP BY s.schema_name
        "#
    );
    let rows = session.query(&sql, &[]).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            Some(RawDatabase {
                name: row.text("name")?,
                raw_size: row.int("raw_size").unwrap_or(0),
                table_count: row.int("table_count").unwrap_or(0),
            })
        })
        .collect())
}

pub struct RawTable {
    pub name: String,
    pub raw_size: i64,
    pub row_count: i64,
}

pub async fn list_tables<S: SqlSession>(
    session: &mut S,
    database: &str,
) -> Result<Vec<RawTable>, BackendError> {
    let rows = session
        .query(
            r#"
            SELECT table_name AS name,
                   CAST(COALESCE(data_length + index_length, 0) AS SIGNED) AS raw_size,
                   CAST(COALESCE(table_rows, 0) AS SIGNED) AS row_count
            FROM information_schema.TABLES
            WHERE table_schema = ?
            "#,
            &[database],
        )
        .await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            Some(RawTable {
                name: row.text("name")?,
                raw_size: row.int("raw_size").unwrap_or(0),
                row_count: row.int("row_count").unwrap_or(0),
            })
        })
        .collect())
}

pub struct RawConnections {
    pub user_current: i64,
    pub user_limit: i64,
    pub global_current: i64,
    pub global_limit: i64,
}

pub async fn fetch_connections<S: SqlSession>(
    session: &mut S,
) -> Result<Option<RawConnections>, BackendError> {
    let row = session
        .query_one(
            r#"
            SELECT CAST(@@max_user_connections AS SIGNED) AS user_limit,
                   CAST(@@max_connections AS SIGNED) AS global_limit,
                   (SELECT CAST(COUNT(*) AS SIGNED) FROM information_schema.PROCESSLIST
                     WHERE user = SUBSTRING_INDEX(USER(), '@', 1)) AS user_current,
                   (SELECT CAST(COUNT(*) AS SIGNED) FROM information_schema.PROCESSLIST) AS global_current
            "#,
            &[],
        )
        .await?;
    Ok(row.map(|row| RawConnections {
        user_current: row.int("user_current").unwrap_or(0),
        user_limit: row.int("user_limit").unwrap_or(0),
        global_current: row.int("global_current").unwrap_or(0),
        global_limit: row.int("global_limit").unwrap_or(0),
    }))
}

pub async fn list_grants<S: SqlSession>(session: &mut S) -> Result<Vec<String>, BackendError> {
    let rows = session.query("SHOW GRANTS FOR CURRENT_USER()", &[]).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| row.at(0).and_then(|value| value.as_text()))
        .collect())
}

/// Active MariaDB role, when the ROLES plugin is installed and one is set.
pub async fn current_role<S: SqlSession>(session: &mut S) -> Result<Option<String>, BackendError> {
    let plugin = session
        .query(
            "SELECT 1 AS present FROM information_schema.plugins WHERE plugin_name = 'ROLES'",
            &[],
        )
        .await?;
    if plugin.is_empty() {
        return Ok(None);
    }
    let row = session.query_one("SELECT CURRENT_ROLE() AS role", &[]).await?;
    Ok(row
        .and_then(|row| row.text("role"))
        .filter(|role| !role.is_empty() && !role.eq_ignore_ascii_case("NONE")))
}

pub async fn row_estimate<S: SqlSession>(
    session: &mut S,
    table: &str,
    database: Option<&str>,
) -> Result<Option<i64>, BackendError> {
    let row = match database {
        Some(database) => {
            session
                .query_one(
                    r#"
                    SELECT CAST(COALESCE(table_rows, 0) AS SIGNED) AS estimate
                    FROM information_schema.TABLES
                    WHERE table_schema = ? AND table_name = ?
                    "#,
                    &[database, table],
                )
                .await?
        }
        None => {
            session
                .query_one(
                    r#"
                    SELECT CAST(COALESCE(table_rows, 0) AS SIGNED) AS estimate
                    FROM information_schema.TABLES
                    WHERE table_schema = DATABASE() AND table_name = ?
                    "#,
                    &[table],
                )
                .await?
        }
    };
    Ok(row.and_then(|row| row.int("estimate")))
}

pub struct RawReplication {
    pub master_rows: usize,
    pub replica_rows: usize,
    pub replication_users: usize,
    pub log_bin: Option<String>,
}

/// Every check runs; the first failure aborts the whole probe.
pub async fn fetch_replication<S: SqlSession>(session: &mut S) -> Result<RawReplication, BackendError> {
    let master_rows = session.query("SHOW MASTER STATUS", &[]).await?.len();
    let replica_rows = session.query("SHOW SLAVE STATUS", &[]).await?.len();
    let replication_users = session
        .query("SELECT user FROM mysql.user WHERE Repl_slave_priv = 'Y'", &[])
        .await?
        .len();
    let log_bin = session
        .query_one("SHOW VARIABLES LIKE 'log_bin'", &[])
        .await?
        .and_then(|row| row.text("Value"));
    Ok(RawReplication {
        master_rows,
        replica_rows,
        replication_users,
        log_bin,
    })
}
