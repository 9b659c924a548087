use uriprobe_core::BackendError;

use crate::session::SqlSession;

pub struct RawIdentity {
    pub version: String,
    pub database: Option<String>,
    pub user: Option<String>,
}

pub async fn fetch_identity<S: SqlSession>(session: &mut S) -> Result<Option<RawIdentity>, BackendError> {
    let row = session
        .query_one(
            "SELECT version() AS version, current_database()::text AS database, current_user::text AS username",
            &[],
        )
        .await?;
    Ok(row.and_then(|row| {
        Some(RawIdentity {
            version: row.text("version")?,
            database: row.text("database"),
            user: row.text("username"),
        })
    }))
}

pub async fn fetch_usage<S: SqlSession>(session: &mut S) -> Result<Option<String>, BackendError> {
    let row = session
        .query_one(
            "SELECT pg_size_pretty(pg_database_size(current_database())) AS size",
            &[],
        )
        .await?;
    Ok(row.and_then(|row| row.text("size")))
}

pub struct RawDatabase {
    pub name: String,
    pub size: String,
    pub raw_size: i64,
}

pub async fn list_databases<S: SqlSession>(session: &mut S) -> Result<Vec<RawDatabase>, BackendError> {
    let rows = session
        .query(
            r#"
            SELECT datname::text AS name,
                   pg_size_pretty(pg_database_size(datname)) AS size,
                   pg_database_size(datname)::bigint AS raw_size
            FROM pg_database
            WHERE datistemplate = false AND datallowconn
            "#,
            &[],
        )
        .await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            Some(RawDatabase {
                name: row.text("name")?,
                size: row.text("size").unwrap_or_default(),
                raw_size: row.int("raw_size").unwrap_or(0),
            })
        })
        .collect())
}

pub async fn count_tables<S: SqlSession>(session: &mut S) -> Result<u64, BackendError> {
    let row = session
        .query_one(
            r#"
            SELECT COUNT(*)::bigint AS tables
            FROM information_schema.tables
            WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
              AND table_type = 'BASE TABLE'
            "#,
            &[],
        )
        .await?;
    Ok(row
        .and_then(|row| row.int("tables"))
        .map_or(0, |count| count.max(0) as u64))
}

pub struct RawTable {
    pub schema: String,
    pub name: String,
    pub size: String,
    pub raw_size: i64,
    pub row_estimate: i64,
}

pub async fn list_tables<S: SqlSession>(session: &mut S) -> Result<Vec<RawTable>, BackendError> {
    let rows = session
        .query(
            r#"
            SELECT n.nspname::text AS schema,
                   c.relname::text AS name,
                   pg_size_pretty(pg_total_relation_size(c.oid)) AS size,
                   pg_total_relation_size(c.oid)::bigint AS raw_size,
                   GREATEST(c.reltuples, 0)::bigint AS row_estimate
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relkind IN ('r', 'p')
              AND n.nspname NOT IN ('pg_catalog', 'information_schema')
              AND n.nspname NOT LIKE 'pg_toast%'
            "#,
            &[],
        )
        .await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            Some(RawTable {
                schema: row.text("schema")?,
                name: row.text("name")?,
                size: row.text("size").unwrap_or_default(),
                raw_size: row.int("raw_size").unwrap_or(0),
                row_estimate: row.int("row_estimate").unwrap_or(0),
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
            SELECT (SELECT COUNT(*) FROM pg_stat_activity WHERE usename = current_user)::bigint AS user_current,
                   (SELECT rolconnlimit FROM pg_roles WHERE rolname = current_user)::bigint AS user_limit,
                   (SELECT COUNT(*) FROM pg_stat_activity)::bigint AS global_current,
                   current_setting('max_connections')::bigint AS global_limit
            "#,
            &[],
        )
        .await?;
    Ok(row.map(|row| RawConnections {
        user_current: row.int("user_current").unwrap_or(0),
        user_limit: row.int("user_limit").unwrap_or(-1),
        global_current: row.int("global_current").unwrap_or(0),
        global_limit: row.int("global_limit").unwrap_or(0),
    }))
}

pub struct RawRole {
    pub superuser: bool,
    pub replication: bool,
    pub create_db: bool,
    pub create_role: bool,
    pub member_of: Vec<String>,
}

pub async fn fetch_role<S: SqlSession>(session: &mut S) -> Result<Option<RawRole>, BackendError> {
    let Some(row) = session
        .query_one(
            r#"
            SELECT rolsuper, rolreplication, rolcreatedb, rolcreaterole
            FROM pg_roles
            WHERE rolname = current_user
            "#,
            &[],
        )
        .await?
    else {
        return Ok(None);
    };
    let memberships = session
        .query(
            r#"
            SELECT r.rolname::text AS role
            FROM pg_roles r
            JOIN pg_auth_members m ON r.oid = m.roleid
            JOIN pg_roles u ON m.member = u.oid
            WHERE u.rolname = current_user
            "#,
            &[],
        )
        .await?;
    Ok(Some(RawRole {
        superuser: row.flag("rolsuper").unwrap_or(false),
        replication: row.flag("rolreplication").unwrap_or(false),
        create_db: row.flag("rolcreatedb").unwrap_or(false),
        create_role: row.flag("rolcreaterole").unwrap_or(false),
        member_of: memberships
            .into_iter()
            .filter_map(|row| row.text("role"))
            .collect(),
    }))
}

pub async fn row_estimate<S: SqlSession>(
    session: &mut S,
    table: &str,
) -> Result<Option<i64>, BackendError> {
    let row = session
        .query_one(
            "SELECT GREATEST(reltuples, 0)::bigint AS estimate FROM pg_class WHERE oid = to_regclass($1)",
            &[table],
        )
        .await?;
    Ok(row.and_then(|row| row.int("estimate")))
}

pub struct RawReplication {
    pub replication_roles: bool,
    pub replicas: i64,
    pub in_recovery: bool,
}

pub async fn fetch_replication<S: SqlSession>(
    session: &mut S,
) -> Result<Option<RawReplication>, BackendError> {
    let row = session
        .query_one(
            r#"
            SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolreplication) AS replication_roles,
                   (SELECT COUNT(*) FROM pg_stat_replication)::bigint AS replicas,
                   pg_is_in_recovery() AS in_recovery
            "#,
            &[],
        )
        .await?;
    Ok(row.map(|row| RawReplication {
        replication_roles: row.flag("replication_roles").unwrap_or(false),
        replicas: row.int("replicas").unwrap_or(0),
        in_recovery: row.flag("in_recovery").unwrap_or(false),
    }))
}

pub const ACCESS_CHECK_TABLE: &str = "__uriprobe_access_check";
