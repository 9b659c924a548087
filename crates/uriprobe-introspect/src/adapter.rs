use std::net::IpAddr;

use async_trait::async_trait;

use uriprobe_core::{
    AccessLevel, BackendKind, Capabilities, ConnectionAccounting, DatabaseSummary, Endpoint,
    ErrorRecord, Identity, Outcome, ReplicationStatus, RowEstimate, TableSummary,
    sort_by_size_desc,
};

use crate::cache::{Accessor, CacheKey, Cacheable, MetadataCache};
use crate::degraded;
use crate::transport;

/// Uniform probing surface handed out by the registry.
///
/// Every accessor is memoized per instance and never fails: it returns a
/// live value, a degraded value, or [`Outcome::Absent`].
#[async_trait]
pub trait Adapter: Send {
    fn capabilities(&self) -> Capabilities;

    fn endpoint(&self) -> &Endpoint;

    fn kind(&self) -> BackendKind {
        self.capabilities().kind
    }

    /// Minimal validity: the adapter declares at least one capability.
    fn is_valid(&self) -> bool {
        !self.capabilities().is_empty()
    }

    fn summary(&self) -> String {
        format!("{} in {}", self.kind(), self.endpoint().host_or_localhost())
    }

    /// Name of the interactive client usually used for this backend.
    fn cli_name(&self) -> &'static str;

    fn connection_error(&self) -> Option<ErrorRecord>;

    /// Plain TCP reachability of host and port.
    async fn reachable(&mut self) -> bool;

    async fn resolve(&mut self) -> Option<IpAddr>;

    async fn identity(&mut self) -> Outcome<Identity>;

    async fn usage(&mut self) -> Outcome<String>;

    async fn enumerate_databases(&mut self) -> Outcome<Vec<DatabaseSummary>>;

    async fn database_count(&mut self) -> Outcome<u64>;

    async fn enumerate_tables(&mut self, database: &str) -> Outcome<Vec<TableSummary>>;

    async fn connection_accounting(&mut self) -> Outcome<ConnectionAccounting>;

    async fn privilege(&mut self) -> Outcome<AccessLevel>;

    async fn row_count_estimate(
        &mut self,
        table: &str,
        database: Option<&str>,
    ) -> Outcome<RowEstimate>;

    async fn replication_topology(&mut self) -> ReplicationStatus;

    async fn close(&mut self);
}

/// Uncached operation set implemented once per backend family.
///
/// Implementations return [`Outcome::Absent`] whenever they cannot answer;
/// sorting, caching and degraded synthesis are layered on by [`Memoized`].
#[async_trait]
pub trait Backend: Send {
    fn capabilities(&self) -> Capabilities;

    fn endpoint(&self) -> &Endpoint;

    fn cli_name(&self) -> &'static str;

    fn default_port(&self) -> u16;

    fn connect_timeout(&self) -> std::time::Duration;

    fn connection_error(&self) -> Option<&ErrorRecord>;

    async fn identity(&mut self) -> Outcome<Identity>;

    async fn usage(&mut self) -> Outcome<String>;

    async fn databases(&mut self) -> Outcome<Vec<DatabaseSummary>>;

    async fn tables(&mut self, database: &str) -> Outcome<Vec<TableSummary>>;

    async fn connection_accounting(&mut self) -> Outcome<ConnectionAccounting>;

    async fn privilege(&mut self) -> Outcome<AccessLevel>;

    async fn row_estimate(&mut self, table: &str, database: Option<&str>) -> Outcome<RowEstimate>;

    async fn replication(&mut self) -> ReplicationStatus;

    async fn close(&mut self);
}

/// Caching decorator that turns a [`Backend`] into an [`Adapter`].
pub struct Memoized<B> {
    backend: B,
    cache: MetadataCache,
}

impl<B: Backend> Memoized<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: MetadataCache::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    fn settle<T: Cacheable>(&mut self, key: CacheKey, outcome: Outcome<T>) -> Outcome<T> {
        self.cache.remember(key, &outcome);
        outcome
    }
}

#[async_trait]
impl<B: Backend> Adapter for Memoized<B> {
    fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    fn endpoint(&self) -> &Endpoint {
        self.backend.endpoint()
    }

    fn cli_name(&self) -> &'static str {
        self.backend.cli_name()
    }

    fn connection_error(&self) -> Option<ErrorRecord> {
        self.backend.connection_error().cloned()
    }

    async fn reachable(&mut self) -> bool {
        let endpoint = self.backend.endpoint();
        transport::reachable(
            endpoint.host_or_localhost(),
            endpoint.port_or(self.backend.default_port()),
            self.backend.connect_timeout(),
        )
        .await
    }

    async fn resolve(&mut self) -> Option<IpAddr> {
        let endpoint = self.backend.endpoint();
        transport::resolve(
            endpoint.host_or_localhost(),
            endpoint.port_or(self.backend.default_port()),
        )
        .await
    }

    async fn identity(&mut self) -> Outcome<Identity> {
        let key = CacheKey::new(Accessor::Identity);
        if let Some(hit) = self.cache.lookup(&key) {
            return hit;
        }
        let outcome = self.backend.identity().await.or_else(|| {
            degraded::identity(self.backend.endpoint(), self.backend.connection_error())
        });
        self.settle(key, outcome)
    }

    async fn usage(&mut self) -> Outcome<String> {
        let key = CacheKey::new(Accessor::Usage);
        if let Some(hit) = self.cache.lookup(&key) {
            return hit;
        }
        let outcome = self.backend.usage().await;
        self.settle(key, outcome)
    }

    async fn enumerate_databases(&mut self) -> Outcome<Vec<DatabaseSummary>> {
        if !self.capabilities().databases {
            return Outcome::Absent;
        }
        let key = CacheKey::new(Accessor::Databases);
        if let Some(hit) = self.cache.lookup(&key) {
            return hit;
        }
        let outcome = self.backend.databases().await.map(|mut databases| {
            sort_by_size_desc(&mut databases);
            databases
        });
        self.settle(key, outcome)
    }

    async fn database_count(&mut self) -> Outcome<u64> {
        let key = CacheKey::new(Accessor::DatabaseCount);
        if let Some(hit) = self.cache.lookup(&key) {
            return hit;
        }
        let outcome = self
            .enumerate_databases()
            .await
            .map(|databases| databases.len() as u64)
            .or_else(|| {
                degraded::database_count(self.backend.endpoint(), self.backend.connection_error())
            });
        self.settle(key, outcome)
    }

    async fn enumerate_tables(&mut self, database: &str) -> Outcome<Vec<TableSummary>> {
        if !self.capabilities().tables {
            return Outcome::Absent;
        }
        let key = CacheKey::scoped(Accessor::Tables, database);
        if let Some(hit) = self.cache.lookup(&key) {
            return hit;
        }
        let outcome = self.backend.tables(database).await.map(|mut tables| {
            sort_by_size_desc(&mut tables);
            tables
        });
        self.settle(key, outcome)
    }

    async fn connection_accounting(&mut self) -> Outcome<ConnectionAccounting> {
        let key = CacheKey::new(Accessor::ConnectionAccounting);
        if let Some(hit) = self.cache.lookup(&key) {
            return hit;
        }
        let outcome = self
            .backend
            .connection_accounting()
            .await
            .or_else(|| degraded::accounting(self.backend.connection_error()));
        self.settle(key, outcome)
    }

    async fn privilege(&mut self) -> Outcome<AccessLevel> {
        let key = CacheKey::new(Accessor::Privilege);
        if let Some(hit) = self.cache.lookup(&key) {
            return hit;
        }
        let outcome = self.backend.privilege().await;
        self.settle(key, outcome)
    }

    async fn row_count_estimate(
        &mut self,
        table: &str,
        database: Option<&str>,
    ) -> Outcome<RowEstimate> {
        let scope = format!("{}/{table}", database.unwrap_or_default());
        let key = CacheKey::scoped(Accessor::RowEstimate, scope);
        if let Some(hit) = self.cache.lookup(&key) {
            return hit;
        }
        let outcome = self.backend.row_estimate(table, database).await;
        self.settle(key, outcome)
    }

    async fn replication_topology(&mut self) -> ReplicationStatus {
        let key = CacheKey::new(Accessor::Replication);
        if let Some(hit) = self.cache.lookup::<ReplicationStatus>(&key) {
            return hit.into_value().unwrap_or(ReplicationStatus::Unknown);
        }
        let status = self.backend.replication().await;
        self.cache.remember(key, &Outcome::Live(status));
        status
    }

    async fn close(&mut self) {
        self.backend.close().await;
    }
}
