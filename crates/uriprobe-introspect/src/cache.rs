//! Per-instance memoization of metadata accessors.
//!
//! Entries are keyed by accessor plus an optional scope (database name,
//! table). The first live or degraded result wins and is never recomputed;
//! absent results are not stored so a later call can try again.

use std::collections::HashMap;

use uriprobe_core::{
    AccessLevel, ConnectionAccounting, DatabaseSummary, Identity, Outcome, ReplicationStatus,
    RowEstimate, TableSummary,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessor {
    Identity,
    Usage,
    Databases,
    DatabaseCount,
    Tables,
    ConnectionAccounting,
    Privilege,
    Replication,
    RowEstimate,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub accessor: Accessor,
    pub scope: Option<String>,
}

impl CacheKey {
    pub fn new(accessor: Accessor) -> Self {
        Self {
            accessor,
            scope: None,
        }
    }

    pub fn scoped(accessor: Accessor, scope: impl Into<String>) -> Self {
        Self {
            accessor,
            scope: Some(scope.into()),
        }
    }
}

/// Type-erased cached value.
#[derive(Debug, Clone, PartialEq)]
pub enum Metadata {
    Identity(Identity),
    Text(String),
    Databases(Vec<DatabaseSummary>),
    Count(u64),
    Tables(Vec<TableSummary>),
    Accounting(ConnectionAccounting),
    Access(AccessLevel),
    Replication(ReplicationStatus),
    Rows(RowEstimate),
}

/// Values that can live in a [`MetadataCache`].
pub trait Cacheable: Clone + Sized {
    fn into_metadata(self) -> Metadata;

    fn from_metadata(metadata: &Metadata) -> Option<Self>;

    /// Unstable values are returned to the caller but never stored.
    fn is_stable(&self) -> bool {
        true
    }
}

macro_rules! cacheable {
    ($ty:ty, $variant:ident) => {
        impl Cacheable for $ty {
            fn into_metadata(self) -> Metadata {
                Metadata::$variant(self)
            }

            fn from_metadata(metadata: &Metadata) -> Option<Self> {
                match metadata {
                    Metadata::$variant(value) => Some(value.clone()),
                    _ => None,
                }
            }
        }
    };
}

cacheable!(Identity, Identity);
cacheable!(String, Text);
cacheable!(Vec<DatabaseSummary>, Databases);
cacheable!(u64, Count);
cacheable!(Vec<TableSummary>, Tables);
cacheable!(ConnectionAccounting, Accounting);
cacheable!(AccessLevel, Access);
cacheable!(RowEstimate, Rows);

impl Cacheable for ReplicationStatus {
    fn into_metadata(self) -> Metadata {
        Metadata::Replication(self)
    }

    fn from_metadata(metadata: &Metadata) -> Option<Self> {
        match metadata {
            Metadata::Replication(status) => Some(*status),
            _ => None,
        }
    }

    fn is_stable(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: HashMap<CacheKey, Outcome<Metadata>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup<T: Cacheable>(&self, key: &CacheKey) -> Option<Outcome<T>> {
        let cached = self.entries.get(key)?;
        let outcome = match cached {
            Outcome::Live(metadata) => Outcome::Live(T::from_metadata(metadata)?),
            Outcome::Degraded(metadata) => Outcome::Degraded(T::from_metadata(metadata)?),
            Outcome::Absent => return None,
        };
        tracing::trace!(event = "cache_hit", accessor = ?key.accessor, scope = ?key.scope);
        Some(outcome)
    }

    /// Store `outcome` unless the key is already populated.
    ///
    /// Returns whether the value was stored.
    pub fn remember<T: Cacheable>(&mut self, key: CacheKey, outcome: &Outcome<T>) -> bool {
        let Some(value) = outcome.value() else {
            return false;
        };
        if !value.is_stable() || self.entries.contains_key(&key) {
            return false;
        }
        let stored = outcome.as_ref().map(|value| value.clone().into_metadata());
        self.entries.insert(key, stored);
        true
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
