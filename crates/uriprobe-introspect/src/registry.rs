//! Scheme-based dispatch from a raw URI to an adapter instance.

use uriprobe_core::{Endpoint, Error, ProbeSettings, Result};

use crate::adapter::{Adapter, Memoized};
use crate::mysql::{self, MySqlBackend, MySqlFlavor};
use crate::postgres::{self, PostgresBackend};
use crate::redis::{self, RedisBackend};
use crate::smtp::{self, SmtpBackend};

/// Builds an adapter for an endpoint. Must not perform I/O.
pub type AdapterFactory = Box<dyn Fn(Endpoint, &ProbeSettings) -> Box<dyn Adapter> + Send + Sync>;

type SchemePredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

struct Registration {
    name: &'static str,
    claims: SchemePredicate,
    build: AdapterFactory,
}

/// Ordered set of adapter types. Built once at startup and read-only
/// afterwards; the first registration that claims a scheme and yields a
/// valid adapter wins.
pub struct AdapterRegistry {
    entries: Vec<Registration>,
    settings: ProbeSettings,
}

impl AdapterRegistry {
    pub fn new(settings: ProbeSettings) -> Self {
        Self {
            entries: Vec::new(),
            settings,
        }
    }

    /// Registry with every built-in backend: postgres, redis, mysql, mariadb, smtp.
    pub fn with_defaults(settings: ProbeSettings) -> Self {
        let mut registry = Self::new(settings);
        registry
            .register("postgres", postgres::handles_scheme, |endpoint, settings| {
                Box::new(Memoized::new(PostgresBackend::new(endpoint, settings)))
            })
            .register("redis", redis::handles_scheme, |endpoint, settings| {
                Box::new(Memoized::new(RedisBackend::new(endpoint, settings)))
            })
            .register(
                "mysql",
                |scheme| mysql::MySqlFlavor::from_scheme(scheme) == Some(MySqlFlavor::MySql),
                |endpoint, settings| {
                    Box::new(Memoized::new(MySqlBackend::new(
                        MySqlFlavor::MySql,
                        endpoint,
                        settings,
                    )))
                },
            )
            .register(
                "mariadb",
                |scheme| mysql::MySqlFlavor::from_scheme(scheme) == Some(MySqlFlavor::MariaDb),
                |endpoint, settings| {
                    Box::new(Memoized::new(MySqlBackend::new(
                        MySqlFlavor::MariaDb,
                        endpoint,
                        settings,
                    )))
                },
            )
            .register("smtp", smtp::handles_scheme, |endpoint, settings| {
                Box::new(Memoized::new(SmtpBackend::new(endpoint, settings)))
            });
        registry
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Append an adapter type; dispatch order is registration order.
    pub fn register<P, F>(&mut self, name: &'static str, claims: P, build: F) -> &mut Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
        F: Fn(Endpoint, &ProbeSettings) -> Box<dyn Adapter> + Send + Sync + 'static,
    {
        self.entries.push(Registration {
            name,
            claims: Box::new(claims),
            build: Box::new(build),
        });
        self
    }

    /// Registered adapter names in dispatch order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.name).collect()
    }

    /// Resolve `raw` to an adapter.
    ///
    /// Fails with [`Error::InvalidUri`] before any candidate is consulted
    /// and with [`Error::NoMatchingAdapter`] when no candidate both claims
    /// the scheme and validates.
    pub fn detect(&self, raw: &str) -> Result<Box<dyn Adapter>> {
        let endpoint = Endpoint::parse(raw)?;
        for entry in &self.entries {
            if !(entry.claims)(endpoint.scheme()) {
                continue;
            }
            let adapter = (entry.build)(endpoint.clone(), &self.settings);
            if adapter.is_valid() {
                tracing::debug!(event = "adapter_selected", adapter = entry.name, endpoint = %endpoint);
                return Ok(adapter);
            }
            tracing::debug!(event = "adapter_invalid", adapter = entry.name, endpoint = %endpoint);
        }
        Err(Error::NoMatchingAdapter(endpoint.scheme().to_string()))
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dispatch_order() {
        let registry = AdapterRegistry::with_defaults(ProbeSettings::default());
        assert_eq!(
            registry.kinds(),
            vec!["postgres", "redis", "mysql", "mariadb", "smtp"]
        );
    }

    #[test]
    fn schemes_map_to_kinds() {
        let registry = AdapterRegistry::with_defaults(ProbeSettings::default());
        for (uri, kind) in [
            ("postgresql://u:p@db/app", "postgres"),
            ("POSTGRES://db/app", "postgres"),
            ("rediss://cache:6380/1", "redis"),
            ("mysql://u:p@db:3306/app", "mysql"),
            ("mariadb://u:p@db/app", "mariadb"),
            ("smtps://relay:465", "smtp"),
        ] {
            let adapter = registry.detect(uri).unwrap();
            assert_eq!(adapter.kind().as_str(), kind, "{uri}");
        }
    }

    #[test]
    fn unknown_and_invalid_inputs() {
        let registry = AdapterRegistry::with_defaults(ProbeSettings::default());
        assert!(matches!(
            registry.detect("mongodb://db/app"),
            Err(Error::NoMatchingAdapter(scheme)) if scheme == "mongodb"
        ));
        assert!(matches!(registry.detect("not a uri"), Err(Error::InvalidUri(_))));
    }
}
