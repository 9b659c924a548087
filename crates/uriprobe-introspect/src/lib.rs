//! Backend adapters for uriprobe.
//!
//! A URI goes into [`AdapterRegistry::detect`] and comes back as a boxed
//! [`Adapter`]. Every accessor on the adapter is memoized, connects lazily
//! through a [`ConnectionManager`] and answers with an
//! [`Outcome`](uriprobe_core::Outcome) instead of an error.

pub mod adapter;
pub mod cache;
pub mod degraded;
pub mod lifecycle;
pub mod mysql;
pub mod postgres;
pub mod probe;
pub mod redis;
pub mod registry;
pub mod report;
pub mod session;
pub mod smtp;
mod sql;
pub mod transport;

pub use adapter::{Adapter, Backend, Memoized};
pub use cache::{Accessor, CacheKey, Cacheable, Metadata, MetadataCache};
pub use lifecycle::{ConnectionManager, Phase};
pub use mysql::{MySqlBackend, MySqlConnector, MySqlFlavor};
pub use postgres::{PgConnector, PostgresBackend};
pub use probe::{PrivilegeLadder, run_ladder};
pub use redis::{RedisBackend, RedisConnector};
pub use registry::{AdapterFactory, AdapterRegistry};
pub use report::{ProbeReport, ReportScope};
pub use session::{Connector, KvSession, MailReply, MailSession, Reply, Row, Session, SqlSession, Value};
pub use smtp::{SmtpBackend, SmtpConnector};
