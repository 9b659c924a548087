use std::fmt;

use url::{Host, Url};

use crate::error::{Error, Result};
use crate::redaction::redact_uri;

/// Immutable description of the endpoint a URI points at.
///
/// Derived once per adapter instance. Credentials are percent-decoded; the
/// scheme is lower-cased so dispatch is case-insensitive.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    raw: String,
}

impl Endpoint {
    /// Parse a raw URI string.
    ///
    /// Fails with [`Error::InvalidUri`] for anything that is not an absolute
    /// URI, including strings with surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw.trim() != raw {
            return Err(Error::InvalidUri("empty or padded with whitespace".to_string()));
        }
        let url = Url::parse(raw).map_err(|err| Error::InvalidUri(err.to_string()))?;
        Ok(Self::from_url(&url, raw.to_string()))
    }

    fn from_url(url: &Url, raw: String) -> Self {
        let host = url.host().map(|host| match host {
            Host::Domain(name) => name.to_string(),
            Host::Ipv4(addr) => addr.to_string(),
            Host::Ipv6(addr) => addr.to_string(),
        });
        let user = Some(url.username())
            .filter(|name| !name.is_empty())
            .map(decode_component);
        let password = url.password().map(decode_component);
        let database = Some(url.path().trim_start_matches('/'))
            .filter(|path| !path.is_empty())
            .map(decode_component);

        Self {
            scheme: url.scheme().to_ascii_lowercase(),
            host,
            port: url.port(),
            user,
            password,
            database,
            raw,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Host to dial, falling back to the loopback name when the URI has none.
    pub fn host_or_localhost(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Path component without the leading slash (database name or index).
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// True when the URI alone identifies both a database and a principal.
    pub fn has_identity_hint(&self) -> bool {
        self.database.is_some() && self.user.is_some()
    }

    /// The raw URI with secrets masked, safe to log or render.
    pub fn redacted(&self) -> String {
        match Url::parse(&self.raw) {
            Ok(url) => redact_uri(&url),
            Err(_) => String::from("<unparseable>"),
        }
    }

    /// A new descriptor identical to this one but scoped to `database`.
    pub fn with_database(&self, database: &str) -> Self {
        let Ok(mut url) = Url::parse(&self.raw) else {
            return self.clone();
        };
        url.set_path(&format!("/{}", urlencoding::encode(database)));
        let raw = url.to_string();
        Self::from_url(&url, raw)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("uri", &self.redacted())
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

fn decode_component(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}
