use std::fs;
use std::path::Path;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Environment variable that toggles the reversible write probe.
pub const WRITE_PROBE_ENV: &str = "URIPROBE_WRITE_PROBE";
/// Environment variable that overrides the bounded-scan cap in milliseconds.
pub const SCAN_CAP_ENV: &str = "URIPROBE_SCAN_CAP_MS";

/// Tunables for one probe run.
///
/// Every field has a default so an empty TOML document is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProbeSettings {
    pub retry: RetryPolicy,
    pub timeouts: Timeouts,
    pub scan: ScanSettings,
    pub privilege: PrivilegeSettings,
    pub tls: TlsSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Timeouts {
    pub connect_secs: u64,
    pub read_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            read_secs: 10,
        }
    }
}

impl Timeouts {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }
}

/// Limits for incremental key scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScanSettings {
    pub time_cap_ms: u64,
    /// COUNT hint passed to each SCAN page.
    pub batch: u32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            time_cap_ms: 5_000,
            batch: 1_000,
        }
    }
}

impl ScanSettings {
    pub fn time_cap(&self) -> Duration {
        Duration::from_millis(self.time_cap_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PrivilegeSettings {
    /// Run the create-then-remove step of the privilege ladder.
    pub write_probe: bool,
}

impl Default for PrivilegeSettings {
    fn default() -> Self {
        Self { write_probe: true }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TlsSettings {
    /// Skip certificate verification for `rediss`/`smtps` endpoints.
    pub accept_invalid_certs: bool,
}

impl ProbeSettings {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|err| Error::Settings(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|err| Error::Settings(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Apply `URIPROBE_*` overrides using `lookup` as the variable source.
    ///
    /// Unparseable values are ignored and leave the setting unchanged.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(WRITE_PROBE_ENV).and_then(|raw| parse_flag(&raw)) {
            self.privilege.write_probe = value;
        }
        if let Some(cap) = lookup(SCAN_CAP_ENV).and_then(|raw| raw.trim().parse().ok()) {
            self.scan.time_cap_ms = cap;
        }
    }
}

/// Interpret common boolean spellings (`1`, `true`, `yes`, `on` and their negatives).
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let settings = ProbeSettings::from_toml_str("").unwrap();
        assert_eq!(settings, ProbeSettings::default());
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.scan.time_cap(), Duration::from_secs(5));
        assert!(settings.privilege.write_probe);
        assert!(!settings.tls.accept_invalid_certs);
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let settings = ProbeSettings::from_toml_str(
            r#"
            [retry]
            max_attempts = 5

            [privilege]
            write_probe = false
            "#,
        )
        .unwrap();
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.base_delay_ms, 500);
        assert!(!settings.privilege.write_probe);
        assert_eq!(settings.timeouts.connect_secs, 5);
    }

    #[test]
    fn env_overrides() {
        let mut settings = ProbeSettings::default();
        settings.apply_env_overrides(|name| match name {
            WRITE_PROBE_ENV => Some("off".to_string()),
            SCAN_CAP_ENV => Some("250".to_string()),
            _ => None,
        });
        assert!(!settings.privilege.write_probe);
        assert_eq!(settings.scan.time_cap_ms, 250);

        settings.apply_env_overrides(|_| Some("garbage".to_string()));
        assert!(!settings.privilege.write_probe);
        assert_eq!(settings.scan.time_cap_ms, 250);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            ProbeSettings::from_toml_str("[retry\nmax_attempts = 1"),
            Err(Error::Settings(_))
        ));
    }
}
