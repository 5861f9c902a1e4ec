//! Weave configuration handling. Parses a TOML file into a strongly-typed
//! structure; protocol-level constants that must be agreed on at compile
//! time live beside it as `pub const`s.

use serde::Deserialize;
use std::{fs, path::Path};
use tracing::debug;

use crate::error::Result;

/// Maximum application payload accepted by `prepare_message`, in bytes.
/// Anything longer fails with `MessageTooLong` before any session state is
/// touched.
pub const MAX_APP_MESSAGE_LEN: usize = 1200;

/// Width of the anti-replay window tracked per peer, counting the highest
/// counter seen. Values more than this far behind the maximum are rejected
/// outright.
pub const MESSAGE_COUNTER_WINDOW_SIZE: u32 = 32;

/// Capacity of the secure session pool.
pub const SESSION_POOL_SIZE: usize = 16;

/// Operational certificate validity in calendar years.
pub const CERT_VALIDITY_YEARS: i32 = 10;

/// Start of issuer certificate validity: 2021-01-01T00:00:00Z.
pub const CERT_VALIDITY_START_EPOCH_SECS: u64 = 1_609_459_200;

fn default_listen_port() -> u16 {
    5540
}

fn default_idle_timeout_ms() -> u64 {
    300_000
}

/// Session lifecycle tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which the periodic sweep expires a session.
    pub idle_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

/// Primary configuration structure shared across Weave components.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
    /// Logging verbosity (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: Option<String>,

    /// UDP listen port for incoming traffic.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Session lifecycle tuning.
    pub session: SessionConfig,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            listen_port: default_listen_port(),
            session: SessionConfig::default(),
        }
    }
}

impl WeaveConfig {
    /// Load a configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(&path)?;
        let cfg = toml::from_str::<WeaveConfig>(&data)?;
        debug!(path = %path.as_ref().display(), "configuration loaded");
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let cfg = WeaveConfig::default();
        assert_eq!(cfg.listen_port, 5540);
        assert_eq!(cfg.session.idle_timeout_ms, 300_000);
    }

    #[test]
    fn loads_partial_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "listen_port = 11097").unwrap();
        writeln!(f, "[session]").unwrap();
        writeln!(f, "idle_timeout_ms = 1000").unwrap();
        let cfg = WeaveConfig::from_file(f.path()).unwrap();
        assert_eq!(cfg.listen_port, 11097);
        assert_eq!(cfg.session.idle_timeout_ms, 1000);
        assert_eq!(cfg.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn rejects_malformed_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "listen_port = \"not a port\"").unwrap();
        assert!(WeaveConfig::from_file(f.path()).is_err());
    }
}
