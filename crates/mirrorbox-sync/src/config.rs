//! Engine configuration.
//!
//! Stored as JSON. Every field has a default, so a partial file (or none at
//! all) is valid. Durations are written as whole seconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Result;

/// Top-level engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// IDLE connection behaviour.
    pub idle: IdleConfig,
    /// Reconnection backoff.
    pub backoff: BackoffConfig,
    /// Periodic sync and fetch sizing.
    pub sync: SyncConfig,
    /// Socket deadlines.
    pub connection: ConnectionConfig,
}

/// Settings for the per-account IDLE connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// IDLE is re-issued after this long. RFC 2177 servers may drop the
    /// client after 30 minutes, so keep it below 29.
    #[serde(with = "duration_secs")]
    pub cycle_interval: Duration,
    /// Run NOOP before each IDLE cycle to detect a dead socket early.
    pub health_check: bool,
    /// How long forwarding one event may block before it is dropped.
    #[serde(with = "duration_secs")]
    pub event_send_timeout: Duration,
    /// Grace period for `stop()` before the task is aborted.
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,
    /// Mailbox watched by IDLE.
    pub folder: String,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(25 * 60),
            health_check: true,
            event_send_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
            folder: "INBOX".to_string(),
        }
    }
}

/// Exponential reconnection backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// First delay, and the delay after a success.
    #[serde(with = "duration_secs")]
    pub floor: Duration,
    /// Delays never exceed this.
    #[serde(with = "duration_secs")]
    pub ceiling: Duration,
    /// Consecutive failures after which the connection gives up.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(5 * 60),
            max_attempts: 10,
        }
    }
}

/// Periodic sync settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval for accounts that do not set their own.
    #[serde(with = "duration_secs")]
    pub default_interval: Duration,
    /// UIDs per header FETCH.
    pub header_batch_size: usize,
    /// UIDs per body FETCH during backfill.
    pub body_batch_size: usize,
    /// Capacity of the shared event channel.
    pub event_channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(5 * 60),
            header_batch_size: 200,
            body_batch_size: 25,
            event_channel_capacity: 256,
        }
    }
}

/// Socket deadlines for every IMAP connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// TCP connect plus TLS handshake.
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Each read and write.
    #[serde(with = "duration_secs")]
    pub io_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Loads the configuration at `path`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Writes the configuration as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Rejects values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: &str| Err(crate::Error::Config(msg.to_string()));
        if self.idle.cycle_interval.is_zero() || self.idle.cycle_interval >= Duration::from_secs(29 * 60) {
            return bad("idle.cycle_interval must be between 1 second and 29 minutes");
        }
        if self.backoff.floor > self.backoff.ceiling {
            return bad("backoff.floor exceeds backoff.ceiling");
        }
        if self.sync.header_batch_size == 0 || self.sync.body_batch_size == 0 {
            return bad("batch sizes must be positive");
        }
        if self.sync.event_channel_capacity == 0 {
            return bad("sync.event_channel_capacity must be positive");
        }
        Ok(())
    }
}

/// Default config file location: `<config dir>/mirrorbox/config.json`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mirrorbox").join("config.json"))
}

/// Default mirror database location: `<data dir>/mirrorbox/mirror.db`.
#[must_use]
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("mirrorbox").join("mirror.db"))
}

/// Serde adapter writing a [`Duration`] as whole seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes as seconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    /// Deserializes from seconds.
    ///
    /// # Errors
    ///
    /// Fails when the value is not an unsigned integer.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.idle.cycle_interval, Duration::from_secs(1500));
        assert!(config.idle.health_check);
        assert_eq!(config.idle.folder, "INBOX");
        assert_eq!(config.backoff.max_attempts, 10);
        assert_eq!(config.sync.header_batch_size, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"backoff": {"ceiling": 60}, "idle": {"folder": "Work"}}"#)
                .unwrap();
        assert_eq!(config.backoff.ceiling, Duration::from_secs(60));
        assert_eq!(config.backoff.floor, Duration::from_secs(1));
        assert_eq!(config.idle.folder, "Work");
        assert_eq!(config.idle.cycle_interval, Duration::from_secs(1500));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("mirrorbox-config-does-not-exist.json");
        assert_eq!(EngineConfig::load(&path).unwrap(), EngineConfig::default());
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir()
            .join(format!("mirrorbox-config-{}", std::process::id()))
            .join("config.json");
        let mut config = EngineConfig::default();
        config.sync.body_batch_size = 7;
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn idle_cycle_must_stay_below_rfc_limit() {
        let mut config = EngineConfig::default();
        config.idle.cycle_interval = Duration::from_secs(30 * 60);
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn floor_above_ceiling_is_rejected() {
        let mut config = EngineConfig::default();
        config.backoff.floor = Duration::from_secs(600);
        assert!(config.validate().is_err());
    }
}
