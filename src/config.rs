//! Configuration loading and persistence.
//!
//! [`Config`] is built once at startup by [`Config::load`] (file, then
//! environment overrides) and handed to whatever needs it. Nothing reads
//! configuration from global state afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::constants;
use crate::terminal::{RetryPolicy, TerminalSettings, WireFormat};

/// File name of the configuration inside [`Config::config_dir`].
pub const CONFIG_FILE: &str = "config.json";

/// File name of the persisted workspace registration.
pub const WORKSPACE_FILE: &str = "workspace.json";

/// Configuration for the glask CLI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the terminal and filesystem backend.
    pub server_url: String,
    /// Consecutive connection failures before a pane gives up.
    pub max_connect_attempts: u32,
    /// Backoff delay after the first failure, in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Backoff cap, in milliseconds.
    pub retry_max_delay_ms: u64,
    /// Random jitter added to each backoff delay, in milliseconds.
    pub retry_jitter_ms: u64,
    /// Delay before reconnecting after a disconnect, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Soft command timeout, in milliseconds.
    pub command_timeout_ms: u64,
    /// WebSocket handshake timeout, in milliseconds.
    pub socket_open_timeout_ms: u64,
    /// Outbound command encoding.
    pub wire_format: WireFormat,
    /// Filesystem cache lifetime, in seconds.
    pub cache_ttl_secs: u64,
    /// Monospace cell width used for pixel resizes.
    pub cell_width_px: f64,
    /// Monospace cell height used for pixel resizes.
    pub cell_height_px: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3001".to_string(),
            max_connect_attempts: constants::MAX_CONNECT_ATTEMPTS,
            retry_base_delay_ms: millis(constants::RETRY_BASE_DELAY),
            retry_max_delay_ms: millis(constants::RETRY_MAX_DELAY),
            retry_jitter_ms: 0,
            reconnect_delay_ms: millis(constants::RECONNECT_DELAY),
            command_timeout_ms: millis(constants::COMMAND_SOFT_TIMEOUT),
            socket_open_timeout_ms: millis(constants::SOCKET_OPEN_TIMEOUT),
            wire_format: WireFormat::default(),
            cache_ttl_secs: constants::FS_CACHE_TTL.as_secs(),
            cell_width_px: constants::CELL_WIDTH_PX,
            cell_height_px: constants::CELL_HEIGHT_PX,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `tmp/glask-test`
    /// 2. `GLASK_CONFIG_DIR` env var: explicit override
    /// 3. `GLASK_ENV=test`: `tmp/glask-test` (integration tests)
    /// 4. Default: platform config dir (Linux: ~/.config/glask)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/glask-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(dir) = std::env::var("GLASK_CONFIG_DIR") {
                    PathBuf::from(dir)
                } else if crate::env::is_test_mode() {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/glask-test")
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join("glask")
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Path of the persisted workspace registration.
    pub fn workspace_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(WORKSPACE_FILE))
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_dir()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load `config.json` from `dir`, falling back to defaults if it is absent.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `GLASK_*` overrides from `lookup`. Unparseable values are
    /// logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(server_url) = lookup("GLASK_SERVER_URL") {
            self.server_url = server_url;
        }
        override_parsed(&lookup, "GLASK_MAX_CONNECT_ATTEMPTS", &mut self.max_connect_attempts);
        override_parsed(&lookup, "GLASK_RECONNECT_DELAY_MS", &mut self.reconnect_delay_ms);
        override_parsed(&lookup, "GLASK_COMMAND_TIMEOUT_MS", &mut self.command_timeout_ms);
        override_parsed(&lookup, "GLASK_WIRE_FORMAT", &mut self.wire_format);
        override_parsed(&lookup, "GLASK_CACHE_TTL_SECS", &mut self.cache_ttl_secs);
    }

    /// Persists the current configuration to the config directory.
    pub fn save(&self) -> Result<PathBuf> {
        self.save_to(&Self::config_dir()?)
    }

    /// Write `config.json` into `dir` (owner read/write only on unix).
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        #[cfg(unix)]
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;

        Ok(path)
    }

    /// Settings for the terminal state machine.
    pub fn terminal_settings(&self) -> TerminalSettings {
        TerminalSettings {
            wire_format: self.wire_format,
            retry: RetryPolicy {
                max_attempts: self.max_connect_attempts.max(1),
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
                jitter: Duration::from_millis(self.retry_jitter_ms),
            },
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            cell_width_px: self.cell_width_px,
            cell_height_px: self.cell_height_px,
        }
    }

    /// WebSocket handshake timeout.
    pub fn socket_open_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_open_timeout_ms)
    }

    /// Filesystem cache lifetime.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => log::warn!("Ignoring invalid {key}={raw}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://localhost:3001");
        assert_eq!(config.max_connect_attempts, 5);
        assert_eq!(config.reconnect_delay_ms, 2000);
        assert_eq!(config.command_timeout_ms, 1000);
        assert_eq!(config.wire_format, WireFormat::Raw);
        assert_eq!(config.cache_ttl_secs, 3600);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"server_url":"http://example:9000","wire_format":"envelope"}"#)
                .unwrap();
        assert_eq!(config.server_url, "http://example:9000");
        assert_eq!(config.wire_format, WireFormat::Envelope);
        assert_eq!(config.max_connect_attempts, 5);
    }

    #[test]
    fn test_overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            ("GLASK_SERVER_URL", "https://glask.dev"),
            ("GLASK_MAX_CONNECT_ATTEMPTS", "3"),
            ("GLASK_COMMAND_TIMEOUT_MS", "not-a-number"),
            ("GLASK_WIRE_FORMAT", "envelope"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.server_url, "https://glask.dev");
        assert_eq!(config.max_connect_attempts, 3);
        assert_eq!(config.command_timeout_ms, 1000);
        assert_eq!(config.wire_format, WireFormat::Envelope);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            server_url: "http://127.0.0.1:4000".into(),
            retry_jitter_ms: 250,
            ..Config::default()
        };
        let path = config.save_to(dir.path()).unwrap();
        assert!(path.ends_with(CONFIG_FILE));

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        assert_eq!(Config::load_from(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_default_but_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_from(dir.path()).unwrap(), Config::default());

        fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        assert!(Config::load_from(dir.path()).is_err());
    }

    #[test]
    fn test_terminal_settings_conversion() {
        let config = Config {
            max_connect_attempts: 0,
            retry_base_delay_ms: 500,
            ..Config::default()
        };
        let settings = config.terminal_settings();
        assert_eq!(settings.retry.max_attempts, 1);
        assert_eq!(settings.retry.base_delay, Duration::from_millis(500));
        assert_eq!(settings.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.socket_open_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_dir_is_under_tmp_in_unit_tests() {
        let dir = Config::config_dir().unwrap();
        assert!(dir.ends_with("tmp/glask-test"));
    }
}
