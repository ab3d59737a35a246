//! Configuration for dRPC endpoints.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $DRPC_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/drpc/config.toml
//!   3. ~/.config/drpc/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrpcConfig {
    pub socket: SocketConfig,
    pub client: ClientConfig,
    pub echo: EchoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Unix socket the server listens on and clients dial.
    pub path: PathBuf,
    /// File mode applied to the socket after bind, written as octal ("0600").
    #[serde(with = "octal_mode")]
    pub mode: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Cancel an outstanding call after this many seconds. 0 = wait forever.
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    /// Module id the diagnostic echo module registers under.
    pub module_id: i32,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for DrpcConfig {
    fn default() -> Self {
        Self {
            socket: SocketConfig::default(),
            client: ClientConfig::default(),
            echo: EchoConfig::default(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            path: runtime_dir().join("drpc.sock"),
            mode: 0o600,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 30,
        }
    }
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self { module_id: 100 }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("drpc")
}

fn runtime_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join("drpc")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Octal mode serde ──────────────────────────────────────────────────────────

mod octal_mode {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mode: &u32, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{:04o}", mode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let text = String::deserialize(d)?;
        super::parse_mode(&text).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid octal file mode: {text:?}"))
        })
    }
}

/// Parse an octal file mode such as "0600" or "660".
pub fn parse_mode(text: &str) -> Option<u32> {
    let digits = text.trim().trim_start_matches("0o");
    u32::from_str_radix(digits, 8).ok().filter(|m| *m <= 0o7777)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl DrpcConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            DrpcConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("DRPC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&DrpcConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply DRPC_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overrides from any key lookup. Values that fail to parse are logged
    /// and leave the current setting in place.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("DRPC_SOCKET__PATH") {
            self.socket.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DRPC_SOCKET__MODE") {
            match parse_mode(&v) {
                Some(m) => self.socket.mode = m,
                None => tracing::warn!(
                    value = %v,
                    keeping = %format!("{:04o}", self.socket.mode),
                    "ignoring invalid DRPC_SOCKET__MODE"
                ),
            }
        }
        if let Some(v) = lookup("DRPC_CLIENT__CALL_TIMEOUT_SECS") {
            match v.parse() {
                Ok(t) => self.client.call_timeout_secs = t,
                Err(e) => tracing::warn!(
                    value = %v,
                    error = %e,
                    keeping = self.client.call_timeout_secs,
                    "ignoring invalid DRPC_CLIENT__CALL_TIMEOUT_SECS"
                ),
            }
        }
    }
}
