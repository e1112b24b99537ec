//! Channel configuration.
//!
//! A `ChannelConfig` is an explicit value handed to the endpoint
//! constructor — never a process global. For deployments that want a
//! file-backed config the loader resolves, in order: environment
//! variables → config file → defaults.
//!
//! Config file location:
//!   1. $SHROUD_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/shroud/config.toml
//!   3. ~/.config/shroud/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wire::{DEFAULT_MAX_PACKAGE_SIZE, DEFAULT_READ_BUFFER_SIZE};

/// Which half of the handshake this endpoint runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Server,
    Client,
}

/// How the session password crosses the wire during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeSecurity {
    /// The password is sent in the clear, byte-for-byte what deployed
    /// peers do. Confidentiality of the exchange rests entirely on the
    /// network. The default, for compatibility.
    Compatible,
    /// The server encrypts the password under the client's public key
    /// (PKCS#1 v1.5) and the client decrypts it. Both endpoints must
    /// agree on this mode.
    Encrypted,
}

/// Per-endpoint configuration. Both sides of a channel must agree on
/// `max_package_size` and `handshake_security`; the rest is local.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Hard cap on any single frame length in either direction.
    pub max_package_size: u32,
    /// Bit length of the client's ephemeral RSA key.
    pub rsa_key_size: usize,
    /// Compression policy: unset = opportunistic, true = always,
    /// false = never.
    pub compress: Option<bool>,
    pub handshake_security: HandshakeSecurity,
    /// Default sender chunk size for stream transfers.
    pub read_buffer_size: u32,
    /// Base for relative paths in the file-transfer helpers.
    /// Unset = the process working directory.
    pub cwd: Option<PathBuf>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_package_size: DEFAULT_MAX_PACKAGE_SIZE,
            rsa_key_size: 512,
            compress: None,
            handshake_security: HandshakeSecurity::Compatible,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            cwd: None,
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ChannelConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            ChannelConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SHROUD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply SHROUD_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SHROUD_MAX_PACKAGE_SIZE") {
            if let Ok(n) = v.parse() {
                self.max_package_size = n;
            }
        }
        if let Ok(v) = std::env::var("SHROUD_RSA_KEY_SIZE") {
            if let Ok(n) = v.parse() {
                self.rsa_key_size = n;
            }
        }
        if let Ok(v) = std::env::var("SHROUD_COMPRESS") {
            self.compress = match v.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            };
        }
        if let Ok(v) = std::env::var("SHROUD_HANDSHAKE_SECURITY") {
            match v.as_str() {
                "compatible" => self.handshake_security = HandshakeSecurity::Compatible,
                "encrypted" => self.handshake_security = HandshakeSecurity::Encrypted,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("SHROUD_READ_BUFFER_SIZE") {
            if let Ok(n) = v.parse() {
                self.read_buffer_size = n;
            }
        }
    }
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("shroud")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
