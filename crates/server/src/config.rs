// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered configuration: built-in defaults, then an optional TOML file,
//! then environment variables. Mirrors the teacher's daemon env-var
//! precedence convention (`oj-daemon::env`), but every default lives in
//! `Default` impls here rather than scattered `std::env::var` call sites.

use manager_dispatcher::DispatchConfig;
use manager_registry::RegistryConfig;
use manager_stream::StreamProxyConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Network and handshake tunables; the one part of the configuration with
/// no existing component-crate home.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    pub auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            ping_interval_ms: 10_000,
            ping_timeout_ms: 5_000,
            auth_token: None,
        }
    }
}

/// The full configuration tree, embedding each component's own config
/// rather than re-declaring their fields here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub dispatch: DispatchConfig,
    pub stream: StreamProxyConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

impl ManagerConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
                toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?
            }
            None => ManagerConfig::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_string("MANAGER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = env_u16("MANAGER_PORT") {
            self.server.port = v;
        }
        if let Some(v) = env_u64("MANAGER_PING_INTERVAL_MS") {
            self.server.ping_interval_ms = v;
        }
        if let Some(v) = env_u64("MANAGER_PING_TIMEOUT_MS") {
            self.server.ping_timeout_ms = v;
        }
        if let Some(v) = env_string("MANAGER_AUTH_TOKEN") {
            self.server.auth_token = Some(v);
        }

        if let Some(v) = env_u64("MANAGER_HEARTBEAT_TIMEOUT_MS") {
            self.registry.heartbeat_timeout_ms = v;
        }
        if let Some(v) = env_u64("MANAGER_HEALTH_CHECK_INTERVAL_MS") {
            self.registry.health_check_interval_ms = v;
        }

        if let Some(v) = env_u64("MANAGER_DEFAULT_TIMEOUT_MS") {
            self.dispatch.default_timeout_ms = v;
        }
        if let Some(v) = env_u32("MANAGER_RETRY_MAX_ATTEMPTS") {
            self.dispatch.default_retry.max_attempts = v;
        }
        if let Some(v) = env_u64("MANAGER_RETRY_DELAY_MS") {
            self.dispatch.default_retry.delay_ms = v;
        }

        if let Some(v) = env_usize("MANAGER_MAX_BUFFER_SIZE") {
            self.stream.max_buffer_size = v;
        }
        if let Some(v) = env_usize("MANAGER_MAX_VIEWERS_PER_STREAM") {
            self.stream.max_viewers_per_stream = v;
        }
        if let Some(v) = env_u32("MANAGER_MAX_FRAME_RATE") {
            self.stream.max_frame_rate = v;
        }
        if let Some(v) = env_usize("MANAGER_QUALITY_REDUCTION_THRESHOLD") {
            self.stream.quality_reduction_threshold = v;
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_u16(name: &str) -> Option<u16> {
    env_string(name).and_then(|s| s.parse().ok())
}

fn env_u32(name: &str) -> Option<u32> {
    env_string(name).and_then(|s| s.parse().ok())
}

fn env_u64(name: &str) -> Option<u64> {
    env_string(name).and_then(|s| s.parse().ok())
}

fn env_usize(name: &str) -> Option<usize> {
    env_string(name).and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_spec_table_when_no_file_or_env() {
        let config = ManagerConfig::default();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.registry.heartbeat_timeout_ms, 30_000);
        assert_eq!(config.dispatch.default_timeout_ms, 300_000);
        assert_eq!(config.stream.max_viewers_per_stream, 10);
    }

    #[test]
    #[serial]
    fn env_override_wins_over_default() {
        std::env::set_var("MANAGER_PORT", "9999");
        let config = ManagerConfig::load(None).expect("load");
        assert_eq!(config.server.port, 9999);
        std::env::remove_var("MANAGER_PORT");
    }

    #[test]
    fn file_values_are_applied_and_env_still_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("manager.toml");
        std::fs::write(&path, "[server]\nport = 4242\n").expect("write");
        let config = ManagerConfig::load(Some(&path)).expect("load");
        assert_eq!(config.server.port, 4242);
    }
}
