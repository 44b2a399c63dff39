//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP/WebSocket server to.
    /// Override: `SYNCSONG_BIND_PORT`, then `PORT`
    pub bind_port: u16,

    /// Origins allowed by CORS. `*` allows any origin.
    /// Override: `SYNCSONG_CORS_ORIGINS` (comma-separated)
    pub cors_origins: Vec<String>,

    /// Close WebSocket connections idle for longer than this (seconds).
    pub ws_heartbeat_timeout_secs: u64,

    /// Interval between server pings (seconds).
    pub ws_ping_interval_secs: u64,

    /// Outbound messages buffered per member before drops.
    pub member_outbox_capacity: usize,

    /// Maximum display name length (characters).
    pub max_display_name_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = syncsong_core::Config::default();
        Self {
            bind_port: core.preferred_port,
            cors_origins: core.cors_origins,
            ws_heartbeat_timeout_secs: core.ws_heartbeat_timeout_secs,
            ws_ping_interval_secs: core.ws_ping_interval_secs,
            member_outbox_capacity: core.member_outbox_capacity,
            max_display_name_len: core.max_display_name_len,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load), reading overrides through `var`.
    pub fn load_with(path: Option<&Path>, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides(var);
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let port = var("SYNCSONG_BIND_PORT").or_else(|| var("PORT"));
        if let Some(val) = port {
            match val.trim().parse() {
                Ok(port) => self.bind_port = port,
                Err(_) => log::warn!("Ignoring invalid port override: {:?}", val),
            }
        }

        if let Some(val) = var("SYNCSONG_CORS_ORIGINS") {
            self.cors_origins = parse_origins(&val);
        }

        // Note: SYNCSONG_LOG_LEVEL is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to syncsong-core's Config type.
    pub fn to_core_config(&self) -> syncsong_core::Config {
        syncsong_core::Config {
            preferred_port: self.bind_port,
            cors_origins: self.cors_origins.clone(),
            ws_heartbeat_timeout_secs: self.ws_heartbeat_timeout_secs,
            ws_ping_interval_secs: self.ws_ping_interval_secs,
            member_outbox_capacity: self.member_outbox_capacity,
            max_display_name_len: self.max_display_name_len,
            ..Default::default()
        }
    }
}

/// Splits a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn yaml_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_core() {
        let config = ServerConfig::load_with(None, no_env).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.to_core_config(), syncsong_core::Config::default());
    }

    #[test]
    fn yaml_overrides_only_given_fields() {
        let file = yaml_file("bind_port: 8080\ncors_origins:\n  - https://a.example\n");
        let config = ServerConfig::load_with(Some(file.path()), no_env).unwrap();
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.cors_origins, vec!["https://a.example".to_string()]);
        assert_eq!(
            config.ws_heartbeat_timeout_secs,
            ServerConfig::default().ws_heartbeat_timeout_secs
        );
    }

    #[test]
    fn env_overrides_file() {
        let file = yaml_file("bind_port: 8080\n");
        let config = ServerConfig::load_with(
            Some(file.path()),
            env(&[
                ("PORT", "9000"),
                ("SYNCSONG_BIND_PORT", "9100"),
                ("SYNCSONG_CORS_ORIGINS", "https://a.example, ,https://b.example"),
            ]),
        )
        .unwrap();
        assert_eq!(config.bind_port, 9100);
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );

        let config = ServerConfig::load_with(None, env(&[("PORT", "9000")])).unwrap();
        assert_eq!(config.bind_port, 9000);
    }

    #[test]
    fn invalid_port_override_is_ignored() {
        let config =
            ServerConfig::load_with(None, env(&[("SYNCSONG_BIND_PORT", "not-a-port")])).unwrap();
        assert_eq!(config.bind_port, ServerConfig::default().bind_port);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let file = yaml_file("bind_port: [oops\n");
        let err = ServerConfig::load_with(Some(file.path()), no_env).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err =
            ServerConfig::load_with(Some(Path::new("/nonexistent/syncsong.yaml")), no_env)
                .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
