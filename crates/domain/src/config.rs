//! Layered configuration: TOML file (optional) overridden by environment
//! variables, read once at startup. Every overridable field accepts both
//! its current env var name and one documented legacy alias; the current
//! name wins when both are set, and a one-time warning is logged when
//! only the legacy name is present.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            ConfigSeverity::Error => "error",
            ConfigSeverity::Warning => "warning",
        };
        write!(f, "[{label}] {}", self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub ingress_port: u16,
    pub ingress_rpc_port: u16,
    pub orchestrator_http_port: u16,
    pub orchestrator_rpc_port: u16,
    pub api_key: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: d_host(),
            ingress_port: d_ingress_port(),
            ingress_rpc_port: d_ingress_rpc_port(),
            orchestrator_http_port: d_orch_http_port(),
            orchestrator_rpc_port: d_orch_rpc_port(),
            api_key: None,
            cors_origins: d_cors_origins(),
        }
    }
}

fn d_host() -> String {
    "0.0.0.0".to_string()
}
fn d_ingress_port() -> u16 {
    8081
}
fn d_ingress_rpc_port() -> u16 {
    8083
}
fn d_orch_http_port() -> u16 {
    8080
}
fn d_orch_rpc_port() -> u16 {
    8082
}
fn d_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub agent_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub ping_interval_ms: u64,
    pub max_message_bytes: usize,
    pub default_tool_timeout_ms: u64,
    pub sweeper_tick_ms: u64,
    pub sweeper_batch_limit: usize,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        TimeoutsConfig {
            agent_timeout_ms: d_agent_timeout_ms(),
            read_timeout_ms: d_read_timeout_ms(),
            write_timeout_ms: d_write_timeout_ms(),
            ping_interval_ms: d_ping_interval_ms(),
            max_message_bytes: d_max_message_bytes(),
            default_tool_timeout_ms: d_default_tool_timeout_ms(),
            sweeper_tick_ms: d_sweeper_tick_ms(),
            sweeper_batch_limit: d_sweeper_batch_limit(),
        }
    }
}

fn d_agent_timeout_ms() -> u64 {
    30_000
}
fn d_read_timeout_ms() -> u64 {
    60_000
}
fn d_write_timeout_ms() -> u64 {
    10_000
}
fn d_ping_interval_ms() -> u64 {
    20_000
}
fn d_max_message_bytes() -> usize {
    1_048_576
}
fn d_default_tool_timeout_ms() -> u64 {
    30_000
}
fn d_sweeper_tick_ms() -> u64 {
    500
}
fn d_sweeper_batch_limit() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorLinkConfig {
    pub host: String,
    pub rpc_port: u16,
}

impl Default for OrchestratorLinkConfig {
    fn default() -> Self {
        OrchestratorLinkConfig {
            host: "127.0.0.1".to_string(),
            rpc_port: d_orch_rpc_port(),
        }
    }
}

/// Where the orchestrator dials Ingress's `PushEvent` RPC listener —
/// the mirror image of [`OrchestratorLinkConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressLinkConfig {
    pub host: String,
    pub rpc_port: u16,
}

impl Default for IngressLinkConfig {
    fn default() -> Self {
        IngressLinkConfig {
            host: "127.0.0.1".to_string(),
            rpc_port: d_ingress_rpc_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub timeouts: TimeoutsConfig,
    pub log: LogConfig,
    pub orchestrator_link: OrchestratorLinkConfig,
    pub ingress_link: IngressLinkConfig,
}

impl Config {
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let ports = [
            self.server.ingress_port,
            self.server.ingress_rpc_port,
            self.server.orchestrator_http_port,
            self.server.orchestrator_rpc_port,
        ];
        let unique: std::collections::HashSet<u16> = ports.iter().copied().collect();
        if unique.len() != ports.len() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                message: "two or more of ingress_port/ingress_rpc_port/orchestrator_http_port/orchestrator_rpc_port collide"
                    .to_string(),
            });
        }
        if self.server.api_key.as_deref().unwrap_or("").is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                message: "no api key configured; running in dev mode (unauthenticated)".to_string(),
            });
        }
        if self.timeouts.sweeper_tick_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                message: "timeouts.sweeper_tick_ms must be non-zero".to_string(),
            });
        }
        errors
    }

    /// Apply environment overrides on top of a file-or-default config.
    /// Each field accepts its current name and, if unset, falls back to
    /// one legacy alias — logging a warning the first time the legacy
    /// name alone is what was found.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_with_legacy("ORCH_API_KEY", "SA_API_TOKEN") {
            self.server.api_key = Some(v);
        }
        if let Some(v) = env_with_legacy("INGRESS_PORT", "GATEWAY_PORT") {
            if let Ok(p) = v.parse() {
                self.server.ingress_port = p;
            }
        }
        if let Some(v) = env_with_legacy("INGRESS_RPC_PORT", "INGRESS_LINK_PORT") {
            if let Ok(p) = v.parse() {
                self.server.ingress_rpc_port = p;
                self.ingress_link.rpc_port = p;
            }
        }
        if let Some(v) = env_with_legacy("INGRESS_LINK_HOST", "INGRESS_HOST") {
            self.ingress_link.host = v;
        }
        if let Some(v) = env_with_legacy("ORCH_HTTP_PORT", "ORCHESTRATOR_PORT") {
            if let Ok(p) = v.parse() {
                self.server.orchestrator_http_port = p;
            }
        }
        if let Some(v) = env_with_legacy("ORCH_RPC_PORT", "ORCHESTRATOR_RPC_PORT") {
            if let Ok(p) = v.parse() {
                self.server.orchestrator_rpc_port = p;
                self.orchestrator_link.rpc_port = p;
            }
        }
        if let Some(v) = env_with_legacy("ORCH_LINK_HOST", "ORCHESTRATOR_HOST") {
            self.orchestrator_link.host = v;
        }
        if let Some(v) = env_with_legacy("LOG_LEVEL", "RUST_LOG_LEVEL") {
            self.log.level = v;
        }
    }
}

/// Read `name`; if unset, fall back to `legacy_name` and log a one-time
/// warning that the legacy name should be migrated.
fn env_with_legacy(name: &str, legacy_name: &str) -> Option<String> {
    if let Ok(v) = std::env::var(name) {
        if !v.is_empty() {
            return Some(v);
        }
    }
    match std::env::var(legacy_name) {
        Ok(v) if !v.is_empty() => {
            tracing::warn!(
                current = name,
                legacy = legacy_name,
                "configuration read from a legacy environment variable name; please migrate"
            );
            Some(v)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_one_dev_mode_warning() {
        let cfg = Config::default();
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.severity == ConfigSeverity::Warning && e.message.contains("dev mode")));
    }

    #[test]
    fn colliding_ports_is_an_error() {
        let mut cfg = Config::default();
        cfg.server.orchestrator_http_port = cfg.server.ingress_port;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.severity == ConfigSeverity::Error));
    }
}
