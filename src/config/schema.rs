//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the daemon.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration for the daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DaemonConfig {
    /// Admin listener address.
    pub listener: ListenerConfig,

    /// Admin API access and watchdog integration.
    pub admin: AdminConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request limits.
    pub security: SecurityConfig,

    /// Metrics exporter settings.
    pub observability: ObservabilityConfig,

    /// Logging user values (`level`, `target`, `redirect_stderr`).
    ///
    /// Kept as raw values so that the same validation applies here as to a
    /// `PUT /config.json` body.
    pub logging: Map<String, Value>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// `host:port`, `tcp://host:port` or `unix:/path/to/socket`.
    pub address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Instance directory shared with the watchdog. Empty when there is none.
    pub instance_dir: String,

    /// Password the watchdog requires before passing descriptors.
    pub fd_passing_password: String,

    /// Bearer tokens accepted by the admin API.
    pub api_keys: Vec<ApiKeyConfig>,

    /// Request slots kept for reuse.
    pub request_pool_size: usize,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            instance_dir: String::new(),
            fd_passing_password: String::new(),
            api_keys: Vec::new(),
            request_pool_size: 64,
        }
    }
}

/// One API key.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ApiKeyConfig {
    pub key: String,

    /// Super keys are granted every capability.
    #[serde(rename = "super", default)]
    pub is_super: bool,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: DaemonConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.address, "127.0.0.1:8081");
        assert_eq!(config.timeouts.request_secs, 30);
        assert!(config.admin.api_keys.is_empty());
        assert!(config.logging.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [listener]
            address = "unix:/tmp/admin.sock"

            [admin]
            instance_dir = "/run/router"
            fd_passing_password = "s3cret"
            api_keys = [
                { key = "ops", super = true },
                { key = "app" },
            ]

            [logging]
            level = "debug"
            target = "/var/log/router.log"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.address, "unix:/tmp/admin.sock");
        assert_eq!(config.admin.instance_dir, "/run/router");
        assert_eq!(
            config.admin.api_keys,
            vec![
                ApiKeyConfig { key: "ops".into(), is_super: true },
                ApiKeyConfig { key: "app".into(), is_super: false },
            ]
        );
        assert_eq!(config.logging["level"], "debug");
    }
}
