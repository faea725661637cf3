//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges (timeouts > 0, body limit > 0)
//! - Check API keys are usable and unambiguous
//! - Validate the logging section with the same rules as the admin API
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DaemonConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::DaemonConfig;
use crate::net::ListenAddress;
use crate::observability::LogConfig;

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &DaemonConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = config.listener.address.parse::<ListenAddress>() {
        errors.push(ValidationError::new("listener.address", e.to_string()));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    if config.admin.request_pool_size == 0 {
        errors.push(ValidationError::new("admin.request_pool_size", "must be greater than 0"));
    }

    let mut seen = HashSet::new();
    for (i, key) in config.admin.api_keys.iter().enumerate() {
        if key.key.trim().is_empty() {
            errors.push(ValidationError::new(format!("admin.api_keys[{}].key", i), "must not be empty"));
        } else if !seen.insert(key.key.as_str()) {
            errors.push(ValidationError::new(format!("admin.api_keys[{}].key", i), "duplicate API key"));
        }
    }

    if !config.admin.fd_passing_password.is_empty() && config.admin.instance_dir.is_empty() {
        errors.push(ValidationError::new(
            "admin.fd_passing_password",
            "requires admin.instance_dir to be set",
        ));
    }

    if config.observability.metrics_enabled && config.observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("observability.metrics_address", "not a valid socket address"));
    }

    if let Err(log_errors) = LogConfig::from_user_values(config.logging.clone()) {
        errors.extend(
            log_errors
                .into_iter()
                .map(|e| ValidationError::new(format!("logging.{}", e.key), e.message)),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ApiKeyConfig;
    use serde_json::json;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&DaemonConfig::default()).is_ok());
    }

    #[test]
    fn test_all_errors_reported() {
        let mut config = DaemonConfig::default();
        config.listener.address = "not an address".into();
        config.timeouts.request_secs = 0;
        config.admin.api_keys = vec![
            ApiKeyConfig { key: "k".into(), is_super: true },
            ApiKeyConfig { key: "k".into(), is_super: false },
            ApiKeyConfig { key: " ".into(), is_super: false },
        ];
        config.logging.insert("level".into(), json!("loud"));

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.address",
                "timeouts.request_secs",
                "admin.api_keys[1].key",
                "admin.api_keys[2].key",
                "logging.level",
            ]
        );
    }

    #[test]
    fn test_password_requires_instance_dir() {
        let mut config = DaemonConfig::default();
        config.admin.fd_passing_password = "pw".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "admin.fd_passing_password");

        config.admin.instance_dir = "/run/router".into();
        assert!(validate_config(&config).is_ok());
    }
}
