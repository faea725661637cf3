//! Logging configuration schema.
//!
//! The logging subsystem keeps the values the operator explicitly set
//! ("user values") next to the typed, effective configuration derived from
//! them. Updates arrive as JSON deltas: a key set to `null` falls back to its
//! default, and every key is checked before anything is accepted, so a
//! rejected update reports all of its problems at once.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde_json::{json, Map, Value};

/// Log severity, in decreasing order of importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Crit = 0,
    Error = 1,
    Warn = 2,
    Notice = 3,
    Info = 4,
    Debug = 5,
    Debug2 = 6,
    Debug3 = 7,
}

impl LogLevel {
    pub const ALL: [LogLevel; 8] = [
        LogLevel::Crit,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Notice,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Debug2,
        LogLevel::Debug3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Crit => "crit",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Debug2 => "debug2",
            LogLevel::Debug3 => "debug3",
        }
    }

    /// The `tracing` filter directive this level maps onto.
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Crit | LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Notice | LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Debug2 | LogLevel::Debug3 => "trace",
        }
    }

    /// Accepts either a level name or its number (0-7).
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| Self::ALL.get(usize::try_from(n).ok()?).copied()),
            _ => None,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    fn to_value(&self) -> Value {
        match self {
            LogTarget::Stderr => Value::String("stderr".to_string()),
            LogTarget::File(path) => Value::String(path.display().to_string()),
        }
    }
}

/// A single validation failure for one configuration key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: String,
    pub message: String,
}

impl ConfigError {
    fn new(key: &str, message: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Join validation errors into one human-readable line.
pub fn errors_to_string(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Effective logging configuration plus the user values it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    user_values: Map<String, Value>,
    pub level: LogLevel,
    pub target: LogTarget,
    pub redirect_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            user_values: Map::new(),
            level: LogLevel::Notice,
            target: LogTarget::Stderr,
            redirect_stderr: false,
        }
    }
}

impl LogConfig {
    pub const KEYS: &'static [&'static str] = &["level", "target", "redirect_stderr"];

    /// Build a configuration from user-specified values, validating every key.
    pub fn from_user_values(values: Map<String, Value>) -> Result<Self, Vec<ConfigError>> {
        let mut config = LogConfig::default();
        let mut errors = Vec::new();

        for (key, value) in &values {
            match key.as_str() {
                "level" => match LogLevel::from_value(value) {
                    Some(level) => config.level = level,
                    None => errors.push(ConfigError::new(
                        key,
                        format!(
                            "'level' must be one of {} or a number between 0 and 7",
                            LogLevel::ALL.map(|l| l.as_str()).join(", ")
                        ),
                    )),
                },
                "target" => match value.as_str() {
                    Some("stderr") => config.target = LogTarget::Stderr,
                    Some(path) if !path.trim().is_empty() => {
                        config.target = LogTarget::File(PathBuf::from(path))
                    }
                    _ => errors.push(ConfigError::new(
                        key,
                        "'target' must be \"stderr\" or a non-empty file path",
                    )),
                },
                "redirect_stderr" => match value.as_bool() {
                    Some(flag) => config.redirect_stderr = flag,
                    None => errors.push(ConfigError::new(key, "'redirect_stderr' must be a boolean")),
                },
                _ => errors.push(ConfigError::new(
                    key,
                    format!("'{}' is not a recognized configuration option", key),
                )),
            }
        }

        if errors.is_empty() && config.redirect_stderr && config.target == LogTarget::Stderr {
            errors.push(ConfigError::new(
                "redirect_stderr",
                "'redirect_stderr' requires 'target' to be a file path",
            ));
        }

        if errors.is_empty() {
            config.user_values = values;
            Ok(config)
        } else {
            Err(errors)
        }
    }

    /// Compute the configuration that would result from applying `updates`.
    ///
    /// Does not touch `self`.
    pub fn preview_update(&self, updates: &Value) -> Result<Self, Vec<ConfigError>> {
        let Value::Object(updates) = updates else {
            return Err(vec![ConfigError::new("", "The configuration update must be a JSON object")]);
        };

        let mut merged = self.user_values.clone();
        for (key, value) in updates {
            if value.is_null() {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }
        Self::from_user_values(merged)
    }

    pub fn user_values(&self) -> &Map<String, Value> {
        &self.user_values
    }

    /// Describe every key: what the user set, the default, and what is in effect.
    pub fn inspect(&self) -> Value {
        let defaults = LogConfig::default();
        let mut doc = Map::new();
        for key in Self::KEYS {
            doc.insert(
                key.to_string(),
                json!({
                    "user_value": self.user_values.get(*key).cloned().unwrap_or(Value::Null),
                    "default_value": defaults.effective_value(key),
                    "effective_value": self.effective_value(key),
                }),
            );
        }
        Value::Object(doc)
    }

    fn effective_value(&self, key: &str) -> Value {
        match key {
            "level" => Value::String(self.level.as_str().to_string()),
            "target" => self.target.to_value(),
            "redirect_stderr" => Value::Bool(self.redirect_stderr),
            _ => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!("debug2".parse::<LogLevel>(), Ok(LogLevel::Debug2));
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::from_value(&json!(5)), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_value(&json!(8)), None);
        assert_eq!(LogLevel::from_value(&json!(true)), None);
    }

    #[test]
    fn test_preview_update_merges_and_resets() {
        let config = LogConfig::default()
            .preview_update(&json!({ "level": "debug" }))
            .unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.user_values().len(), 1);

        let reset = config.preview_update(&json!({ "level": null })).unwrap();
        assert_eq!(reset.level, LogLevel::Notice);
        assert!(reset.user_values().is_empty());
    }

    #[test]
    fn test_preview_update_does_not_mutate() {
        let config = LogConfig::default();
        let _ = config.preview_update(&json!({ "level": "crit" })).unwrap();
        assert_eq!(config, LogConfig::default());
    }

    #[test]
    fn test_all_errors_reported() {
        let errors = LogConfig::default()
            .preview_update(&json!({ "level": "loud", "target": "", "colour": true }))
            .unwrap_err();
        assert_eq!(errors.len(), 3);

        let message = errors_to_string(&errors);
        assert!(message.contains("'level' must be one of"));
        assert!(message.contains("'colour' is not a recognized configuration option"));
    }

    #[test]
    fn test_non_object_update_rejected() {
        let errors = LogConfig::default().preview_update(&json!([1, 2])).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_redirect_stderr_requires_file() {
        let errors = LogConfig::default()
            .preview_update(&json!({ "redirect_stderr": true }))
            .unwrap_err();
        assert_eq!(errors[0].key, "redirect_stderr");

        let config = LogConfig::default()
            .preview_update(&json!({ "redirect_stderr": true, "target": "/var/log/router.log" }))
            .unwrap();
        assert_eq!(config.target, LogTarget::File(PathBuf::from("/var/log/router.log")));
    }

    #[test]
    fn test_inspect_shape() {
        let config = LogConfig::default()
            .preview_update(&json!({ "level": 4 }))
            .unwrap();
        let doc = config.inspect();
        assert_eq!(doc["level"]["user_value"], json!(4));
        assert_eq!(doc["level"]["default_value"], json!("notice"));
        assert_eq!(doc["level"]["effective_value"], json!("info"));
        assert_eq!(doc["target"]["effective_value"], json!("stderr"));
        assert_eq!(doc["redirect_stderr"]["user_value"], Value::Null);
    }
}
