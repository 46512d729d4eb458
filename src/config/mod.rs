//! Server configuration
//!
//! Loading, validation, and discovery of the JSON configuration file that
//! describes how to launch the server under test.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default startup deadline when the config does not specify one.
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 5000;

/// Config file names probed in the working directory, in order.
const DEFAULT_CONFIG_NAMES: &[&str] = &["aegis.config.json", "conductor.config.json"];

/// How to launch and talk to the server under test. Immutable after load.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Working directory for the child; defaults to the tester's cwd.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Merged on top of the tester's own environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(rename = "startupTimeout", default = "default_startup_timeout")]
    pub startup_timeout_ms: u64,
    /// Literal-or-regex tested against accumulated stderr to detect readiness.
    #[serde(rename = "readyPattern", default)]
    pub ready_pattern: Option<String>,
}

fn default_startup_timeout() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_MS
}

impl ServerConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid JSON in '{}': {}", path.display(), e)))?;
        Self::from_value(value)
    }

    /// Validate a raw JSON value field by field so every report names the
    /// offending key.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::Config("Configuration must be a JSON object".to_string()))?;

        for key in ["name", "command", "args"] {
            if !obj.contains_key(key) {
                return Err(Error::Config(format!("Missing required field: {}", key)));
            }
        }

        if !obj["name"].is_string() {
            return Err(Error::Config("Field 'name' must be a string".to_string()));
        }
        if !obj["command"].is_string() {
            return Err(Error::Config("Field 'command' must be a string".to_string()));
        }
        match obj["args"].as_array() {
            Some(items) if items.iter().all(|a| a.is_string()) => {}
            _ => {
                return Err(Error::Config(
                    "Field 'args' must be an array of strings".to_string(),
                ))
            }
        }
        if let Some(cwd) = obj.get("cwd") {
            if !cwd.is_string() && !cwd.is_null() {
                return Err(Error::Config("Field 'cwd' must be a string".to_string()));
            }
        }
        if let Some(env) = obj.get("env") {
            if !env.is_object() {
                return Err(Error::Config("Field 'env' must be an object".to_string()));
            }
        }
        if let Some(timeout) = obj.get("startupTimeout") {
            if !timeout.is_u64() {
                return Err(Error::Config(
                    "Field 'startupTimeout' must be a non-negative number".to_string(),
                ));
            }
        }
        if let Some(pattern) = obj.get("readyPattern") {
            if !pattern.is_string() && !pattern.is_null() {
                return Err(Error::Config(
                    "Field 'readyPattern' must be a string".to_string(),
                ));
            }
        }

        let config: ServerConfig = serde_json::from_value(value)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("Field 'name' cannot be empty".to_string()));
        }
        if self.command.is_empty() {
            return Err(Error::Config("Field 'command' cannot be empty".to_string()));
        }
        if let Some(pattern) = &self.ready_pattern {
            // Literal substrings are valid regexes; reject only genuinely
            // malformed patterns up front.
            regex::Regex::new(pattern).map_err(|e| {
                Error::Config(format!("Field 'readyPattern' is not a valid regex: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolve an explicit `--config` path or probe the default file names.
    pub fn discover_and_load(explicit: Option<&Path>) -> Result<(Self, PathBuf)> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, path.to_path_buf()));
        }
        for name in DEFAULT_CONFIG_NAMES {
            let candidate = PathBuf::from(name);
            if candidate.exists() {
                return Ok((Self::from_file(&candidate)?, candidate));
            }
        }
        Err(Error::Config(format!(
            "No configuration file found (looked for {})",
            DEFAULT_CONFIG_NAMES.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = ServerConfig::from_value(json!({
            "name": "fs-server",
            "command": "node",
            "args": ["server.js"]
        }))
        .unwrap();
        assert_eq!(config.startup_timeout_ms, DEFAULT_STARTUP_TIMEOUT_MS);
        assert!(config.ready_pattern.is_none());
        assert!(config.env.is_empty());
    }

    #[test]
    fn missing_required_field_is_named() {
        let err = ServerConfig::from_value(json!({"name": "x", "command": "node"})).unwrap_err();
        assert!(err.to_string().contains("args"), "got: {}", err);
    }

    #[test]
    fn wrong_type_is_named() {
        let err = ServerConfig::from_value(json!({
            "name": "x",
            "command": "node",
            "args": "server.js"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("args"), "got: {}", err);

        let err = ServerConfig::from_value(json!({
            "name": "x",
            "command": "node",
            "args": [],
            "startupTimeout": "soon"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("startupTimeout"), "got: {}", err);
    }

    #[test]
    fn invalid_ready_pattern_rejected() {
        let err = ServerConfig::from_value(json!({
            "name": "x",
            "command": "node",
            "args": [],
            "readyPattern": "[unclosed"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("readyPattern"), "got: {}", err);
    }

    #[test]
    fn literal_ready_pattern_accepted() {
        let config = ServerConfig::from_value(json!({
            "name": "x",
            "command": "node",
            "args": [],
            "readyPattern": "Server listening on stdio"
        }))
        .unwrap();
        assert_eq!(
            config.ready_pattern.as_deref(),
            Some("Server listening on stdio")
        );
    }
}
