//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use lanchat_core::Profile;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::ChatSettings;

/// Resolve the default settings file (`~/.lanchat/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".lanchat").join("settings.json")
}

/// Load settings from `path` with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ChatSettings> {
    load_with_env(path, |key| std::env::var(key).ok())
}

fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<ChatSettings> {
    let defaults = serde_json::to_value(ChatSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ChatSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `LANCHAT_*` overrides read through `env`. Invalid values are logged
/// and ignored.
fn apply_overrides(settings: &mut ChatSettings, env: impl Fn(&str) -> Option<String>) {
    let read = |key: &str| env(key).filter(|v| !v.is_empty());

    if let Some(v) = read("LANCHAT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("LANCHAT_PORT") {
        match parse_range::<u16>(&v, 1, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "LANCHAT_PORT", value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = read("LANCHAT_SEND_QUEUE") {
        match parse_range::<usize>(&v, 1, 65_536) {
            Some(n) => settings.server.send_queue_capacity = n,
            None => warn!(key = "LANCHAT_SEND_QUEUE", value = %v, "invalid queue size env var, ignoring"),
        }
    }
    if let Some(v) = read("LANCHAT_PROFILE") {
        match v.parse::<Profile>() {
            Ok(profile) => settings.server.profile = profile,
            Err(e) => warn!(key = "LANCHAT_PROFILE", error = %e, "invalid profile env var, ignoring"),
        }
    }
    if let Some(v) = read("LANCHAT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("LANCHAT_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => warn!(key = "LANCHAT_LOG_JSON", value = %v, "invalid boolean env var, ignoring"),
        }
    }
}

/// Parse a boolean: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_range<T: std::str::FromStr + PartialOrd>(val: &str, min: T, max: T) -> Option<T> {
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
