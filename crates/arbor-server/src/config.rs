//! Server configuration: defaults, an optional JSON file, then environment.
//!
//! Loading flow:
//! 1. Start with [`ServerConfig::default()`]
//! 2. If a JSON file is given and exists, [`overlay`] it on the defaults
//! 3. Apply `ARBOR_*` environment variable overrides (highest priority)

use std::ops::RangeInclusive;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file from disk.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the config file.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is out of range or malformed.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Configuration for an Arbor RPC server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Path of the RPC endpoint; `<base_path>/{signature}` is served too.
    pub base_path: String,
    /// Queued events per push channel before `emit` starts failing.
    pub channel_capacity: usize,
    /// Upper bound on a single handler invocation.
    pub handler_timeout_secs: u64,
    /// Interval between SSE keep-alive comments.
    pub keep_alive_secs: u64,
    /// Include `callstack` in error responses.
    pub expose_callstack: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            base_path: "/rpc".into(),
            channel_capacity: 256,
            handler_timeout_secs: 60,
            keep_alive_secs: 15,
            expose_callstack: true,
        }
    }
}

impl ServerConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_base_path(&self.base_path) {
            return Err(ConfigError::InvalidValue(format!(
                "base_path '{}' must start with '/', have no empty segments, and contain no ':' or '{{'",
                self.base_path
            )));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "channel_capacity must be at least 1".into(),
            ));
        }
        if self.handler_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "handler_timeout_secs must be at least 1".into(),
            ));
        }
        if self.keep_alive_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "keep_alive_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn is_valid_base_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    !rest.is_empty()
        && rest
            .split('/')
            .all(|seg| !seg.is_empty() && !seg.contains([':', '{', '}']))
}

/// Load configuration: defaults, overlaid by the JSON file at `path` if it
/// exists, then `ARBOR_*` variables. The result is validated.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let mut layered = serde_json::to_value(ServerConfig::default())?;

    match path {
        Some(path) if path.exists() => {
            debug!(?path, "overlaying config file");
            let file: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            layered = overlay(layered, file);
        }
        Some(path) => debug!(?path, "no config file, keeping defaults"),
        None => {}
    }

    let mut config: ServerConfig = serde_json::from_value(layered)?;
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Lay `patch` over `base`.
///
/// Nested objects combine key by key. Any other `patch` value wins outright,
/// except `null`, which keeps what `base` had.
pub fn overlay(base: Value, patch: Value) -> Value {
    let (mut base, patch) = match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => (base, patch),
        (_, patch) => return patch,
    };

    for (key, value) in patch.into_iter().filter(|(_, v)| !v.is_null()) {
        match base.get_mut(&key) {
            Some(slot) => *slot = overlay(slot.take(), value),
            None => {
                let _ = base.insert(key, value);
            }
        }
    }
    Value::Object(base)
}

/// Apply `ARBOR_*` environment overrides. Invalid values are logged and ignored.
pub fn apply_env_overrides(config: &mut ServerConfig) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

fn apply_overrides_from(config: &mut ServerConfig, lookup: impl Fn(&str) -> Option<String>) {
    override_from(&lookup, "ARBOR_HOST", |v| {
        config.host = v.to_owned();
        true
    });
    override_from(&lookup, "ARBOR_PORT", |v| {
        assign(&mut config.port, parse_bounded(v, 0..=u16::MAX))
    });
    override_from(&lookup, "ARBOR_BASE_PATH", |v| {
        let ok = is_valid_base_path(v);
        assign(&mut config.base_path, ok.then(|| v.to_owned()))
    });
    override_from(&lookup, "ARBOR_CHANNEL_CAPACITY", |v| {
        assign(&mut config.channel_capacity, parse_bounded(v, 1..=1_000_000))
    });
    override_from(&lookup, "ARBOR_HANDLER_TIMEOUT_SECS", |v| {
        assign(&mut config.handler_timeout_secs, parse_bounded(v, 1..=86_400))
    });
    override_from(&lookup, "ARBOR_KEEP_ALIVE_SECS", |v| {
        assign(&mut config.keep_alive_secs, parse_bounded(v, 1..=3_600))
    });
    override_from(&lookup, "ARBOR_EXPOSE_CALLSTACK", |v| {
        assign(&mut config.expose_callstack, parse_switch(v))
    });
}

/// Run `apply` on the non-empty value of `key`; warn if it refuses it.
fn override_from(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    apply: impl FnOnce(&str) -> bool,
) {
    let Some(raw) = lookup(key).filter(|v| !v.is_empty()) else {
        return;
    };
    if !apply(&raw) {
        warn!(key, value = %raw, "ignoring invalid env override");
    }
}

fn assign<T>(slot: &mut T, value: Option<T>) -> bool {
    value.map(|v| *slot = v).is_some()
}

// ── Value parsers ───────────────────────────────────────────────────

const SWITCH_ON: [&str; 4] = ["true", "1", "yes", "on"];
const SWITCH_OFF: [&str; 4] = ["false", "0", "no", "off"];

/// Read an on/off switch such as `yes`, `OFF` or `1`.
pub fn parse_switch(raw: &str) -> Option<bool> {
    let is = |words: &[&str]| words.iter().any(|w| w.eq_ignore_ascii_case(raw));
    if is(&SWITCH_ON) {
        Some(true)
    } else if is(&SWITCH_OFF) {
        Some(false)
    } else {
        None
    }
}

/// Parse a number and keep it only if it falls inside `bounds`.
pub fn parse_bounded<T>(raw: &str, bounds: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    raw.trim().parse().ok().filter(|n| bounds.contains(n))
}
