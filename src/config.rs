//! Configuration values
//!
//! The rule file's `config:` mapping is the base layer. `--configfile` files
//! are deep-merged over it in order, then `--config key.path=value`
//! overrides are applied. Values stay untyped (`serde_json::Value`); input
//! functions such as `lookup` read them by dotted path.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, RuleGraphError};

/// Command-line configuration layers
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Files merged over the rule-file config, in order
    pub files: Vec<PathBuf>,
    /// `key.path=value` assignments applied last
    pub values: Vec<String>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.values.is_empty()
    }

    /// Apply every layer on top of `config`
    pub fn apply(&self, config: &mut Value) -> Result<()> {
        for file in &self.files {
            let overlay = load_file(file)?;
            debug!(file = %file.display(), "merging config file");
            deep_merge(config, overlay);
        }
        for raw in &self.values {
            let (key, value) = parse_override(raw)?;
            set_path(config, &key, value)?;
        }
        Ok(())
    }
}

/// Read a YAML (or JSON) config file; the top level must be a mapping
pub fn load_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&content)?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(RuleGraphError::Config {
            reason: format!("'{}' must contain a mapping at the top level", path.display()),
        }),
    }
}

/// Merge `overlay` into `base`. Mappings merge key by key; anything else
/// replaces.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Split `key.path=value`.
///
/// The value is read as YAML so numbers, booleans and `[a, b]` lists keep
/// their type; anything unparsable stays a string.
pub fn parse_override(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw.split_once('=').ok_or_else(|| RuleGraphError::Config {
        reason: format!("'{}' is not of the form key=value", raw),
    })?;

    let key = key.trim();
    if key.is_empty() || key.split('.').any(str::is_empty) {
        return Err(RuleGraphError::Config {
            reason: format!("invalid config key '{}'", key),
        });
    }

    let value = if value.is_empty() {
        Value::String(String::new())
    } else {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    };

    Ok((key.to_string(), value))
}

/// Set a dotted path, creating intermediate mappings
pub fn set_path(config: &mut Value, dotted: &str, value: Value) -> Result<()> {
    let mut current = config;
    let mut parts = dotted.split('.').peekable();

    while let Some(part) = parts.next() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return Err(RuleGraphError::Config {
                reason: format!("cannot set '{}': '{}' is not a mapping", dotted, part),
            });
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return Ok(());
        }
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    Ok(())
}

/// Look up a dotted path; an empty path is the whole config
pub fn get_path<'a>(config: &'a Value, dotted: &str) -> Option<&'a Value> {
    if dotted.is_empty() {
        return Some(config);
    }
    dotted
        .split('.')
        .try_fold(config, |value, part| match value {
            Value::Object(map) => map.get(part),
            Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}
