//! Defaults-guided reconciliation of stored values
//!
//! Every read reconciles the stored JSON against the caller's current
//! defaults: known paths keep the default's shape, unknown keys pass through
//! untouched, and the normalized document is written back when it differs
//! from what was stored. No schema version is ever embedded in the data.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Custom migration applied to a parsed value before merging
///
/// Returning `Err` aborts the read; the stored value is left untouched.
pub type Migration = Arc<dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync>;

/// Outcome of normalizing a raw stored value
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// The raw value is not JSON; handed back unmodified
    Opaque(String),
    /// Merged value, plus the serialized form to store if it changed
    Value {
        value: Value,
        rewrite: Option<String>,
    },
}

/// Merge `incoming` onto `defaults`
///
/// - `null` always wins over the default.
/// - Arrays are replaced wholesale, never merged element-wise; a non-array
///   value at an array path keeps the default.
/// - Objects start from the default object; incoming keys recurse when the
///   default knows them and are copied through otherwise. A non-object value
///   at an object path keeps the default.
/// - Anything else takes the incoming value.
#[must_use]
pub fn merge(defaults: &Value, incoming: &Value) -> Value {
    if incoming.is_null() {
        return Value::Null;
    }

    match defaults {
        Value::Array(_) => {
            if incoming.is_array() {
                incoming.clone()
            } else {
                defaults.clone()
            }
        }
        Value::Object(default_map) => {
            let Value::Object(incoming_map) = incoming else {
                return defaults.clone();
            };

            let mut result: Map<String, Value> = default_map.clone();
            for (key, value) in incoming_map {
                let merged = match default_map.get(key) {
                    Some(default) => merge(default, value),
                    None => value.clone(),
                };
                result.insert(key.clone(), merged);
            }
            Value::Object(result)
        }
        _ => incoming.clone(),
    }
}

/// Parse, migrate and merge a raw stored value
///
/// `key` is only used for error reporting.
///
/// # Errors
///
/// Returns `Error::Migration` if the custom migration rejects the value and
/// `Error::Serialize` if the merged value cannot be serialized.
pub fn normalize(
    key: &str,
    raw: &str,
    defaults: &Value,
    migrate: Option<&Migration>,
) -> Result<Normalized> {
    let Ok(parsed) = serde_json::from_str::<Value>(raw) else {
        log::debug!("Value for '{key}' is not JSON, passing it through");
        return Ok(Normalized::Opaque(raw.to_string()));
    };

    let parsed = match migrate {
        Some(migrate) => migrate(parsed).map_err(|reason| Error::Migration {
            key: key.to_string(),
            reason,
        })?,
        None => parsed,
    };

    let value = merge(defaults, &parsed);
    let serialized = serde_json::to_string(&value)?;
    let rewrite = (serialized != raw).then_some(serialized);

    Ok(Normalized::Value { value, rewrite })
}
