//! Aggregate plugin-config document helpers
//!
//! The backend stores one document `{ "plugins": { <name>: {...} }, ... }`.
//! Edits touch exactly one `plugins` entry; every other key, known or not,
//! passes through untouched.

use serde_json::{Map, Value};

use crate::error::{ConsoleError, Result};

pub type ConfigObject = Map<String, Value>;

const PLUGINS_KEY: &str = "plugins";

/// Parse operator-supplied text into a config object
pub fn parse_plugin_config(text: &str) -> Result<ConfigObject> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ConsoleError::Validation(format!("invalid JSON: {}", e)))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ConsoleError::Validation(format!(
            "plugin config must be a JSON object, got {}",
            type_name(&other)
        ))),
    }
}

/// `aggregate.plugins[name]`, or an empty object when absent
pub fn extract_plugin_config(aggregate: &Value, name: &str) -> ConfigObject {
    aggregate
        .get(PLUGINS_KEY)
        .and_then(|plugins| plugins.get(name))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Set `aggregate.plugins[name] = config`, preserving everything else
pub fn merge_plugin_config(aggregate: Value, name: &str, config: ConfigObject) -> Result<Value> {
    let mut document = match aggregate {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(ConsoleError::Server(format!(
                "aggregate config is a {}, expected an object",
                type_name(&other)
            )))
        }
    };

    let plugins = document
        .entry(PLUGINS_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    if plugins.is_null() {
        *plugins = Value::Object(Map::new());
    }
    let Some(plugins) = plugins.as_object_mut() else {
        return Err(ConsoleError::Server(
            "aggregate config has a non-object plugins section".to_string(),
        ));
    };
    plugins.insert(name.to_string(), Value::Object(config));

    Ok(Value::Object(document))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
