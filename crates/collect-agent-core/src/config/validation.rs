//! Config validation - warns about unknown fields

use serde_json::Value;
use tracing::warn;

const TOP_LEVEL_KEYS: &[&str] = &["rstats", "storageDir", "agentNameFiles"];
const RSTATS_KEYS: &[&str] = &[
    "host",
    "port",
    "sendTimeoutMs",
    "receiveTimeoutMs",
    "receiveBuffer",
];

/// Validate JSON config and warn about unknown fields.
pub fn warn_unknown_fields(content: &str, config_name: &str) {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return;
    };

    for path in find_unknown_keys(&value) {
        warn!("Unknown config field in {config_name}: {path}");
    }
}

/// Returns paths like "rstats.timeout" for unknown fields.
fn find_unknown_keys(value: &Value) -> Vec<String> {
    let mut unknowns = Vec::new();

    let Value::Object(obj) = value else {
        return unknowns;
    };

    for (key, child) in obj {
        if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
            unknowns.push(key.clone());
            continue;
        }

        if key == "rstats"
            && let Value::Object(rstats) = child
        {
            unknowns.extend(
                rstats
                    .keys()
                    .filter(|k| !RSTATS_KEYS.contains(&k.as_str()))
                    .map(|k| format!("rstats.{k}")),
            );
        }
    }

    unknowns
}
