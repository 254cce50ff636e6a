//! Defensive parsing of the JSON objects LLM prompts ask for.
//!
//! Two failure shapes are kept apart: the text is not a JSON object at all
//! (`Error::MalformedJson`), or it is one but lacks keys the prompt promised
//! (`Error::MissingKeys`). Callers fold both into their own "no result" path.

use crate::{Error, Result};
use serde::de::DeserializeOwned;

/// Models sometimes wrap JSON in a markdown fence even in JSON mode.
fn strip_code_fence(raw: &str) -> &str {
    let s = raw.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

pub fn parse_json_contract<T: DeserializeOwned>(raw: &str, required: &[&str]) -> Result<T> {
    let body = strip_code_fence(raw);
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| Error::MalformedJson(e.to_string()))?;
    let Some(obj) = value.as_object() else {
        return Err(Error::MalformedJson("expected a JSON object".to_string()));
    };
    let missing: Vec<String> = required
        .iter()
        .filter(|k| obj.get(**k).map(|v| v.is_null()).unwrap_or(true))
        .map(|k| k.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingKeys(missing));
    }
    serde_json::from_value(value).map_err(|e| Error::MalformedJson(format!("unexpected shape: {e}")))
}

/// Render a loosely-typed JSON value as display text.
pub fn value_to_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
