//! `{key}` placeholder substitution.

use std::collections::HashMap;

use tracing::warn;

/// Values available to a response template.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    vars: HashMap<String, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Merge a JSON object of custom variables. Built-in keys already set win.
    /// Malformed input is logged and ignored.
    pub fn merge_json(mut self, json: &str, rule_id: &str) -> Self {
        if json.trim().is_empty() {
            return self;
        }
        match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(json) {
            Ok(map) => {
                for (key, value) in map {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    self.vars.entry(key).or_insert(value);
                }
            }
            Err(e) => {
                warn!(rule_id, error = %e, "Ignoring malformed custom template variables");
            }
        }
        self
    }

    /// Replace each `{key}` with its value. Unknown placeholders stay as-is.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find(['{', '}']) {
                Some(close) if after.as_bytes()[close] == b'}' => {
                    let key = &after[..close];
                    match self.vars.get(key) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}
