//! Redaction of credential-bearing fields before audit persistence.

use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

/// Keys compared after lowercasing and stripping `_` and `-`.
const DENY_LIST: [&str; 10] = [
    "password",
    "passwordhash",
    "token",
    "accesstoken",
    "refreshtoken",
    "secret",
    "apikey",
    "creditcard",
    "ssn",
    "twofasecret",
];

const DENY_SUFFIXES: [&str; 3] = ["password", "token", "secret"];

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn is_sensitive_key(key: &str) -> bool {
    let key = normalize_key(key);
    DENY_LIST.contains(&key.as_str()) || DENY_SUFFIXES.iter().any(|s| key.ends_with(s))
}

/// Redact in place at any depth, including inside arrays. Keys are kept.
pub fn sanitize_in_place(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *field = Value::String(REDACTED.to_string());
                } else {
                    sanitize_in_place(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize_in_place),
        _ => {}
    }
}

pub fn sanitize(value: &Value) -> Value {
    let mut copy = value.clone();
    sanitize_in_place(&mut copy);
    copy
}
