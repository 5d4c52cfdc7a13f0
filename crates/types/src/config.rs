use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A single environment binding value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    /// Integers above `i64::MAX`
    Unsigned(u64),
    Float(f64),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(s) => f.write_str(s),
            ConfigValue::Integer(i) => write!(f, "{i}"),
            ConfigValue::Unsigned(u) => write!(f, "{u}"),
            ConfigValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

/// Environment bindings produced by a provider, keyed by variable name.
pub type AddonConfig = BTreeMap<String, ConfigValue>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("provider result has no config")]
    MissingConfig,

    #[error("config must be a mapping, got {0}")]
    NotAMapping(&'static str),

    #[error("config value for {key} must be a string or number, got {kind}")]
    InvalidValue { key: String, kind: &'static str },
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate a raw config mapping. Keys must be strings and values strings,
/// integers or floats. Nothing is returned unless every entry is valid.
pub fn validate_config(raw: &Value) -> Result<AddonConfig, ValidationError> {
    let map = raw
        .as_object()
        .ok_or_else(|| ValidationError::NotAMapping(kind_of(raw)))?;

    let mut config = AddonConfig::new();
    for (key, value) in map {
        let value = match value {
            Value::String(s) => ConfigValue::String(s.clone()),
            Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
                (Some(i), _, _) => ConfigValue::Integer(i),
                (None, Some(u), _) => ConfigValue::Unsigned(u),
                (None, None, Some(f)) => ConfigValue::Float(f),
                (None, None, None) => {
                    return Err(ValidationError::InvalidValue {
                        key: key.clone(),
                        kind: "number",
                    })
                }
            },
            other => {
                return Err(ValidationError::InvalidValue {
                    key: key.clone(),
                    kind: kind_of(other),
                })
            }
        };
        config.insert(key.clone(), value);
    }
    Ok(config)
}

/// Pull the `config` entry out of a provider's `get_config` result and
/// validate it.
pub fn extract_config(result: &Value) -> Result<AddonConfig, ValidationError> {
    let raw = result.get("config").ok_or(ValidationError::MissingConfig)?;
    validate_config(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_strings_and_numbers() {
        let config = validate_config(&json!({
            "DATABASE_URL": "postgres://u:p@host/db",
            "POOL_SIZE": 10,
            "RATIO": 0.25,
            "NEGATIVE": -3,
        }))
        .unwrap();

        assert_eq!(config.len(), 4);
        assert_eq!(config["POOL_SIZE"], ConfigValue::Integer(10));
        assert_eq!(config["RATIO"], ConfigValue::Float(0.25));
        assert_eq!(config["NEGATIVE"], ConfigValue::Integer(-3));
    }

    #[test]
    fn test_large_integers_stay_exact() {
        let big = i64::MAX as u64 + 1;
        let config = validate_config(&json!({ "BIG": big, "MAX": u64::MAX })).unwrap();

        assert_eq!(config["BIG"], ConfigValue::Unsigned(big));
        assert_eq!(config["MAX"], ConfigValue::Unsigned(u64::MAX));
        assert_eq!(config["MAX"].to_string(), "18446744073709551615");

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["BIG"].as_u64(), Some(big));
        let parsed: AddonConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_accepts_empty_mapping() {
        assert!(validate_config(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_invalid_values() {
        let cases = [
            (json!({"A": "ok", "B": true}), "bool"),
            (json!({"A": null}), "null"),
            (json!({"A": ["x"]}), "array"),
            (json!({"A": {"nested": 1}}), "object"),
        ];

        for (raw, kind) in cases {
            match validate_config(&raw) {
                Err(ValidationError::InvalidValue { kind: got, .. }) => assert_eq!(got, kind),
                other => panic!("expected InvalidValue for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_rejects_non_mapping_shapes() {
        // a list of pairs is how a mapping with non-string keys arrives
        assert_eq!(
            validate_config(&json!([[1, "x"]])),
            Err(ValidationError::NotAMapping("array"))
        );
        assert_eq!(
            validate_config(&json!("DATABASE_URL")),
            Err(ValidationError::NotAMapping("string"))
        );
        assert_eq!(
            validate_config(&Value::Null),
            Err(ValidationError::NotAMapping("null"))
        );
    }

    #[test]
    fn test_extract_config() {
        let config = extract_config(&json!({"config": {"SECRET_KEY": "abc"}})).unwrap();
        assert_eq!(config["SECRET_KEY"], ConfigValue::from("abc"));

        assert_eq!(
            extract_config(&json!({"message": "no config here"})),
            Err(ValidationError::MissingConfig)
        );
    }

    #[test]
    fn test_config_value_serializes_untagged() {
        let mut config = AddonConfig::new();
        config.insert("A".to_string(), ConfigValue::from("x"));
        config.insert("B".to_string(), ConfigValue::Integer(2));
        assert_eq!(serde_json::to_value(&config).unwrap(), json!({"A": "x", "B": 2}));

        let parsed: AddonConfig = serde_json::from_value(json!({"A": "x", "B": 2, "C": 1.5})).unwrap();
        assert_eq!(parsed["B"], ConfigValue::Integer(2));
        assert_eq!(parsed["C"], ConfigValue::Float(1.5));
    }
}
