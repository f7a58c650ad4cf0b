//! JSON Schema helpers for structured LLM output.
//!
//! Providers that enforce strict schemas require every object to declare
//! `additionalProperties: false` and to list all of its properties as
//! required. schemars emits neither, so generated schemas are normalized here.

use schemars::JsonSchema;

use crate::llm::{OutputConfig, OutputFormat, OutputJsonSchema};

/// Recursively set `additionalProperties: false` and mark every property
/// as required on all object schemas.
pub fn add_additional_properties_false(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            let property_names: Option<Vec<serde_json::Value>> = map
                .get("properties")
                .and_then(|p| p.as_object())
                .map(|props| {
                    props
                        .keys()
                        .map(|k| serde_json::Value::String(k.clone()))
                        .collect()
                });

            if let Some(names) = property_names {
                map.insert(
                    "additionalProperties".to_string(),
                    serde_json::Value::Bool(false),
                );
                map.insert("required".to_string(), serde_json::Value::Array(names));
            }

            for child in map.values_mut() {
                add_additional_properties_false(child);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                add_additional_properties_false(item);
            }
        }
        _ => {}
    }
}

/// Generate a strict JSON schema for `T`.
pub fn strict_schema_for<T: JsonSchema>() -> serde_json::Value {
    let mut value = schemars::schema_for!(T).to_value();
    add_additional_properties_false(&mut value);
    value
}

/// Build a structured-output configuration constraining responses to `T`.
pub fn output_config_for<T: JsonSchema>(name: &str) -> OutputConfig {
    OutputConfig {
        format: OutputFormat {
            type_field: "json_schema".to_string(),
            json_schema: OutputJsonSchema {
                name: name.to_string(),
                schema: strict_schema_for::<T>(),
                strict: Some(true),
            },
        },
    }
}
