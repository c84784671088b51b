//! Strict mode: object schemas without an explicit `additionalProperties`
//! are closed, recursively through every subschema position.

use serde_json::{Map, Value};

/// Keywords whose value is a map of name to subschema.
const SCHEMA_MAPS: &[&str] = &[
    "properties",
    "patternProperties",
    "dependentSchemas",
    "$defs",
    "definitions",
];

/// Keywords whose value is a subschema or an array of subschemas.
const SCHEMA_SLOTS: &[&str] = &[
    "additionalProperties",
    "unevaluatedProperties",
    "propertyNames",
    "items",
    "prefixItems",
    "additionalItems",
    "unevaluatedItems",
    "contains",
    "not",
    "if",
    "then",
    "else",
    "allOf",
    "anyOf",
    "oneOf",
];

/// Keywords that only make sense on an object schema.
const OBJECT_KEYWORDS: &[&str] = &[
    "properties",
    "patternProperties",
    "additionalProperties",
    "unevaluatedProperties",
    "required",
    "dependentRequired",
    "dependentSchemas",
    "propertyNames",
];

pub(crate) fn close_objects(schema: &mut Value) {
    match schema {
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        Value::Object(map) => {
            if describes_object(map) {
                map.entry("additionalProperties")
                    .or_insert(Value::Bool(false));
            }
            for (keyword, value) in map.iter_mut() {
                if SCHEMA_MAPS.contains(&keyword.as_str()) {
                    if let Value::Object(children) = value {
                        children.values_mut().for_each(close_objects);
                    }
                } else if SCHEMA_SLOTS.contains(&keyword.as_str()) {
                    close_objects(value);
                }
            }
        }
        _ => {}
    }
}

fn describes_object(map: &Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "object"),
        _ => OBJECT_KEYWORDS.iter().any(|keyword| map.contains_key(*keyword)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn closes_typed_and_implied_objects() {
        let mut schema = json!({
            "type": "object",
            "properties": {
                "position": {"properties": {"x": {"type": "number"}}},
                "label": {"type": "string"}
            }
        });
        close_objects(&mut schema);

        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["properties"]["position"]["additionalProperties"], json!(false));
        assert!(schema["properties"]["label"].get("additionalProperties").is_none());
    }

    #[test]
    fn explicit_additional_properties_is_kept() {
        let mut schema = json!({"type": "object", "additionalProperties": {"type": "string"}});
        close_objects(&mut schema);
        assert_eq!(schema["additionalProperties"], json!({"type": "string"}));
    }

    #[test]
    fn walks_combinators_and_type_lists() {
        let mut schema = json!({
            "anyOf": [
                {"type": ["object", "null"], "required": ["id"]},
                {"type": "integer"}
            ]
        });
        close_objects(&mut schema);
        assert_eq!(schema["anyOf"][0]["additionalProperties"], json!(false));
        assert!(schema["anyOf"][1].get("additionalProperties").is_none());
    }
}
