//! JSON Schema of the exported session envelope.
//!
//! schemars emits draft 2020-12. Tools that validate exported sessions often
//! only understand draft-07, so [`envelope_schema`] can rewrite the output:
//! - `$defs` becomes `definitions` and every `$ref` follows
//! - `anyOf: [X, {type: null}]` collapses to `X`

use serde_json::{Map, Value};

use terminal_persist_core::SessionEnvelope;

/// Schema dialect to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaDraft {
    /// As generated
    #[default]
    Draft2020,
    /// Rewritten for draft-07 consumers
    Draft07,
}

/// Schema of [`SessionEnvelope`] in the requested dialect.
pub fn envelope_schema(draft: SchemaDraft) -> serde_json::Result<Value> {
    let schema = serde_json::to_value(schemars::schema_for!(SessionEnvelope))?;
    Ok(match draft {
        SchemaDraft::Draft2020 => schema,
        SchemaDraft::Draft07 => to_draft07(schema),
    })
}

/// Rewrite a draft 2020-12 schema for draft-07 consumers.
pub fn to_draft07(mut schema: Value) -> Value {
    if let Some(obj) = schema.as_object_mut() {
        if let Some(defs) = obj.remove("$defs") {
            obj.insert("definitions".to_string(), defs);
        }
        if obj
            .get("$schema")
            .and_then(Value::as_str)
            .is_some_and(|s| s.contains("2020-12"))
        {
            obj.insert(
                "$schema".to_string(),
                Value::String("http://json-schema.org/draft-07/schema#".to_string()),
            );
        }
    }
    rewrite(&mut schema);
    schema
}

fn rewrite(value: &mut Value) {
    match value {
        Value::Object(obj) => {
            if let Some(Value::String(reference)) = obj.get_mut("$ref") {
                let renamed = reference
                    .strip_prefix("#/$defs/")
                    .map(|name| format!("#/definitions/{name}"));
                if let Some(renamed) = renamed {
                    *reference = renamed;
                }
            }
            collapse_nullable(obj);
            for nested in obj.values_mut() {
                rewrite(nested);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(rewrite),
        _ => {}
    }
}

fn collapse_nullable(obj: &mut Map<String, Value>) {
    let Some(Value::Array(any_of)) = obj.get("anyOf") else {
        return;
    };
    let [first, second] = any_of.as_slice() else {
        return;
    };
    let kept = match (is_bare_null(first), is_bare_null(second)) {
        (false, true) => first.clone(),
        (true, false) => second.clone(),
        _ => return,
    };
    let Value::Object(kept) = kept else {
        return;
    };
    obj.remove("anyOf");
    obj.extend(kept);
}

fn is_bare_null(schema: &Value) -> bool {
    schema
        .as_object()
        .is_some_and(|o| o.len() == 1 && o.get("type").and_then(Value::as_str) == Some("null"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defs_renamed_and_refs_follow() {
        let schema = json!({
            "$defs": {"TerminalId": {"type": "string"}},
            "properties": {
                "activeTerminalId": {"$ref": "#/$defs/TerminalId"},
                "terminals": {"type": "array", "items": {"$ref": "#/$defs/TerminalId"}}
            }
        });

        let result = to_draft07(schema);

        assert!(result["$defs"].is_null());
        assert!(result["definitions"]["TerminalId"].is_object());
        assert_eq!(
            result["properties"]["activeTerminalId"]["$ref"],
            "#/definitions/TerminalId"
        );
        assert_eq!(
            result["properties"]["terminals"]["items"]["$ref"],
            "#/definitions/TerminalId"
        );
    }

    #[test]
    fn test_nullable_ref_collapses() {
        let schema = json!({
            "properties": {
                "companion": {
                    "description": "Companion process",
                    "anyOf": [{"$ref": "#/$defs/CompanionKind"}, {"type": "null"}]
                }
            }
        });

        let result = to_draft07(schema);
        let companion = &result["properties"]["companion"];

        assert!(companion["anyOf"].is_null());
        assert_eq!(companion["$ref"], "#/definitions/CompanionKind");
        assert_eq!(companion["description"], "Companion process");
    }

    #[test]
    fn test_real_union_is_kept() {
        let schema = json!({
            "anyOf": [{"type": "string"}, {"type": "integer"}]
        });
        let result = to_draft07(schema.clone());
        assert_eq!(result, schema);
    }

    #[test]
    fn test_envelope_schema_describes_terminals() {
        let schema = envelope_schema(SchemaDraft::Draft2020).unwrap();
        assert!(schema["properties"]["terminals"].is_object());

        let draft07 = envelope_schema(SchemaDraft::Draft07).unwrap();
        assert!(draft07.get("$defs").is_none());
        assert!(!draft07.to_string().contains("#/$defs/"));
    }
}
