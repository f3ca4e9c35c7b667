//! Validation of tool input against the declared JSON schema.
//!
//! Each tool's `input_schema` is compiled once with `jsonschema` and reused
//! for every call.

use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

use crate::tool_definitions::definition_for;
use crate::tools::ToolName;

static COMPILED: OnceLock<HashMap<ToolName, JSONSchema>> = OnceLock::new();

fn compiled_schemas() -> &'static HashMap<ToolName, JSONSchema> {
    COMPILED.get_or_init(|| {
        let mut schemas = HashMap::new();
        for tool in ToolName::ALL {
            let definition = definition_for(tool);
            match JSONSchema::compile(&definition.input_schema) {
                Ok(schema) => {
                    schemas.insert(tool, schema);
                }
                Err(e) => warn!("Schema for {} does not compile: {}", tool.as_str(), e),
            }
        }
        schemas
    })
}

/// Optional parameters sent as `null` count as absent.
fn without_nulls(input: &Value) -> Value {
    match input {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Check `input` against the tool's schema, joining every violation into one message.
pub fn validate(tool: ToolName, input: &Value) -> Result<(), String> {
    let Some(schema) = compiled_schemas().get(&tool) else {
        return Ok(());
    };
    let instance = without_nulls(input);
    let result = schema.validate(&instance);
    if let Err(errors) = result {
        let messages: Vec<String> = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                match path.trim_start_matches('/') {
                    "" => e.to_string(),
                    field => format!("{}: {}", field, e),
                }
            })
            .collect();
        return Err(messages.join("; "));
    }
    Ok(())
}
