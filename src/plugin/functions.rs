//! Function-calling schemas for active plugins
//!
//! Each operation becomes one function named
//! `{plugin}__opid__{operation}` with a flat JSON-schema object holding
//! both its declared parameters and its request-body properties.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

use super::PluginEntry;
use super::index::OperationDescriptor;

/// Separator between plugin name and operation id in function names
pub const FUNCTION_NAME_SEPARATOR: &str = "__opid__";

/// One entry of the function list handed to a function-calling LLM API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// `{plugin}__opid__{operation}`
    pub name: String,
    /// What the function does
    pub description: String,
    /// JSON schema of the arguments, absent for parameterless operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Function name for an operation
#[must_use]
pub fn function_name(plugin: &str, operation_id: &str) -> String {
    format!("{plugin}{FUNCTION_NAME_SEPARATOR}{operation_id}")
}

/// Split a function name back into `(plugin, operation_id)`
#[must_use]
pub fn split_function_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(FUNCTION_NAME_SEPARATOR)
        .filter(|(plugin, op)| !plugin.is_empty() && !op.is_empty())
}

/// Flattened argument schema for one operation
#[must_use]
pub fn parameter_schema(operation: &OperationDescriptor) -> Option<Value> {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &operation.parameters {
        let mut prop = Map::new();
        if let Some(t) = &param.param_type {
            prop.insert("type".to_string(), Value::String(t.clone()));
        }
        if let Some(d) = &param.description {
            prop.insert("description".to_string(), Value::String(d.clone()));
        }
        properties.insert(param.name.clone(), Value::Object(prop));
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    if let Some(body) = &operation.request_body {
        for (name, schema) in body.properties() {
            if properties.contains_key(name) {
                warn!(
                    operation = %operation.operation_id,
                    property = %name,
                    "Body property shadows a declared parameter, keeping the parameter"
                );
                continue;
            }
            properties.insert(name.clone(), schema.clone());
            if body.required && !required.iter().any(|r| r == name.as_str()) {
                required.push(Value::String(name.clone()));
            }
        }
    }

    if properties.is_empty() {
        return None;
    }

    Some(json!({
        "type": "object",
        "properties": properties,
        "required": required,
    }))
}

/// Function list for the given plugins, in plugin then index order
#[must_use]
pub fn build_functions<'a>(plugins: impl IntoIterator<Item = &'a PluginEntry>) -> Vec<FunctionSpec> {
    let mut functions = Vec::new();
    for plugin in plugins {
        for operation in plugin.operations().iter() {
            functions.push(FunctionSpec {
                name: function_name(plugin.name(), &operation.operation_id),
                description: operation
                    .description
                    .clone()
                    .unwrap_or_else(|| plugin.description_for_model().to_string()),
                parameters: parameter_schema(operation),
            });
        }
    }
    functions
}
