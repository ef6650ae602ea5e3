//! Pseudo-interface rendering of a plugin for the LLM prompt
//!
//! ```text
//! // Manage a TODO list.
//! namespace todo {
//!
//! // Add a todo to the list
//! operationId addTodo = (_: {'username'*: 'str', 'todo'*: 'str'}) => any}
//! ```
//!
//! Everything here is a pure function of its inputs: the same index always
//! renders to the same bytes.

use std::fmt::Write;

use serde_json::Value;

use super::index::{OperationDescriptor, OperationIndex};
use super::PluginEntry;
use crate::manifest::Manifest;

/// Placeholder in the prompt template replaced by the plugin descriptions
pub const PLUGINS_PLACEHOLDER: &str = "{{plugins}}";

/// Short type name shown to the model
#[must_use]
pub fn short_type(openapi_type: Option<&str>) -> &'static str {
    match openapi_type {
        Some("string") => "str",
        Some("integer") => "int",
        Some("boolean") => "bool",
        Some("number") => "num",
        Some("array") => "arr",
        Some("object") => "obj",
        _ => "any",
    }
}

fn render_parameter(out: &mut Vec<String>, name: &str, required: bool, openapi_type: Option<&str>) {
    let star = if required { "*" } else { "" };
    out.push(format!("'{name}'{star}: '{}'", short_type(openapi_type)));
}

/// Render one operation's parameter list (without the braces)
#[must_use]
pub fn render_parameters(operation: &OperationDescriptor) -> String {
    let mut rendered = Vec::new();

    for param in &operation.parameters {
        render_parameter(
            &mut rendered,
            &param.name,
            param.required,
            param.param_type.as_deref(),
        );
    }

    if let Some(body) = &operation.request_body {
        for (name, schema) in body.properties() {
            render_parameter(
                &mut rendered,
                name,
                body.required,
                schema.get("type").and_then(Value::as_str),
            );
        }
    }

    rendered.join(", ")
}

/// Render a plugin's namespace block
#[must_use]
pub fn describe_api(manifest: &Manifest, index: &OperationIndex) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "// {}\nnamespace {} {{",
        manifest.description_for_model, manifest.name_for_model
    );

    for operation in index.iter() {
        let _ = write!(
            out,
            "\n\n// {}\noperationId {} = (_: {{{}}}) => any",
            operation.description.as_deref().unwrap_or_default(),
            operation.operation_id,
            render_parameters(operation)
        );
    }

    out.push('}');
    out
}

/// Numbered `### Plugin {i}` blocks for the given plugins, in order
#[must_use]
pub fn render_plugins<'a>(plugins: impl IntoIterator<Item = &'a PluginEntry>) -> String {
    let mut out = String::new();
    for (i, plugin) in plugins.into_iter().enumerate() {
        let _ = write!(out, "### Plugin {}\n{}\n\n", i + 1, plugin.description());
    }
    out
}

/// Substitute the plugin blocks into `template`
#[must_use]
pub fn fill_template<'a>(
    template: &str,
    plugins: impl IntoIterator<Item = &'a PluginEntry>,
) -> String {
    template.replace(PLUGINS_PLACEHOLDER, &render_plugins(plugins))
}
