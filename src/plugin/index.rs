//! `OpenAPI` document to operation index
//!
//! Flattens `paths.{path}.{method}` into one self-contained
//! [`OperationDescriptor`] per `operationId`. Operations without an
//! `operationId` are not callable and never enter the index.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Resolved `OpenAPI` document (only the parts the index reads)
#[derive(Debug, Clone, Deserialize)]
pub struct OpenApiDocument {
    /// `OpenAPI` version string
    #[serde(default)]
    pub openapi: Option<String>,
    /// Swagger 2 version string
    #[serde(default)]
    pub swagger: Option<String>,
    /// API info block
    #[serde(default)]
    pub info: Option<OpenApiInfo>,
    /// Declared servers
    #[serde(default)]
    pub servers: Vec<OpenApiServer>,
    /// Path items in document order
    pub paths: Map<String, Value>,
}

/// `info` block
#[derive(Debug, Clone, Deserialize)]
pub struct OpenApiInfo {
    /// API title
    #[serde(default)]
    pub title: String,
    /// API description
    #[serde(default)]
    pub description: Option<String>,
    /// API version
    #[serde(default)]
    pub version: String,
}

/// `servers[]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct OpenApiServer {
    /// Server URL, absolute or relative to the plugin host
    pub url: String,
}

impl OpenApiDocument {
    /// Build a document from a resolved JSON value
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` when the value has no `paths` object or its
    /// top-level fields have the wrong shape.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::Parse(format!("Invalid OpenAPI document: {e}")))
    }

    /// Version string, whichever of `openapi`/`swagger` is present
    #[must_use]
    pub fn version(&self) -> &str {
        self.openapi
            .as_deref()
            .or(self.swagger.as_deref())
            .unwrap_or("unknown")
    }

    /// URL operations are resolved against
    ///
    /// The first server wins. A relative server URL is joined onto
    /// `base_url`; with no servers `base_url` itself is used.
    #[must_use]
    pub fn server_url(&self, base_url: &str) -> String {
        match self.servers.first() {
            Some(server) if server.url.starts_with('/') => join_url(base_url, &server.url),
            Some(server) => server.url.clone(),
            None => base_url.to_string(),
        }
    }
}

/// Join a base URL and a path with exactly one `/` between them
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// HTTP verbs that may carry an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    /// GET
    Get,
    /// PUT
    Put,
    /// POST
    Post,
    /// DELETE
    Delete,
    /// PATCH
    Patch,
    /// HEAD
    Head,
    /// OPTIONS
    Options,
}

impl HttpMethod {
    /// Parse a path-item key; anything that is not a verb yields `None`
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "put" => Some(Self::Put),
            "post" => Some(Self::Post),
            "delete" => Some(Self::Delete),
            "patch" => Some(Self::Patch),
            "head" => Some(Self::Head),
            "options" => Some(Self::Options),
            _ => None,
        }
    }

    /// Upper-case method name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parameter travels in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// `{name}` placeholder in the URL
    Path,
    /// Query string
    Query,
    /// Request header
    Header,
    /// Cookie
    Cookie,
}

impl ParameterLocation {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }
}

/// A declared (non-body) parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    /// Parameter name
    pub name: String,
    /// Transport location
    pub location: ParameterLocation,
    /// Description
    pub description: Option<String>,
    /// Whether the caller must supply it
    pub required: bool,
    /// `schema.type`, when declared
    #[serde(rename = "type")]
    pub param_type: Option<String>,
}

/// A declared request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestBodySpec {
    /// Description
    pub description: Option<String>,
    /// Applies to every body property
    pub required: bool,
    /// Media type to schema, in document order
    pub content: Map<String, Value>,
}

impl RequestBodySpec {
    /// Schema used for rendering and invocation: `application/json` if
    /// declared, otherwise the first media type
    #[must_use]
    pub fn schema(&self) -> Option<&Value> {
        self.content
            .get("application/json")
            .or_else(|| self.content.values().next())
            .filter(|schema| !schema.is_null())
    }

    /// Top-level properties of [`Self::schema`], in declaration order
    pub fn properties(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.schema()
            .and_then(|s| s.get("properties"))
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|props| props.iter())
    }
}

/// One callable operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationDescriptor {
    /// `operationId`
    pub operation_id: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL template with `{name}` path placeholders
    pub url: String,
    /// Operation description (falls back to `summary`)
    pub description: Option<String>,
    /// Declared parameters in declaration order
    pub parameters: Vec<ParameterSpec>,
    /// Declared request body
    pub request_body: Option<RequestBodySpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperation {
    #[serde(default)]
    operation_id: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Vec<RawParameter>,
    #[serde(default)]
    request_body: Option<RawRequestBody>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawParameter {
    name: String,
    #[serde(rename = "in")]
    location: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawRequestBody {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    content: Map<String, Value>,
}

/// Ordered table of a plugin's operations keyed by `operationId`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationIndex {
    operations: Vec<OperationDescriptor>,
    positions: HashMap<String, usize>,
}

impl OperationIndex {
    /// Index every operation of `document`
    ///
    /// `base_url` is used when the document declares no servers, and to
    /// anchor relative server URLs. Performs no I/O.
    #[must_use]
    pub fn build(document: &OpenApiDocument, base_url: &str) -> Self {
        let server_url = document.server_url(base_url);
        let mut index = Self::default();

        for (path, item) in &document.paths {
            let Some(item) = item.as_object() else {
                warn!(path = %path, "Skipping path item that is not an object");
                continue;
            };

            let shared = item
                .get("parameters")
                .map(|v| parse_parameters(path, v))
                .unwrap_or_default();

            for (key, operation) in item {
                let Some(method) = HttpMethod::from_key(key) else {
                    continue;
                };

                let raw: RawOperation = match serde_json::from_value(operation.clone()) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(path = %path, method = %method, error = %e, "Skipping operation");
                        continue;
                    }
                };

                let Some(operation_id) = raw.operation_id.clone().filter(|id| !id.is_empty())
                else {
                    debug!(path = %path, method = %method, "Operation has no operationId, skipping");
                    continue;
                };

                let descriptor = OperationDescriptor {
                    url: join_url(&server_url, path),
                    method,
                    description: raw
                        .description
                        .clone()
                        .or_else(|| raw.summary.clone())
                        .filter(|d| !d.trim().is_empty()),
                    parameters: merge_parameters(&shared, &raw.parameters),
                    request_body: raw.request_body.map(|body| RequestBodySpec {
                        description: body.description,
                        required: body.required,
                        content: body
                            .content
                            .into_iter()
                            .map(|(media, obj)| {
                                let schema = obj.get("schema").cloned().unwrap_or(Value::Null);
                                (media, schema)
                            })
                            .collect(),
                    }),
                    operation_id,
                };
                index.insert(descriptor);
            }
        }

        debug!(operations = index.len(), server = %server_url, "Built operation index");
        index
    }

    fn insert(&mut self, descriptor: OperationDescriptor) {
        if let Some(&pos) = self.positions.get(&descriptor.operation_id) {
            warn!(operation = %descriptor.operation_id, "Duplicate operationId, replacing earlier operation");
            self.operations[pos] = descriptor;
        } else {
            self.positions
                .insert(descriptor.operation_id.clone(), self.operations.len());
            self.operations.push(descriptor);
        }
    }

    /// Look up an operation
    #[must_use]
    pub fn get(&self, operation_id: &str) -> Option<&OperationDescriptor> {
        self.positions
            .get(operation_id)
            .map(|&pos| &self.operations[pos])
    }

    /// Operations in index order
    pub fn iter(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.iter()
    }

    /// Operation ids in index order
    pub fn operation_ids(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(|op| op.operation_id.as_str())
    }

    /// Number of operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether no operation was indexed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

fn parse_parameters(path: &str, value: &Value) -> Vec<RawParameter> {
    serde_json::from_value(value.clone()).unwrap_or_else(|e| {
        warn!(path = %path, error = %e, "Ignoring malformed path-level parameters");
        Vec::new()
    })
}

/// Path-level parameters first, overridden by operation-level ones
/// sharing the same `(name, in)`.
fn merge_parameters(shared: &[RawParameter], own: &[RawParameter]) -> Vec<ParameterSpec> {
    let mut merged: Vec<RawParameter> = shared.to_vec();
    for param in own {
        match merged
            .iter_mut()
            .find(|p| p.name == param.name && p.location == param.location)
        {
            Some(existing) => *existing = param.clone(),
            None => merged.push(param.clone()),
        }
    }

    merged
        .into_iter()
        .filter_map(|raw| {
            let Some(location) = ParameterLocation::parse(&raw.location) else {
                warn!(parameter = %raw.name, location = %raw.location, "Unsupported parameter location");
                return None;
            };
            Some(ParameterSpec {
                param_type: raw
                    .schema
                    .as_ref()
                    .and_then(|s| s.get("type"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                name: raw.name,
                location,
                description: raw.description,
                required: raw.required,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: Value) -> OpenApiDocument {
        OpenApiDocument::from_value(value).unwrap()
    }

    fn todo_document() -> OpenApiDocument {
        document(json!({
            "openapi": "3.0.1",
            "info": {"title": "TODO Plugin", "version": "v1"},
            "servers": [{"url": "https://todo.example.com/"}],
            "paths": {
                "/todos/{username}": {
                    "parameters": [
                        {"name": "username", "in": "path", "required": true, "schema": {"type": "string"}}
                    ],
                    "get": {
                        "operationId": "getTodos",
                        "summary": "Get the list of todos",
                        "parameters": [
                            {"name": "limit", "in": "query", "schema": {"type": "integer"}}
                        ]
                    },
                    "post": {
                        "operationId": "addTodo",
                        "description": "Add a todo to the list",
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {
                                            "todo": {"type": "string"},
                                            "priority": {"type": "integer"}
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "delete": {
                        "summary": "No operationId here"
                    }
                }
            }
        }))
    }

    #[test]
    fn test_build_index() {
        let index = OperationIndex::build(&todo_document(), "https://ignored.example.com");

        assert_eq!(index.len(), 2);
        assert_eq!(index.operation_ids().collect::<Vec<_>>(), ["getTodos", "addTodo"]);

        let get = index.get("getTodos").unwrap();
        assert_eq!(get.method, HttpMethod::Get);
        assert_eq!(get.url, "https://todo.example.com/todos/{username}");
        assert_eq!(get.description.as_deref(), Some("Get the list of todos"));
        assert_eq!(get.parameters.len(), 2);
        assert_eq!(get.parameters[0].name, "username");
        assert_eq!(get.parameters[0].location, ParameterLocation::Path);
        assert!(get.parameters[0].required);
        assert_eq!(get.parameters[1].param_type.as_deref(), Some("integer"));
        assert!(!get.parameters[1].required);
        assert!(get.request_body.is_none());

        let add = index.get("addTodo").unwrap();
        let body = add.request_body.as_ref().unwrap();
        assert!(body.required);
        let props: Vec<_> = body.properties().map(|(k, _)| k.as_str()).collect();
        assert_eq!(props, ["todo", "priority"]);
    }

    #[test]
    fn test_missing_operation_id_excluded() {
        let index = OperationIndex::build(&todo_document(), "https://todo.example.com");
        assert!(index.iter().all(|op| op.method != HttpMethod::Delete));
    }

    #[test]
    fn test_base_url_fallback_and_slashes() {
        let doc = document(json!({
            "paths": {"sum": {"get": {"operationId": "sum"}}}
        }));
        let index = OperationIndex::build(&doc, "https://calc.example.com///");
        assert_eq!(index.get("sum").unwrap().url, "https://calc.example.com/sum");
    }

    #[test]
    fn test_relative_server_url() {
        let doc = document(json!({
            "servers": [{"url": "/api/v1"}],
            "paths": {"/items": {"get": {"operationId": "listItems"}}}
        }));
        let index = OperationIndex::build(&doc, "https://shop.example.com/");
        assert_eq!(
            index.get("listItems").unwrap().url,
            "https://shop.example.com/api/v1/items"
        );
    }

    #[test]
    fn test_operation_parameter_overrides_path_level() {
        let doc = document(json!({
            "paths": {
                "/a/{id}": {
                    "parameters": [{"name": "id", "in": "path", "schema": {"type": "string"}}],
                    "get": {
                        "operationId": "getA",
                        "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}}]
                    }
                }
            }
        }));
        let index = OperationIndex::build(&doc, "https://x.example.com");
        let params = &index.get("getA").unwrap().parameters;
        assert_eq!(params.len(), 1);
        assert!(params[0].required);
        assert_eq!(params[0].param_type.as_deref(), Some("integer"));
    }

    #[test]
    fn test_non_verb_keys_and_bad_locations_skipped() {
        let doc = document(json!({
            "paths": {
                "/a": {
                    "summary": "not an operation",
                    "x-extension": {"operationId": "nope"},
                    "trace": {"operationId": "traceA"},
                    "get": {
                        "operationId": "getA",
                        "parameters": [
                            {"name": "q", "in": "query"},
                            {"name": "f", "in": "formData"}
                        ]
                    }
                }
            }
        }));
        let index = OperationIndex::build(&doc, "https://x.example.com");
        assert_eq!(index.operation_ids().collect::<Vec<_>>(), ["getA"]);
        let params = &index.get("getA").unwrap().parameters;
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].param_type, None);
    }

    #[test]
    fn test_duplicate_operation_id_replaces_in_place() {
        let doc = document(json!({
            "paths": {
                "/first": {"get": {"operationId": "dup"}},
                "/middle": {"get": {"operationId": "other"}},
                "/second": {"post": {"operationId": "dup"}}
            }
        }));
        let index = OperationIndex::build(&doc, "https://x.example.com");
        assert_eq!(index.operation_ids().collect::<Vec<_>>(), ["dup", "other"]);
        assert_eq!(index.get("dup").unwrap().method, HttpMethod::Post);
    }

    #[test]
    fn test_document_requires_paths() {
        let err = OpenApiDocument::from_value(json!({"openapi": "3.0.0"})).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_request_body_schema_fallback() {
        let body = RequestBodySpec {
            description: None,
            required: false,
            content: json!({"text/plain": {"type": "object", "properties": {"x": {}}}})
                .as_object()
                .cloned()
                .unwrap(),
        };
        assert_eq!(body.properties().count(), 1);
    }
}
