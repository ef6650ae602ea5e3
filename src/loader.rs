//! Manifest and `OpenAPI` spec loading
//!
//! A plugin is located by its base URL. The manifest lives at
//! `{base}/.well-known/ai-plugin.json` and points (possibly relatively) at
//! the `OpenAPI` document, which may be JSON or YAML. Local `$ref`
//! pointers are inlined before the document is handed to the index.
//!
//! [`PluginDirectory`] lists plugin base URLs from a public directory.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use url::Url;

use crate::manifest::Manifest;
use crate::plugin::OpenApiDocument;
use crate::plugin::index::join_url;
use crate::{Error, Result};

/// Well-known manifest location relative to the plugin base URL
pub const MANIFEST_PATH: &str = ".well-known/ai-plugin.json";

/// Manifest plus resolved document for one plugin
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    /// URL the plugin was loaded from
    pub base_url: String,
    /// Validated manifest with an absolute `api.url`
    pub manifest: Manifest,
    /// `$ref`-resolved `OpenAPI` document
    pub document: OpenApiDocument,
}

/// Source of plugin manifests and specs
pub trait SpecLoader: Send + Sync {
    /// Load the plugin served at `url`
    ///
    /// # Errors
    ///
    /// `Error::Network` when a document cannot be fetched, `Error::Parse`
    /// when it cannot be parsed or validated.
    fn load(&self, url: &str) -> Result<LoadedPlugin>;
}

/// Loader fetching over HTTP with a blocking reqwest client
#[derive(Debug, Clone)]
pub struct HttpSpecLoader {
    client: Client,
}

impl HttpSpecLoader {
    /// Create a loader with an optional request timeout
    ///
    /// # Errors
    ///
    /// Returns `Error::Network` if the HTTP client cannot be built.
    pub fn new(timeout: Option<Duration>, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout, user_agent)?,
        })
    }

    fn fetch_text(&self, url: &str) -> Result<String> {
        fetch_text(&self.client, url)
    }
}

fn build_client(timeout: Option<Duration>, user_agent: &str) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(|e| Error::Network(e.to_string()))
}

fn fetch_text(client: &Client, url: &str) -> Result<String> {
    debug!(url = %url, "Fetching");
    let response = client
        .get(url)
        .send()
        .map_err(|e| Error::Network(format!("GET {url} failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Network(format!("GET {url} returned {status}")));
    }

    response
        .text()
        .map_err(|e| Error::Network(format!("Failed to read {url}: {e}")))
}

impl SpecLoader for HttpSpecLoader {
    fn load(&self, url: &str) -> Result<LoadedPlugin> {
        let manifest_url = manifest_url(url)?;
        let manifest = Manifest::from_json(&self.fetch_text(&manifest_url)?)?;
        let spec_url = resolve_api_url(url, &manifest.api.url)?;
        let spec_text = self.fetch_text(&spec_url)?;

        let plugin = assemble(url, &manifest, &spec_url, &spec_text)?;
        info!(
            plugin = %plugin.manifest.name_for_model,
            spec = %spec_url,
            version = %plugin.document.version(),
            "Loaded plugin"
        );
        Ok(plugin)
    }
}

/// plugnplai.com plugin URL listing
pub const PLUGNPLAI_DIRECTORY_URL: &str = "https://www.plugnplai.com/_functions/getUrls";

/// plugin.so plugin listing
pub const PLUGINSO_DIRECTORY_URL: &str = "https://plugin.so/api/plugins/list";

/// Public directory listing plugin base URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryProvider {
    /// plugnplai.com, returns a JSON array of URLs
    #[default]
    Plugnplai,
    /// plugin.so, returns entries carrying a `domain`
    Pluginso,
}

impl DirectoryProvider {
    /// Listing endpoint
    #[must_use]
    pub fn default_endpoint(self) -> &'static str {
        match self {
            Self::Plugnplai => PLUGNPLAI_DIRECTORY_URL,
            Self::Pluginso => PLUGINSO_DIRECTORY_URL,
        }
    }
}

impl fmt::Display for DirectoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plugnplai => "plugnplai",
            Self::Pluginso => "pluginso",
        })
    }
}

impl FromStr for DirectoryProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "plugnplai" => Ok(Self::Plugnplai),
            "pluginso" => Ok(Self::Pluginso),
            other => Err(Error::Config(format!(
                "Unknown plugin directory '{other}' (expected plugnplai or pluginso)"
            ))),
        }
    }
}

/// Directory listing filter (plugnplai only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryFilter {
    /// Plugins that passed the directory's own checks
    #[serde(rename = "working")]
    Working,
    /// Plugins available in ChatGPT
    #[serde(rename = "ChatGPT")]
    ChatGpt,
}

impl DirectoryFilter {
    /// Path segment appended to the listing endpoint
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::ChatGpt => "ChatGPT",
        }
    }
}

impl FromStr for DirectoryFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "working" => Ok(Self::Working),
            "chatgpt" => Ok(Self::ChatGpt),
            other => Err(Error::Config(format!(
                "Unknown directory filter '{other}' (expected working or ChatGPT)"
            ))),
        }
    }
}

#[derive(Deserialize)]
struct PluginsoEntry {
    domain: String,
}

/// Client for a public plugin directory
#[derive(Debug, Clone)]
pub struct PluginDirectory {
    client: Client,
    provider: DirectoryProvider,
    endpoint: String,
}

impl PluginDirectory {
    /// Directory client for `provider` at its public endpoint
    ///
    /// # Errors
    ///
    /// Returns `Error::Network` if the HTTP client cannot be built.
    pub fn new(provider: DirectoryProvider, timeout: Option<Duration>, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout, user_agent)?,
            provider,
            endpoint: provider.default_endpoint().to_string(),
        })
    }

    /// Use another listing endpoint (mirrors, tests)
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Provider this client talks to
    #[must_use]
    pub fn provider(&self) -> DirectoryProvider {
        self.provider
    }

    /// Plugin base URLs listed by the directory
    ///
    /// `filter` narrows plugnplai listings and is ignored for plugin.so.
    ///
    /// # Errors
    ///
    /// `Error::Network` when the listing cannot be fetched, `Error::Parse`
    /// when it has an unexpected shape.
    pub fn list(&self, filter: Option<DirectoryFilter>) -> Result<Vec<String>> {
        let urls = match self.provider {
            DirectoryProvider::Plugnplai => {
                let url = filter.map_or_else(
                    || self.endpoint.clone(),
                    |f| join_url(&self.endpoint, f.path_segment()),
                );
                let text = fetch_text(&self.client, &url)?;
                serde_json::from_str::<Vec<String>>(&text).map_err(|e| {
                    Error::Parse(format!("Unexpected directory listing from {url}: {e}"))
                })?
            }
            DirectoryProvider::Pluginso => {
                if let Some(filter) = filter {
                    debug!(filter = ?filter, "plugin.so listings are unfiltered, ignoring filter");
                }
                let text = fetch_text(&self.client, &self.endpoint)?;
                serde_json::from_str::<Vec<PluginsoEntry>>(&text)
                    .map_err(|e| {
                        Error::Parse(format!(
                            "Unexpected directory listing from {}: {e}",
                            self.endpoint
                        ))
                    })?
                    .into_iter()
                    .map(|entry| format!("https://{}", entry.domain))
                    .collect()
            }
        };

        info!(provider = %self.provider, plugins = urls.len(), "Listed plugin directory");
        Ok(urls)
    }
}

/// Build a [`LoadedPlugin`] from already fetched manifest and spec text
///
/// # Errors
///
/// Returns `Error::Parse` for invalid manifests or documents and
/// `Error::Config` for an unusable base URL.
pub fn load_from_strings(base_url: &str, manifest_text: &str, spec_text: &str) -> Result<LoadedPlugin> {
    let manifest = Manifest::from_json(manifest_text)?;
    let spec_url = resolve_api_url(base_url, &manifest.api.url)?;
    assemble(base_url, &manifest, &spec_url, spec_text)
}

fn assemble(base_url: &str, manifest: &Manifest, spec_url: &str, spec_text: &str) -> Result<LoadedPlugin> {
    let raw = parse_document_text(spec_text)?;
    let document = OpenApiDocument::from_value(resolve_refs(&raw)?)?;
    Ok(LoadedPlugin {
        base_url: base_url.to_string(),
        manifest: manifest.with_api_url(spec_url),
        document,
    })
}

/// `{base}/.well-known/ai-plugin.json`
///
/// # Errors
///
/// Returns `Error::Config` if `base_url` is not an absolute URL.
pub fn manifest_url(base_url: &str) -> Result<String> {
    Url::parse(base_url).map_err(|e| Error::Config(format!("Invalid plugin URL '{base_url}': {e}")))?;
    Ok(join_url(base_url, MANIFEST_PATH))
}

/// Absolute spec URL for a manifest `api.url`
///
/// Root-relative URLs are appended to the plugin base URL, other relative
/// URLs are resolved against it, absolute URLs are returned unchanged.
///
/// # Errors
///
/// Returns `Error::Config` if `base_url` is not an absolute URL.
pub fn resolve_api_url(base_url: &str, api_url: &str) -> Result<String> {
    if api_url.starts_with('/') {
        return Ok(format!("{}{api_url}", base_url.trim_end_matches('/')));
    }
    if Url::parse(api_url).is_ok() {
        return Ok(api_url.to_string());
    }
    let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
        .map_err(|e| Error::Config(format!("Invalid plugin URL '{base_url}': {e}")))?;
    base.join(api_url)
        .map(String::from)
        .map_err(|e| Error::Parse(format!("Invalid api.url '{api_url}': {e}")))
}

/// Parse spec text as JSON, falling back to YAML
///
/// # Errors
///
/// Returns `Error::Parse` if the text is neither.
pub fn parse_document_text(text: &str) -> Result<Value> {
    serde_json::from_str(text).or_else(|json_err| {
        serde_yaml::from_str(text).map_err(|yaml_err| {
            Error::Parse(format!(
                "Spec is neither JSON ({json_err}) nor YAML ({yaml_err})"
            ))
        })
    })
}

/// Inline every local (`#/...`) `$ref` in `document`
///
/// References to other documents are left untouched. A reference back into
/// a schema that is still being expanded stays a `{"$ref": ...}` node, so
/// recursive schemas are inlined down to their first repetition.
///
/// # Errors
///
/// Returns `Error::Parse` for dangling references.
pub fn resolve_refs(document: &Value) -> Result<Value> {
    let mut resolver = RefResolver {
        root: document,
        stack: Vec::new(),
        resolved: HashMap::new(),
    };
    resolver.resolve(document)
}

struct RefResolver<'a> {
    root: &'a Value,
    stack: Vec<String>,
    resolved: HashMap<String, Value>,
}

impl RefResolver<'_> {
    fn resolve(&mut self, node: &Value) -> Result<Value> {
        match node {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    if let Some(pointer) = reference.strip_prefix('#') {
                        return self.resolve_pointer(reference, pointer);
                    }
                    debug!(reference = %reference, "Leaving external $ref unresolved");
                    return Ok(node.clone());
                }
                let mut out = Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), self.resolve(value)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            _ => Ok(node.clone()),
        }
    }

    fn resolve_pointer(&mut self, reference: &str, pointer: &str) -> Result<Value> {
        if let Some(done) = self.resolved.get(reference) {
            return Ok(done.clone());
        }
        if self.stack.iter().any(|r| r == reference) {
            // Recursive schema: stop expanding at the back edge.
            debug!(reference = %reference, "Leaving recursive $ref unresolved");
            let mut node = Map::new();
            node.insert("$ref".to_string(), Value::String(reference.to_string()));
            return Ok(Value::Object(node));
        }

        let root = self.root;
        let target = root
            .pointer(pointer)
            .ok_or_else(|| Error::Parse(format!("Unresolvable $ref: {reference}")))?;

        self.stack.push(reference.to_string());
        let value = self.resolve(target);
        self.stack.pop();

        let value = value?;
        self.resolved.insert(reference.to_string(), value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const MANIFEST: &str = r#"{
        "schema_version": "v1",
        "name_for_model": "todo",
        "name_for_human": "TODO List",
        "description_for_model": "Manage a TODO list.",
        "description_for_human": "Manage your TODOs.",
        "auth": {"type": "none"},
        "api": {"type": "openapi", "url": "/openapi.yaml"}
    }"#;

    const SPEC_YAML: &str = r"
openapi: 3.0.1
info:
  title: TODO Plugin
  version: v1
paths:
  /todos:
    post:
      operationId: addTodo
      requestBody:
        required: true
        content:
          application/json:
            schema:
              $ref: '#/components/schemas/AddTodo'
components:
  schemas:
    AddTodo:
      type: object
      properties:
        todo:
          type: string
";

    #[test]
    fn test_manifest_url() {
        assert_eq!(
            manifest_url("https://todo.example.com/").unwrap(),
            "https://todo.example.com/.well-known/ai-plugin.json"
        );
        assert!(matches!(manifest_url("not a url"), Err(Error::Config(_))));
    }

    #[test]
    fn test_resolve_api_url() {
        let base = "https://todo.example.com/";
        assert_eq!(
            resolve_api_url(base, "/openapi.yaml").unwrap(),
            "https://todo.example.com/openapi.yaml"
        );
        assert_eq!(
            resolve_api_url(base, "https://cdn.example.com/spec.json").unwrap(),
            "https://cdn.example.com/spec.json"
        );
        assert_eq!(
            resolve_api_url("https://example.com/plugin", "openapi.json").unwrap(),
            "https://example.com/plugin/openapi.json"
        );
    }

    #[test]
    fn test_load_from_strings_yaml() {
        let plugin = load_from_strings("https://todo.example.com", MANIFEST, SPEC_YAML).unwrap();
        assert_eq!(plugin.manifest.api.url, "https://todo.example.com/openapi.yaml");
        assert_eq!(plugin.document.version(), "3.0.1");

        let schema = &plugin.document.paths["/todos"]["post"]["requestBody"]["content"]
            ["application/json"]["schema"];
        assert_eq!(schema["properties"]["todo"]["type"], "string");
    }

    #[test]
    fn test_parse_document_text() {
        assert_eq!(parse_document_text(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
        assert_eq!(parse_document_text("a: 1\n").unwrap(), json!({"a": 1}));
        assert!(matches!(parse_document_text("{ nope"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_resolve_nested_refs() {
        let doc = json!({
            "a": {"$ref": "#/defs/b"},
            "list": [{"$ref": "#/defs/c"}],
            "external": {"$ref": "other.yaml#/x"},
            "defs": {
                "b": {"inner": {"$ref": "#/defs/c"}},
                "c": {"type": "string"}
            }
        });
        let resolved = resolve_refs(&doc).unwrap();
        assert_eq!(resolved["a"], json!({"inner": {"type": "string"}}));
        assert_eq!(resolved["list"][0], json!({"type": "string"}));
        assert_eq!(resolved["external"], json!({"$ref": "other.yaml#/x"}));
    }

    #[test]
    fn test_recursive_refs_stop_at_back_edge() {
        let recursive = json!({
            "defs": {"node": {"properties": {"next": {"$ref": "#/defs/node"}}}},
            "root": {"$ref": "#/defs/node"}
        });
        let resolved = resolve_refs(&recursive).unwrap();
        assert_eq!(
            resolved["root"],
            json!({"properties": {"next": {"$ref": "#/defs/node"}}})
        );
        assert_eq!(
            resolved["defs"]["node"],
            json!({"properties": {"next": {"properties": {"next": {"$ref": "#/defs/node"}}}}})
        );
    }

    #[test]
    fn test_dangling_ref() {
        let dangling = json!({"a": {"$ref": "#/missing"}});
        assert!(matches!(resolve_refs(&dangling), Err(Error::Parse(_))));
    }

    #[test]
    fn test_load_with_unreferenced_recursive_schema() {
        let spec = r##"{
            "openapi": "3.0.1",
            "paths": {"/nodes": {"get": {"operationId": "listNodes"}}},
            "components": {"schemas": {"Node": {
                "type": "object",
                "properties": {
                    "children": {"type": "array", "items": {"$ref": "#/components/schemas/Node"}}
                }
            }}}
        }"##;
        let plugin = load_from_strings("https://todo.example.com", MANIFEST, spec).unwrap();
        let index = crate::plugin::OperationIndex::build(&plugin.document, &plugin.base_url);
        assert_eq!(index.operation_ids().collect::<Vec<_>>(), vec!["listNodes"]);
    }

    #[test]
    fn test_directory_names() {
        assert_eq!("PluginSo".parse::<DirectoryProvider>().unwrap(), DirectoryProvider::Pluginso);
        assert_eq!(DirectoryProvider::default().to_string(), "plugnplai");
        assert_eq!("chatgpt".parse::<DirectoryFilter>().unwrap().path_segment(), "ChatGPT");
        assert!(matches!("gpt".parse::<DirectoryFilter>(), Err(Error::Config(_))));
        assert!(matches!("npm".parse::<DirectoryProvider>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_manifest_is_parse_error() {
        let err = load_from_strings("https://todo.example.com", "{}", SPEC_YAML).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
