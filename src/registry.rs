//! Plugin registry
//!
//! Owns every installed plugin and the ordered set of active ones.
//! Activation order decides prompt numbering. The aggregate prompt,
//! function list and their token counts are recomputed on every change
//! of the active set, so readers never observe stale values.
//!
//! Lookup misses, capacity refusals, malformed LLM output and missing
//! parameters are logged and absorbed here: a single bad call never aborts
//! the surrounding conversation. Network, parse and transport failures
//! propagate.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::call::{Invoker, ParsedCall, parse_call};
use crate::config::RegistryConfig;
use crate::loader::{LoadedPlugin, SpecLoader};
use crate::plugin::{FunctionSpec, PluginEntry, build_functions, fill_template, split_function_name};
use crate::tokens::Tokenizer;
use crate::transport::{HttpResponse, Transport};
use crate::{Error, Result};

/// Something that can be installed
#[derive(Debug, Clone)]
pub enum PluginSource {
    /// Plugin base URL, fetched through the registry's loader
    Url(String),
    /// Manifest and document already loaded
    Loaded(LoadedPlugin),
    /// Fully built entry
    Entry(PluginEntry),
}

impl From<&str> for PluginSource {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<String> for PluginSource {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<LoadedPlugin> for PluginSource {
    fn from(loaded: LoadedPlugin) -> Self {
        Self::Loaded(loaded)
    }
}

impl From<PluginEntry> for PluginSource {
    fn from(entry: PluginEntry) -> Self {
        Self::Entry(entry)
    }
}

/// Installed and active plugins plus their derived prompt state
pub struct PluginRegistry {
    installed: HashMap<String, Arc<PluginEntry>>,
    install_order: Vec<String>,
    active: Vec<String>,
    active_limit: usize,
    template: String,
    loader: Arc<dyn SpecLoader>,
    tokenizer: Arc<dyn Tokenizer>,
    invoker: Invoker,
    prompt: String,
    prompt_tokens: usize,
    functions: Vec<FunctionSpec>,
    function_tokens: usize,
}

impl PluginRegistry {
    /// Create an empty registry
    ///
    /// # Errors
    ///
    /// Returns an error if the configured template file cannot be read.
    pub fn new(
        config: &RegistryConfig,
        loader: Arc<dyn SpecLoader>,
        tokenizer: Arc<dyn Tokenizer>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let mut registry = Self {
            installed: HashMap::new(),
            install_order: Vec::new(),
            active: Vec::new(),
            active_limit: config.active_limit,
            template: config.resolve_template()?,
            loader,
            tokenizer,
            invoker: Invoker::new(transport),
            prompt: String::new(),
            prompt_tokens: 0,
            functions: Vec::new(),
            function_tokens: 0,
        };
        registry.refresh();
        Ok(registry)
    }

    /// Create a registry, install `sources` and activate each in order
    ///
    /// Plugins beyond the active limit stay installed but inactive.
    ///
    /// # Errors
    ///
    /// Returns load errors from installation.
    pub fn install_and_activate<S>(
        config: &RegistryConfig,
        loader: Arc<dyn SpecLoader>,
        tokenizer: Arc<dyn Tokenizer>,
        transport: Arc<dyn Transport>,
        sources: impl IntoIterator<Item = S>,
    ) -> Result<Self>
    where
        S: Into<PluginSource>,
    {
        let mut registry = Self::new(config, loader, tokenizer, transport)?;
        for name in registry.install(sources)? {
            // Capacity refusals are already logged.
            let _ = registry.activate(&name);
        }
        Ok(registry)
    }

    /// Install plugins, replacing any installed under the same name
    ///
    /// Returns the installed names in input order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Network` or `Error::Parse` when a URL source fails
    /// to load. Sources before the failing one remain installed.
    pub fn install<S>(&mut self, sources: impl IntoIterator<Item = S>) -> Result<Vec<String>>
    where
        S: Into<PluginSource>,
    {
        let mut names = Vec::new();
        let mut touched_active = false;

        for source in sources {
            let entry = match source.into() {
                PluginSource::Url(url) => {
                    let loaded = self.loader.load(&url)?;
                    PluginEntry::from_loaded(&loaded, self.tokenizer.as_ref())
                }
                PluginSource::Loaded(loaded) => {
                    PluginEntry::from_loaded(&loaded, self.tokenizer.as_ref())
                }
                PluginSource::Entry(entry) => entry,
            };

            let name = entry.name().to_string();
            info!(
                plugin = %name,
                operations = entry.operations().len(),
                tokens = entry.tokens(),
                "Installed plugin"
            );
            touched_active |= self.is_active(&name);
            if self.installed.insert(name.clone(), Arc::new(entry)).is_none() {
                self.install_order.push(name.clone());
            }
            names.push(name);
        }

        if touched_active {
            self.refresh();
        }
        Ok(names)
    }

    /// Activate an installed plugin
    ///
    /// Activating an already active plugin changes nothing.
    ///
    /// # Errors
    ///
    /// `Error::PluginNotFound` if the plugin is not installed and
    /// `Error::ActivationLimit` if the active set is full. Neither changes
    /// the registry.
    pub fn activate(&mut self, name: &str) -> Result<()> {
        if !self.installed.contains_key(name) {
            warn!(plugin = %name, "Cannot activate: plugin not installed");
            return Err(Error::PluginNotFound(name.to_string()));
        }
        if self.is_active(name) {
            debug!(plugin = %name, "Plugin already active");
            return Ok(());
        }
        if self.active.len() >= self.active_limit {
            warn!(plugin = %name, limit = self.active_limit, "Cannot activate: active plugin limit reached");
            return Err(Error::ActivationLimit {
                name: name.to_string(),
                limit: self.active_limit,
            });
        }

        self.active.push(name.to_string());
        self.refresh();
        info!(plugin = %name, active = self.active.len(), prompt_tokens = self.prompt_tokens, "Activated plugin");
        Ok(())
    }

    /// Deactivate a plugin; returns whether it was active
    ///
    /// The plugin stays installed.
    pub fn deactivate(&mut self, name: &str) -> bool {
        let Some(pos) = self.active.iter().position(|n| n == name) else {
            debug!(plugin = %name, "Plugin not active, nothing to deactivate");
            return false;
        };
        self.active.remove(pos);
        self.refresh();
        info!(plugin = %name, active = self.active.len(), "Deactivated plugin");
        true
    }

    fn active_entries(&self) -> impl Iterator<Item = &PluginEntry> {
        self.active
            .iter()
            .filter_map(|name| self.installed.get(name))
            .map(AsRef::as_ref)
    }

    /// Recompute every aggregate from the current active set
    fn refresh(&mut self) {
        let prompt = fill_template(&self.template, self.active_entries());
        let functions = build_functions(self.active_entries());
        let functions_json = serde_json::to_string(&functions).unwrap_or_default();

        self.prompt_tokens = self.tokenizer.count_tokens(&prompt);
        self.function_tokens = self.tokenizer.count_tokens(&functions_json);
        self.prompt = prompt;
        self.functions = functions;
    }

    /// Installed plugin names in first-install order
    #[must_use]
    pub fn list_installed(&self) -> Vec<&str> {
        self.install_order.iter().map(String::as_str).collect()
    }

    /// Active plugin names in activation order
    #[must_use]
    pub fn list_active(&self) -> Vec<&str> {
        self.active.iter().map(String::as_str).collect()
    }

    /// Whether `name` is active
    #[must_use]
    pub fn is_active(&self, name: &str) -> bool {
        self.active.iter().any(|n| n == name)
    }

    /// Installed plugin by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PluginEntry> {
        self.installed.get(name).map(AsRef::as_ref)
    }

    /// Maximum number of active plugins
    #[must_use]
    pub fn active_limit(&self) -> usize {
        self.active_limit
    }

    /// Prompt for the active plugins
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Token count of [`Self::prompt`]
    #[must_use]
    pub fn prompt_tokens(&self) -> usize {
        self.prompt_tokens
    }

    /// Function-calling schemas for the active plugins
    #[must_use]
    pub fn functions(&self) -> &[FunctionSpec] {
        &self.functions
    }

    /// Token count of the JSON-encoded [`Self::functions`]
    #[must_use]
    pub fn function_tokens(&self) -> usize {
        self.function_tokens
    }

    /// Fill `template` with only the named active plugins
    ///
    /// Plugins keep their activation order; inactive or unknown names are
    /// ignored.
    #[must_use]
    pub fn fill_prompt(&self, template: &str, names: &[&str]) -> String {
        fill_template(
            template,
            self.active
                .iter()
                .filter(|name| names.contains(&name.as_str()))
                .filter_map(|name| self.installed.get(name))
                .map(AsRef::as_ref),
        )
    }

    /// Call an operation of an active plugin
    ///
    /// Returns `Ok(None)` when the plugin is not active, the operation is
    /// unknown, or a required parameter is missing.
    ///
    /// # Errors
    ///
    /// `Error::UnsupportedMethod` for operations that are not GET/POST and
    /// `Error::Transport` when the request fails.
    pub fn call(
        &self,
        plugin_name: &str,
        operation_id: &str,
        params: &Map<String, Value>,
        token: Option<&str>,
    ) -> Result<Option<HttpResponse>> {
        absorb(self.try_call(plugin_name, operation_id, params, token))
    }

    fn try_call(
        &self,
        plugin_name: &str,
        operation_id: &str,
        params: &Map<String, Value>,
        token: Option<&str>,
    ) -> Result<HttpResponse> {
        let plugin = self
            .installed
            .get(plugin_name)
            .filter(|_| self.is_active(plugin_name))
            .ok_or_else(|| Error::PluginNotFound(plugin_name.to_string()))?;

        let operation = plugin
            .operations()
            .get(operation_id)
            .ok_or_else(|| Error::OperationNotFound {
                plugin: plugin_name.to_string(),
                operation: operation_id.to_string(),
            })?;

        self.invoker
            .invoke(operation, params, plugin.manifest().auth.as_ref(), token)
    }

    /// Execute a parsed call
    ///
    /// # Errors
    ///
    /// Same as [`Self::call`].
    pub fn call_parsed(&self, call: &ParsedCall, token: Option<&str>) -> Result<Option<HttpResponse>> {
        self.call(&call.plugin_name, &call.operation_id, &call.parameters, token)
    }

    /// Execute a function call produced by a function-calling LLM API
    ///
    /// `name` is one of the [`Self::functions`] names; `arguments` is the
    /// JSON-encoded argument object.
    ///
    /// # Errors
    ///
    /// Same as [`Self::call`].
    pub fn call_function(
        &self,
        name: &str,
        arguments: &str,
        token: Option<&str>,
    ) -> Result<Option<HttpResponse>> {
        let Some((plugin, operation)) = split_function_name(name) else {
            warn!(function = %name, "Not a plugin function name");
            return Ok(None);
        };
        let params = match serde_json::from_str::<Value>(arguments) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) if arguments.trim().is_empty() => Map::new(),
            Ok(_) | Err(_) => {
                warn!(function = %name, "Function arguments are not a JSON object");
                return Ok(None);
            }
        };
        self.call(plugin, operation, &params, token)
    }

    /// Parse `llm_output` and execute the call it contains
    ///
    /// Returns the response body text, or `Ok(None)` when there is no call,
    /// the call is malformed, or the call was absorbed by [`Self::call`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::call`].
    pub fn parse_and_call(&self, llm_output: &str, token: Option<&str>) -> Result<Option<String>> {
        let Some(call) = absorb(parse_call(llm_output))?.flatten() else {
            return Ok(None);
        };
        debug!(plugin = %call.plugin_name, operation = %call.operation_id, "Parsed call");
        Ok(self.call_parsed(&call, token)?.map(|response| response.text))
    }
}

/// Log and swallow recoverable errors
fn absorb<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_recoverable() => {
            warn!(error = %e, "Plugin call skipped");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
