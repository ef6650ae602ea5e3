//! Installed plugin snapshot
//!
//! A [`PluginEntry`] couples a manifest with its operation index and
//! the derived prompt description. The description and its token count
//! are computed once in the constructor; an entry never changes after
//! that, so anything derived from it can be cached safely.

pub mod describe;
pub mod functions;
pub mod index;

pub use describe::{PLUGINS_PLACEHOLDER, describe_api, fill_template, short_type};
pub use functions::{FUNCTION_NAME_SEPARATOR, FunctionSpec, build_functions, split_function_name};
pub use index::{
    HttpMethod, OpenApiDocument, OperationDescriptor, OperationIndex, ParameterLocation,
    ParameterSpec, RequestBodySpec,
};

use tracing::debug;

use crate::loader::LoadedPlugin;
use crate::manifest::Manifest;
use crate::tokens::Tokenizer;

/// An installed plugin
#[derive(Debug, Clone, PartialEq)]
pub struct PluginEntry {
    manifest: Manifest,
    operations: OperationIndex,
    description: String,
    tokens: usize,
}

impl PluginEntry {
    /// Index `document` and render the plugin description
    ///
    /// `base_url` anchors operation URLs when the document declares no
    /// (or only relative) servers.
    #[must_use]
    pub fn new(
        manifest: Manifest,
        document: &OpenApiDocument,
        base_url: &str,
        tokenizer: &dyn Tokenizer,
    ) -> Self {
        let operations = OperationIndex::build(document, base_url);
        let description = describe_api(&manifest, &operations);
        let tokens = tokenizer.count_tokens(&description);

        debug!(
            plugin = %manifest.name_for_model,
            operations = operations.len(),
            tokens,
            "Built plugin entry"
        );

        Self {
            manifest,
            operations,
            description,
            tokens,
        }
    }

    /// Build an entry from loader output
    #[must_use]
    pub fn from_loaded(loaded: &LoadedPlugin, tokenizer: &dyn Tokenizer) -> Self {
        Self::new(
            loaded.manifest.clone(),
            &loaded.document,
            &loaded.base_url,
            tokenizer,
        )
    }

    /// `name_for_model`
    #[must_use]
    pub fn name(&self) -> &str {
        &self.manifest.name_for_model
    }

    /// `description_for_model`
    #[must_use]
    pub fn description_for_model(&self) -> &str {
        &self.manifest.description_for_model
    }

    /// Manifest
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Operation index
    #[must_use]
    pub fn operations(&self) -> &OperationIndex {
        &self.operations
    }

    /// Rendered namespace description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Token count of [`Self::description`]
    #[must_use]
    pub fn tokens(&self) -> usize {
        self.tokens
    }
}
