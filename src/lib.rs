//! Plugin Bridge Library
//!
//! Connects LLMs to HTTP APIs described by AI-plugin manifests and `OpenAPI`
//! documents.
//!
//! # Features
//!
//! - **Compact descriptions**: each plugin is rendered as a short
//!   `namespace { operationId … }` block sized with a real tokenizer
//! - **Bounded activation**: a capped, ordered set of active plugins drives
//!   the system prompt and function-calling schemas
//! - **Call execution**: `<API>Namespace.operationId({...})</API>` blocks in
//!   model output become HTTP requests with bearer auth
//! - **Directory discovery**: plugin base URLs can be listed from public
//!   plugin directories
//! - **Pluggable seams**: spec loading, tokenization and HTTP transport are
//!   traits, so hosts and tests can swap them

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod call;
pub mod cli;
pub mod config;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod plugin;
pub mod prompt;
pub mod registry;
pub mod tokens;
pub mod transport;

pub use call::{ParsedCall, parse_call};
pub use error::{Error, Result};
pub use loader::{
    DirectoryFilter, DirectoryProvider, HttpSpecLoader, LoadedPlugin, PluginDirectory, SpecLoader,
    load_from_strings,
};
pub use manifest::Manifest;
pub use plugin::{FunctionSpec, OperationDescriptor, OperationIndex, PluginEntry};
pub use registry::{PluginRegistry, PluginSource};
pub use tokens::{TiktokenCounter, Tokenizer};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Transport};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` overrides `level` when set.
///
/// # Errors
///
/// Returns `Error::Config` if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries command output.
    let result = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}
