//! Configuration management

use std::sync::LazyLock;
use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use chrono::Local;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::prompt::default_template;
use crate::tokens::DEFAULT_MODEL;
use crate::{Error, Result};

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("env var pattern is a valid regex")
});

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Registry configuration
    pub registry: RegistryConfig,
    /// Outbound HTTP configuration
    pub http: HttpConfig,
    /// Plugin base URLs to install at startup
    pub plugins: Vec<String>,
}

/// Plugin registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of simultaneously active plugins
    pub active_limit: usize,
    /// Model whose tokenizer sizes prompts
    pub model_name: String,
    /// Inline prompt template containing `{{plugins}}`
    pub template: Option<String>,
    /// File holding the prompt template (used when `template` is unset)
    pub template_file: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            active_limit: 3,
            model_name: DEFAULT_MODEL.to_string(),
            template: None,
            template_file: None,
        }
    }
}

impl RegistryConfig {
    /// Prompt template: inline, then file, then the built-in default
    ///
    /// # Errors
    ///
    /// Returns an error if `template_file` cannot be read.
    pub fn resolve_template(&self) -> Result<String> {
        if let Some(template) = &self.template {
            return Ok(template.clone());
        }
        if let Some(path) = &self.template_file {
            return fs::read_to_string(path).map_err(|e| {
                Error::Config(format!(
                    "Failed to read template file {}: {e}",
                    path.display()
                ))
            });
        }
        Ok(default_template(Local::now().date_naive()))
    }
}

/// Outbound HTTP configuration (spec loading and plugin calls)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Overall request timeout; unset means no timeout
    #[serde(with = "duration_serde")]
    pub timeout: Option<Duration>,
    /// User-Agent header
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            user_agent: concat!("plugin-bridge/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // PLUGIN_BRIDGE_REGISTRY__ACTIVE_LIMIT=5 etc.
        figment = figment.merge(Env::prefixed("PLUGIN_BRIDGE_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.expand_env_vars();
        Ok(config)
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in plugin URLs
    fn expand_env_vars(&mut self) {
        for url in &mut self.plugins {
            *url = Self::expand_string(url);
        }
    }

    fn expand_string(value: &str) -> String {
        ENV_VAR_PATTERN.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// Optional human-readable durations (`"30s"`, `"5m"`, `"100ms"`, bare seconds)
pub mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    /// Serialize as `"{n}s"`, or `"{n}ms"` for sub-second precision
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) if d.subsec_millis() != 0 => {
                serializer.serialize_str(&format!("{}ms", d.as_millis()))
            }
            Some(d) => serializer.serialize_str(&format!("{}s", d.as_secs())),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional duration
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the value is not a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Secs(secs)) => Ok(Some(Duration::from_secs(secs))),
            Some(Raw::Text(text)) => parse(&text).map(Some).map_err(serde::de::Error::custom),
        }
    }

    /// Parse `"100ms"`, `"30s"`, `"5m"` or bare seconds
    ///
    /// # Errors
    ///
    /// Returns an error if the numeric part is not an unsigned integer.
    pub fn parse(text: &str) -> Result<Duration, std::num::ParseIntError> {
        let text = text.trim();
        // "ms" before "s" and "m"
        if let Some(ms) = text.strip_suffix("ms") {
            ms.trim().parse().map(Duration::from_millis)
        } else if let Some(secs) = text.strip_suffix('s') {
            secs.trim().parse().map(Duration::from_secs)
        } else if let Some(mins) = text.strip_suffix('m') {
            mins.trim().parse::<u64>().map(|m| Duration::from_secs(m * 60))
        } else {
            text.parse().map(Duration::from_secs)
        }
    }
}
