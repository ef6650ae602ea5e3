//! Command-line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::loader::{DirectoryFilter, DirectoryProvider};

/// Plugin Bridge - describe AI plugins for LLM prompts and execute their calls
#[derive(Parser, Debug)]
#[command(name = "plugin-bridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "PLUGIN_BRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "warn",
        env = "PLUGIN_BRIDGE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "PLUGIN_BRIDGE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Plugin URLs; falls back to `plugins` from the config file when empty
#[derive(Args, Debug, Clone)]
pub struct PluginUrls {
    /// Plugin base URLs (manifest at `<url>/.well-known/ai-plugin.json`)
    pub urls: Vec<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print each plugin's namespace description and token count
    Describe(PluginUrls),

    /// Print the system prompt for the plugins
    Prompt(PluginUrls),

    /// Print the function-calling schemas as JSON
    Functions(PluginUrls),

    /// Execute the API call contained in LLM output
    Call {
        /// Plugins to install and activate
        #[command(flatten)]
        plugins: PluginUrls,

        /// LLM output containing `<API>Namespace.operationId({...})</API>`
        #[arg(long, required = true)]
        text: String,

        /// Bearer token for plugins with user/service/OAuth auth
        #[arg(long, env = "PLUGIN_BRIDGE_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// List plugin URLs published by a plugin directory
    List {
        /// Directory to query (plugnplai, pluginso)
        #[arg(long, default_value_t = DirectoryProvider::Plugnplai)]
        provider: DirectoryProvider,

        /// Listing filter for plugnplai (working, ChatGPT)
        #[arg(long)]
        filter: Option<DirectoryFilter>,

        /// Listing endpoint overriding the provider's public one
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Parse LLM output and print the extracted call without executing it
    Parse {
        /// LLM output to parse
        #[arg(long, required = true)]
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call_command() {
        let cli = Cli::try_parse_from([
            "plugin-bridge",
            "call",
            "https://todo.example.com",
            "--text",
            "<API>todo.getTodos({})</API>",
            "--token",
            "abc",
        ])
        .unwrap();

        assert_eq!(cli.log_level, "warn");
        match cli.command {
            Command::Call {
                plugins,
                text,
                token,
            } => {
                assert_eq!(plugins.urls, vec!["https://todo.example.com"]);
                assert_eq!(text, "<API>todo.getTodos({})</API>");
                assert_eq!(token.as_deref(), Some("abc"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_list_command() {
        let cli = Cli::try_parse_from(["plugin-bridge", "list", "--filter", "working"]).unwrap();
        match cli.command {
            Command::List {
                provider,
                filter,
                endpoint,
            } => {
                assert_eq!(provider, DirectoryProvider::Plugnplai);
                assert_eq!(filter, Some(DirectoryFilter::Working));
                assert_eq!(endpoint, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["plugin-bridge", "list", "--provider", "npm"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "plugin-bridge",
            "describe",
            "--log-level",
            "debug",
            "--config",
            "bridge.yaml",
        ])
        .unwrap();

        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.config, Some(PathBuf::from("bridge.yaml")));
        assert!(matches!(cli.command, Command::Describe(ref p) if p.urls.is_empty()));
    }
}
