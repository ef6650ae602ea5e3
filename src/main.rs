//! Plugin Bridge - AI plugin descriptions and call execution for LLMs

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{debug, error};

use plugin_bridge::{
    HttpSpecLoader, HttpTransport, PluginDirectory, PluginRegistry, TiktokenCounter, parse_call,
    cli::{Cli, Command, PluginUrls},
    config::Config,
    setup_tracing,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    debug!(?config, "Loaded configuration");

    match cli.command {
        Command::Parse { text } => Ok(run_parse(&text)?),
        Command::List {
            provider,
            filter,
            endpoint,
        } => {
            let mut directory =
                PluginDirectory::new(provider, config.http.timeout, &config.http.user_agent)
                    .context("Failed to create directory client")?;
            if let Some(endpoint) = endpoint {
                directory = directory.with_endpoint(endpoint);
            }
            let urls = directory
                .list(filter)
                .with_context(|| format!("Failed to list plugins from {provider}"))?;
            for url in &urls {
                println!("{url}");
            }
            eprintln!("💡 {} plugin(s) listed by {provider}", urls.len());
            Ok(ExitCode::SUCCESS)
        }
        Command::Describe(plugins) => {
            let registry = build_registry(&config, &plugins)?;
            for name in registry.list_installed() {
                if let Some(entry) = registry.get(name) {
                    println!("{}\n", entry.description());
                    println!("💡 {name}: {} tokens\n", entry.tokens());
                }
            }
            let inactive: Vec<&str> = registry
                .list_installed()
                .into_iter()
                .filter(|name| !registry.is_active(name))
                .collect();
            if !inactive.is_empty() {
                eprintln!(
                    "⚠️  Not active (limit {}): {}",
                    registry.active_limit(),
                    inactive.join(", ")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Prompt(plugins) => {
            let registry = build_registry(&config, &plugins)?;
            println!("{}", registry.prompt());
            eprintln!("💡 Prompt: {} tokens", registry.prompt_tokens());
            Ok(ExitCode::SUCCESS)
        }
        Command::Functions(plugins) => {
            let registry = build_registry(&config, &plugins)?;
            let json = serde_json::to_string_pretty(registry.functions())
                .context("Failed to serialize functions")?;
            println!("{json}");
            eprintln!("💡 Functions: {} tokens", registry.function_tokens());
            Ok(ExitCode::SUCCESS)
        }
        Command::Call {
            plugins,
            text,
            token,
        } => {
            let registry = build_registry(&config, &plugins)?;
            match registry.parse_and_call(&text, token.as_deref())? {
                Some(body) => {
                    println!("{body}");
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("No call executed");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn run_parse(text: &str) -> plugin_bridge::Result<ExitCode> {
    match parse_call(text) {
        Ok(Some(call)) => {
            println!("{}", serde_json::to_string_pretty(&call)?);
            Ok(ExitCode::SUCCESS)
        }
        Ok(None) => {
            eprintln!("No call found");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            eprintln!("❌ {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn build_registry(config: &Config, plugins: &PluginUrls) -> anyhow::Result<PluginRegistry> {
    let urls = if plugins.urls.is_empty() {
        &config.plugins
    } else {
        &plugins.urls
    };
    if urls.is_empty() {
        bail!("No plugin URLs given and none configured");
    }

    let loader = HttpSpecLoader::new(config.http.timeout, &config.http.user_agent)
        .context("Failed to create spec loader")?;
    let transport = HttpTransport::new(config.http.timeout, &config.http.user_agent)
        .context("Failed to create HTTP transport")?;
    let tokenizer = TiktokenCounter::for_model(&config.registry.model_name)
        .with_context(|| format!("No tokenizer for model {}", config.registry.model_name))?;

    PluginRegistry::install_and_activate(
        &config.registry,
        Arc::new(loader),
        Arc::new(tokenizer),
        Arc::new(transport),
        urls.iter().map(String::as_str),
    )
    .context("Failed to install plugins")
}
