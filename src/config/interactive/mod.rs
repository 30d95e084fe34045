
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{Config, ConfigError, ProviderConfig, ProviderKind};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Knowledge RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Embedding Backend").bold().yellow());
    eprintln!("Configure the service that turns document fragments into vectors.");
    eprintln!();

    configure_provider(&mut config.provider)?;

    eprintln!();
    eprintln!("{}", style("Retrieval").bold().yellow());
    configure_retrieval(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_provider_connection(&config.provider) {
        eprintln!("{}", style("✓ Embedding backend reachable!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the embedding backend").yellow()
        );
        eprintln!("You can continue, but make sure it is running before ingesting documents.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Backend:").bold().yellow());
    eprintln!("  Kind: {}", style(config.provider.kind.as_str()).cyan());
    eprintln!("  Model: {}", style(&config.provider.model).cyan());
    eprintln!("  Batch Size: {}", style(config.provider.batch_size).cyan());
    eprintln!(
        "  Timeout: {}s",
        style(config.provider.timeout_seconds).cyan()
    );
    if config.provider.kind == ProviderKind::OpenAi {
        eprintln!("  API Key Variable: {}", style(&config.provider.api_key_env).cyan());
    }
    match config.provider.base_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!("  Target Size: {} chars", style(config.chunking.target_chars).cyan());
    eprintln!("  Minimum Size: {} chars", style(config.chunking.min_chars).cyan());

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!("  Strict Ingestion: {}", style(config.retrieval.strict).cyan());
    eprintln!(
        "  Documents: {}",
        style(config.retrieval.documents_dir.display()).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_provider(provider: &mut ProviderConfig) -> Result<()> {
    let kinds: Vec<&str> = ProviderKind::ALL.iter().map(|k| k.as_str()).collect();
    let default_kind = ProviderKind::ALL
        .iter()
        .position(|&k| k == provider.kind)
        .unwrap_or(0);

    let kind_index = Select::new()
        .with_prompt("Embedding backend")
        .default(default_kind)
        .items(&kinds)
        .interact()?;
    provider.kind = ProviderKind::ALL[kind_index];

    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == provider.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Host")
        .default(provider.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = ProviderConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..ProviderConfig::default()
            };
            temp_config.base_url()?;
            Ok(())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Port")
        .default(provider.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(provider.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(provider.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let timeout_seconds: u64 = Input::new()
        .with_prompt("Request timeout in seconds")
        .default(provider.timeout_seconds)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=600).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 1 and 600 seconds")
            }
        })
        .interact_text()?;

    if provider.kind == ProviderKind::OpenAi {
        provider.api_key_env = Input::new()
            .with_prompt("Environment variable holding the API key")
            .default(provider.api_key_env.clone())
            .interact_text()?;
    }

    provider.set_protocol(protocol)?;
    provider.set_host(host)?;
    provider.set_port(port)?;
    provider.set_model(model)?;
    provider.set_batch_size(batch_size)?;
    provider.set_timeout_seconds(timeout_seconds)?;

    Ok(())
}

fn configure_retrieval(config: &mut Config) -> Result<()> {
    config.retrieval.top_k = Input::new()
        .with_prompt("Fragments returned per query")
        .default(config.retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 100")
            }
        })
        .interact_text()?;

    config.retrieval.strict = Confirm::new()
        .with_prompt("Abort ingestion when an embedding batch fails?")
        .default(config.retrieval.strict)
        .interact()?;

    Ok(())
}

fn test_provider_connection(provider: &ProviderConfig) -> bool {
    let path = match provider.kind {
        ProviderKind::Ollama => "/api/version",
        ProviderKind::OpenAi => "/v1/models",
    };
    let Ok(url) = provider.base_url().and_then(|base| {
        base.join(path)
            .map_err(|_| ConfigError::InvalidUrl(path.to_string()))
    }) else {
        return false;
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(url.as_str()).call() {
        Ok(_) => true,
        // an authentication failure still proves the server is there
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
