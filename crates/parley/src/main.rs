//! Parley agent runner
//!
//! Loads a character, registers every completion backend that has an API key,
//! opens the memory database and runs the selected platform clients until
//! Ctrl-C.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use parley_adaptor_telegram::TelegramClient;
use parley_adaptor_twitter::TwitterClient;
use parley_core::config::{get_env_optional, provider_settings_from_env};
use parley_core::{
    init_logging, load_env, load_env_from_path, AgentRuntime, AgentSettings, Character,
    CompletionGateway, CompletionProvider, Logger, ModelProviderName, RuntimeOpts, Service,
};
use parley_provider_anthropic::AnthropicProvider;
use parley_provider_openai::OpenAICompatibleProvider;
use parley_storage_sql::SqliteMemoryStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Character file (JSON)
    #[arg(short, long)]
    character: PathBuf,

    /// Environment file; `.env` lookup when omitted
    #[arg(short, long)]
    env: Option<PathBuf>,

    /// SQLite database path or URL
    #[arg(short, long, default_value = "parley.db")]
    database: String,

    /// Platform clients to run
    #[arg(long, value_enum, value_delimiter = ',', default_value = "telegram,twitter")]
    clients: Vec<ClientKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ClientKind {
    /// Telegram bot
    Telegram,
    /// Twitter account
    Twitter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging();
    match &cli.env {
        Some(path) => load_env_from_path(path)?,
        None => load_env()?,
    }

    let character = Character::load(&cli.character)
        .with_context(|| format!("loading character {}", cli.character.display()))?;
    let mut settings = AgentSettings::from_env()?;
    if get_env_optional("MODEL_PROVIDER").is_none() {
        if let Some(name) = &character.model_provider {
            settings.model_provider = name.parse()?;
        }
    }

    let logger = Logger::new("parley");
    let system_prompt = settings
        .system_prompt
        .clone()
        .or_else(|| character.system.clone());
    let gateway = build_gateway(&settings, system_prompt, logger.child("gateway"))?;
    resolve_format_provider(&mut settings, &gateway);

    let store = SqliteMemoryStore::new(&cli.database)
        .await
        .with_context(|| format!("opening database {}", cli.database))?;

    let runtime = Arc::new(AgentRuntime::new(RuntimeOpts {
        agent_id: None,
        character,
        settings,
        gateway: Arc::new(gateway),
        store: Arc::new(store),
        logger,
    }));

    let mut services: Vec<Box<dyn Service>> = Vec::new();
    for kind in &cli.clients {
        let service: Box<dyn Service> = match kind {
            ClientKind::Telegram => Box::new(TelegramClient::from_env(runtime.clone())?),
            ClientKind::Twitter => Box::new(TwitterClient::from_env(runtime.clone())?),
        };
        services.push(service);
    }
    if services.is_empty() {
        bail!("no clients selected");
    }

    for service in services.iter_mut() {
        service
            .start()
            .await
            .with_context(|| format!("starting {} client", service.service_type()))?;
    }
    info!(agent = %runtime.character.name, clients = services.len(), "Agent running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");
    runtime.shutdown();

    for service in services.iter_mut() {
        if let Err(e) = service.stop().await {
            error!(client = service.service_type(), error = %e, "Client did not stop cleanly");
        }
    }
    Ok(())
}

/// Register a backend for every provider with an API key in the environment
fn build_gateway(
    settings: &AgentSettings,
    system_prompt: Option<String>,
    logger: Logger,
) -> anyhow::Result<CompletionGateway> {
    let mut gateway = CompletionGateway::new(settings.model_provider, logger)
        .with_system_prompt(system_prompt);

    for provider in ModelProviderName::ALL {
        if get_env_optional(provider.api_key_env()).is_none() {
            continue;
        }
        let provider_settings = provider_settings_from_env(provider);
        let backend: Arc<dyn CompletionProvider> = match provider {
            ModelProviderName::Anthropic => Arc::new(AnthropicProvider::from_env(&provider_settings)?),
            _ => Arc::new(OpenAICompatibleProvider::from_env(provider, &provider_settings)?),
        };
        info!(provider = provider.as_str(), "Registered completion provider");
        gateway = gateway
            .with_provider(provider, backend)
            .with_settings(provider, provider_settings);
    }

    if !gateway.has_provider(settings.model_provider) {
        bail!(
            "default provider {} has no API key, set {}",
            settings.model_provider.as_str(),
            settings.model_provider.api_key_env()
        );
    }
    Ok(gateway)
}

/// Point the format pass at the default provider when its own is unavailable
fn resolve_format_provider(settings: &mut AgentSettings, gateway: &CompletionGateway) {
    if gateway.has_provider(settings.format.provider) {
        return;
    }
    let fallback = gateway.default_provider();
    let model = gateway.settings_for(fallback).large_model;
    warn!(
        format_provider = settings.format.provider.as_str(),
        fallback = fallback.as_str(),
        "Format provider not configured, using the default provider"
    );
    settings.format.provider = fallback;
    settings.format.primary_model = model.clone();
    settings.format.fallback_model = model;
}
