use anyhow::{Context, Result, bail};
use chorus_core::{
    AnthropicProvider, ChatProvider, GoogleProvider, OpenAiCompatProvider, OpenAiProvider,
    ProviderKind, ProviderSet, Relay,
};
use chorus_gateway::GatewayServer;
use chorus_store::{ConversationStore, MemoryStore, SqliteStore};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{ChorusConfig, ClaudeApi, StoreBackend};

#[derive(Parser)]
#[command(name = "chorus")]
#[command(version)]
#[command(about = "Chorus - ask OpenAI, Claude and Gemini at once")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration (secrets masked)
    Config,

    /// Run the HTTP gateway
    Serve,

    /// Send a message to every provider
    Ask {
        /// The message to send
        message: String,

        /// Session to continue (a new one is created when omitted)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Continue a session with a single provider
    Continue {
        /// Provider to talk to: openai, claude or gemini
        #[arg(short, long)]
        model: String,

        /// The message to send
        message: String,

        #[arg(short, long, default_value = "default")]
        session: String,
    },

    /// List stored sessions, most recent first
    Sessions,

    /// Delete every provider's history for a session
    Reset {
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG wins unless --debug is given
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Serve => cmd_serve(&cli.config).await,
        Commands::Ask { message, session } => cmd_ask(&cli.config, &message, session).await,
        Commands::Continue {
            model,
            message,
            session,
        } => cmd_continue(&cli.config, &model, &message, &session).await,
        Commands::Sessions => cmd_sessions(&cli.config).await,
        Commands::Reset { session } => cmd_reset(&cli.config, &session).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, config::DEFAULT_CONFIG).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Chorus initialized at {}", config_dir.display());
    println!(
        "Edit {} or export OPENAI_API_KEY, OPENROUTER_API_KEY and GOOGLE_API_KEY.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let mut cfg = ChorusConfig::load(config_path)?;
    for key in [
        &mut cfg.providers.openai.api_key,
        &mut cfg.providers.claude.api_key,
        &mut cfg.providers.gemini.api_key,
    ] {
        *key = config::mask_secret(key);
    }
    println!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

async fn cmd_serve(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ChorusConfig::load(config_path)?;
    let relay = Arc::new(build_relay(&cfg)?);
    let bind = cfg.gateway.socket_addr()?;

    let cancel = CancellationToken::new();
    let mut server = GatewayServer::new(bind, relay).spawn(cancel.clone());

    println!("Chorus listening on http://{}", bind);
    println!("Press Ctrl+C to stop");

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
            server.await.context("gateway task panicked")??;
        }
        // The server only returns on its own if it failed to start or crashed
        result = &mut server => {
            result.context("gateway task panicked")??;
        }
    }

    println!("Chorus stopped.");
    Ok(())
}

async fn cmd_ask(
    config_path: &Option<PathBuf>,
    message: &str,
    session: Option<String>,
) -> Result<()> {
    let cfg = ChorusConfig::load(config_path)?;
    let relay = build_relay(&cfg)?;
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let replies = relay.chat(&session_id, message).await?;

    println!("session: {}", session_id);
    for (provider, reply) in replies.iter() {
        println!("\n── {} ──", provider);
        println!("{}", reply);
    }
    Ok(())
}

async fn cmd_continue(
    config_path: &Option<PathBuf>,
    model: &str,
    message: &str,
    session_id: &str,
) -> Result<()> {
    let provider: ProviderKind = model.parse()?;
    let cfg = ChorusConfig::load(config_path)?;
    let relay = build_relay(&cfg)?;

    let reply = relay.continue_with(session_id, provider, message).await?;
    println!("{}", reply.response);
    Ok(())
}

async fn cmd_sessions(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ChorusConfig::load(config_path)?;
    let store = persistent_store(&cfg)?;

    let sessions = store.list_sessions().await?;
    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }
    for s in sessions {
        println!(
            "{:<38} last active {}  (created {})",
            s.session_id,
            s.last_activity.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
            s.created_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

async fn cmd_reset(config_path: &Option<PathBuf>, session_id: &str) -> Result<()> {
    let cfg = ChorusConfig::load(config_path)?;
    let store = persistent_store(&cfg)?;

    store.clear(session_id).await?;
    println!("Session '{}' reset.", session_id);
    Ok(())
}

fn build_store(cfg: &ChorusConfig) -> Result<Arc<dyn ConversationStore>> {
    match cfg.store.backend {
        StoreBackend::Sqlite => {
            let path = cfg.store.resolved_path();
            let store = SqliteStore::new(&path)
                .with_context(|| format!("Failed to open conversation store at {}", path.display()))?;
            info!("Conversation store: sqlite at {}", path.display());
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            warn!("Conversation store: memory (history is lost on exit)");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Store for commands that act on history outside a running server
fn persistent_store(cfg: &ChorusConfig) -> Result<Arc<dyn ConversationStore>> {
    if cfg.store.backend == StoreBackend::Memory {
        bail!(
            "store backend is \"memory\": history only lives inside `chorus serve`; \
             use the HTTP API or switch [store] backend to \"sqlite\""
        );
    }
    build_store(cfg)
}

fn build_providers(cfg: &ChorusConfig) -> Result<ProviderSet> {
    let p = &cfg.providers;

    let openai: Arc<dyn ChatProvider> = Arc::new(OpenAiProvider::new(
        p.openai.api_key.clone(),
        p.openai.model.clone(),
        p.openai.base_url.clone(),
        p.openai.max_tokens,
    )?);

    let claude: Arc<dyn ChatProvider> = match p.claude.api {
        ClaudeApi::OpenRouter => Arc::new(OpenAiCompatProvider::new(
            "openrouter".to_string(),
            p.claude.api_key.clone(),
            p.claude.model(),
            p.claude.base_url(),
            p.claude.max_tokens,
        )?),
        ClaudeApi::Anthropic => Arc::new(AnthropicProvider::new(
            p.claude.api_key.clone(),
            p.claude.model(),
            p.claude.base_url(),
            p.claude.max_tokens,
        )?),
    };

    let gemini: Arc<dyn ChatProvider> = Arc::new(
        GoogleProvider::new(
            p.gemini.api_key.clone(),
            p.gemini.model.clone(),
            p.gemini.max_tokens,
        )?
        .with_base_url(p.gemini.base_url.clone()),
    );

    for (kind, key) in [
        (ProviderKind::OpenAi, &p.openai.api_key),
        (ProviderKind::Claude, &p.claude.api_key),
        (ProviderKind::Gemini, &p.gemini.api_key),
    ] {
        if key.is_empty() {
            warn!("No API key for {}; its replies will be errors", kind);
        }
    }

    Ok(ProviderSet {
        openai,
        claude,
        gemini,
    })
}

fn build_relay(cfg: &ChorusConfig) -> Result<Relay> {
    let store = build_store(cfg)?;
    let providers = build_providers(cfg)?;
    let relay = Relay::new(store, providers, cfg.relay.to_relay_config());
    for p in relay.providers() {
        info!("{} -> {} ({})", p.provider, p.backend, p.model);
    }
    Ok(relay)
}
