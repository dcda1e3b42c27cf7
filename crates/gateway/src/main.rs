use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::{Parser, Subcommand};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use ds_capabilities::{ChartServiceClient, KeywordSearchClient, OpenAiCompatLlm};
use ds_domain::config::{Config, ConfigSeverity};
use ds_engine::cancel::CancelMap;
use ds_engine::manager::EngineConfig;
use ds_engine::store::RunStore;
use ds_engine::Engine;
use ds_gateway::api;
use ds_gateway::auth::token_hash_from_env;
use ds_gateway::state::AppState;

#[derive(Parser)]
#[command(name = "dossier", about = "Agentic research and content-generation backend")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "dossier.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the gateway server (default).
    Serve,
    /// Validate the config file and exit.
    ConfigValidate,
    /// Print the effective config as TOML and exit.
    ConfigShow,
    /// Print the version and exit.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = load_config(&cli.config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::ConfigValidate) => {
            let config = load_config(&cli.config)?;
            let issues = config.validate();
            for issue in &issues {
                let tag = match issue.severity {
                    ConfigSeverity::Warning => "warning",
                    ConfigSeverity::Error => "error",
                };
                println!("{tag}: {issue}");
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            println!("config ok");
            Ok(())
        }
        Some(Command::ConfigShow) => {
            let config = load_config(&cli.config)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("dossier {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ds_gateway=debug,ds_engine=debug")),
        )
        .init();
}

/// A missing config file is fine — defaults apply. A present-but-broken
/// one is a hard error.
fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no config file; using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("dossier starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Capabilities ─────────────────────────────────────────────────
    let llm = Arc::new(
        OpenAiCompatLlm::from_config(&config.llm)
            .map_err(|e| anyhow::anyhow!("llm client: {e}"))?,
    );
    let search = Arc::new(
        KeywordSearchClient::from_config(&config.search, llm.clone())
            .map_err(|e| anyhow::anyhow!("search client: {e}"))?,
    );
    let chart = Arc::new(
        ChartServiceClient::from_config(&config.chart)
            .map_err(|e| anyhow::anyhow!("chart client: {e}"))?,
    );

    // ── Engine ───────────────────────────────────────────────────────
    let store = Arc::new(
        RunStore::open(&config.storage.state_path, config.runtime.activity_buffer)
            .context("opening run store")?,
    );
    tracing::info!(path = %config.storage.state_path.display(), "run store ready");

    let engine = Arc::new(Engine {
        store,
        llm,
        search,
        chart,
        cancels: Arc::new(CancelMap::new()),
        config: EngineConfig::from_config(&config),
    });

    let state = AppState {
        config: config.clone(),
        engine,
        api_token_hash: token_hash_from_env(&config.server.api_token_env),
    };

    // ── Router ───────────────────────────────────────────────────────
    let origins: Vec<HeaderValue> = config
        .server
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any);

    let app = api::router(state.clone())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("dossier stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
