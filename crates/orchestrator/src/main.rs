mod auth;
mod cli;
mod doctor;
mod engine;
mod http;
mod ingress_client;
mod rpc_server;
mod server_tools;
mod state;
mod sweeper;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sha2::{Digest, Sha256};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use sa_domain::config::{Config, ConfigSeverity};
use sa_domain::model::ToolKind;
use sa_domain::policy::DefaultPolicyEvaluator;
use sa_domain::store::{InMemoryStore, Store};

use cli::{Cli, Command, ConfigCommand};
use engine::cancel::CancelMap;
use ingress_client::IngressClient;
use server_tools::ServerToolRegistry;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (mut config, _config_path) = cli::load_config()?;
            config.apply_env_overrides();
            run_server(Arc::new(config)).await
        }
        Some(Command::Doctor) => {
            let (mut config, config_path) = cli::load_config()?;
            config.apply_env_overrides();
            let ok = doctor::run(&config, &config_path).await?;
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (mut config, config_path) = cli::load_config()?;
            config.apply_env_overrides();
            let issues = config.validate();
            let mut ok = true;
            for issue in &issues {
                println!("{issue}");
                if issue.severity == ConfigSeverity::Error {
                    ok = false;
                }
            }
            if ok {
                println!("{config_path}: ok");
            } else {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (mut config, _config_path) = cli::load_config()?;
            config.apply_env_overrides();
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("sa-orchestrator {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing for the `serve` and `doctor` commands.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sa_orchestrator=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("orchestrator starting");

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
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    // ── Persistence + policy + tools ─────────────────────────────────
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let policy = Arc::new(DefaultPolicyEvaluator::with_defaults());
    let server_tools = Arc::new(ServerToolRegistry::with_defaults());
    tracing::info!("store, policy evaluator, and server tool registry ready");

    // Seed the tool registry with the tools named in the literal
    // end-to-end scenarios this design has to satisfy.
    store.register_tool("search.web", ToolKind::Server, 10_000, None);
    store.register_tool("dangerous.command", ToolKind::Server, 10_000, None);
    store.register_tool("payments.transfer", ToolKind::Server, 10_000, None);
    store.register_tool("browser.screenshot", ToolKind::Client, 30_000, None);

    // ── Outbound collaborators ────────────────────────────────────────
    let agent_client = Arc::new(sa_agent_client::AgentClient::new(Duration::from_millis(
        config.timeouts.agent_timeout_ms,
    )));
    let ingress_client = Arc::new(IngressClient::new(
        config.ingress_link.host.clone(),
        config.ingress_link.rpc_port,
    ));
    tracing::info!(
        host = %config.ingress_link.host,
        rpc_port = config.ingress_link.rpc_port,
        "ingress push client ready"
    );

    // ── Auth (read once, hash for constant-time comparison) ──────────
    let api_token_hash = match config.server.api_key.as_deref() {
        Some(key) if !key.is_empty() => {
            tracing::info!("API bearer-token auth enabled");
            Some(Sha256::digest(key.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!("API bearer-token auth DISABLED - set server.api_key (or ORCH_API_KEY) to enable");
            None
        }
    };

    let cancel_tokens = Arc::new(CancelMap::new());

    let state = AppState {
        config: config.clone(),
        store,
        policy,
        server_tools,
        agent_client,
        ingress_client,
        api_token_hash,
        cancel_tokens,
    };

    // ── Timeout sweeper ────────────────────────────────────────────────
    sweeper::spawn(Arc::new(state.clone()));
    tracing::info!(
        tick_ms = config.timeouts.sweeper_tick_ms,
        batch_limit = config.timeouts.sweeper_batch_limit,
        "timeout sweeper started"
    );

    // ── Internal RPC listener (Invoke/SubmitToolResult/SubmitApprovalDecision/CancelRun) ──
    let rpc_addr = format!("{}:{}", config.server.host, config.server.orchestrator_rpc_port);
    {
        let rpc_state = Arc::new(state.clone());
        let rpc_addr = rpc_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = rpc_server::serve(rpc_state, &rpc_addr).await {
                tracing::error!(error = %e, "internal rpc listener exited");
            }
        });
    }

    // ── External HTTP API ──────────────────────────────────────────────
    let cors = build_cors_layer(&config.server.cors_origins);
    let app = http::router(state.clone()).with_state(state).layer(cors);

    let http_addr = format!("{}:{}", config.server.host, config.server.orchestrator_http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("binding to {http_addr}"))?;
    tracing::info!(addr = %http_addr, rpc_addr = %rpc_addr, "orchestrator listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// A literal `"*"` entry means fully permissive CORS; otherwise only the
/// listed origins are allowed.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<axum::http::HeaderValue> =
        origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new().allow_origin(allowed).allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any)
}
