mod auth;
mod cli;
mod doctor;
mod hub;
mod http;
mod orchestrator_client;
mod rpc_server;
mod state;
mod ws;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use sa_domain::config::{Config, ConfigSeverity};

use cli::{Cli, Command, ConfigCommand};
use hub::Hub;
use orchestrator_client::OrchestratorClient;
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
            println!("sa-ingress {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sa_ingress=debug")))
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("ingress starting");

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

    let hub = Arc::new(Hub::new());
    let orchestrator_client = Arc::new(OrchestratorClient::new(
        config.orchestrator_link.host.clone(),
        config.orchestrator_link.rpc_port,
    ));
    tracing::info!(
        host = %config.orchestrator_link.host,
        rpc_port = config.orchestrator_link.rpc_port,
        "orchestrator client ready"
    );

    let state = AppState {
        config: config.clone(),
        hub,
        orchestrator_client,
    };

    // ── Internal RPC listener (PushEvent, dialed by the orchestrator) ──
    let rpc_addr = format!("{}:{}", config.server.host, config.server.ingress_rpc_port);
    {
        let rpc_hub = state.hub.clone();
        let rpc_addr = rpc_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = rpc_server::serve(rpc_hub, &rpc_addr).await {
                tracing::error!(error = %e, "internal rpc listener exited");
            }
        });
    }

    // ── Client-facing HTTP/WebSocket edge ───────────────────────────────
    let cors = build_cors_layer(&config.server.cors_origins);
    let app = http::router().with_state(state).layer(cors);

    let http_addr = format!("{}:{}", config.server.host, config.server.ingress_port);
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("binding to {http_addr}"))?;
    tracing::info!(addr = %http_addr, rpc_addr = %rpc_addr, "ingress listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<axum::http::HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new().allow_origin(allowed).allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any)
}
