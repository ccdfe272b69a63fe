mod routes;
mod state;

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use consensus::{
    AgentId, ConsensusOrchestrator, HttpReportSink, NoopReportSink, PatternAgent, RemoteAgent,
    ReportSink, SessionRegistry, SharedAgent, ValidationConfig,
};

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "validation-gateway")]
#[command(about = "Collaborative multi-agent code validation gateway")]
struct Args {
    /// Address to bind the HTTP/WebSocket listener to
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Optional TOML config; defaults apply when absent
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ValidationConfig::from_file(path)?,
        None => ValidationConfig::default(),
    };
    let config = Arc::new(config);

    let agents = build_manifest(&config)?;
    info!(
        agents = agents.len(),
        quorum = config.quorum,
        timeout_secs = config.agent_timeout_secs,
        "agent manifest assembled"
    );

    let registry = SessionRegistry::new(config.history_cap).shared();
    let orchestrator = ConsensusOrchestrator::new(config.clone(), agents).shared();
    let report_sink = build_report_sink();

    let app_state = AppState::new(config, registry, orchestrator, report_sink);
    let app = routes::configure(app_state);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;

    info!(addr = %args.bind, "validation gateway listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

/// Instantiate one adapter per agent referenced by any configured chain
fn build_manifest(config: &Arc<ValidationConfig>) -> Result<Vec<SharedAgent>> {
    let referenced: BTreeSet<AgentId> = config
        .chains
        .values()
        .flat_map(|chain| chain.agents.iter().copied())
        .collect();

    if config.endpoint.api_key.is_empty() {
        warn!(
            "no VALIDATOR_API_KEY configured; remote agents will fail and \
             validation will fall back to offline results"
        );
    }

    let mut agents: Vec<SharedAgent> = Vec::with_capacity(referenced.len());
    for id in referenced {
        let agent: SharedAgent = match id {
            AgentId::PatternMatcher => Arc::new(PatternAgent::new()),
            remote => Arc::new(
                RemoteAgent::new(remote, config.clone())
                    .map_err(|e| anyhow::anyhow!("failed to build agent {remote}: {e}"))?,
            ),
        };
        agents.push(agent);
    }
    Ok(agents)
}

/// Report sink from environment: HTTP when credentials exist, noop otherwise
fn build_report_sink() -> Arc<dyn ReportSink> {
    match std::env::var("REPORT_API_KEY") {
        Ok(api_key) if !api_key.is_empty() => {
            let endpoint = std::env::var("REPORT_ENDPOINT_URL")
                .unwrap_or_else(|_| "https://api.resend.com/emails".into());
            let sender = std::env::var("REPORT_SENDER")
                .unwrap_or_else(|_| "validation@example.com".into());
            info!(%endpoint, "report delivery enabled");
            Arc::new(HttpReportSink::new(endpoint, api_key, sender))
        }
        _ => Arc::new(NoopReportSink),
    }
}
