//! Conclave CLI entry point: dispatches to one of the three long-running
//! processes named in §5 (ingress, heartbeat, worker), plus an operational
//! `migrate` helper, grounded on the teacher's `main.rs` dispatch shape.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use conclave_core::domain::models::Mission;
use conclave_core::domain::ports::llm::{LlmClient, NullLlmClient};
use conclave_core::domain::ports::mirror::{MirrorClient, NullMirrorClient};
use conclave_core::domain::ports::store::Store;
use conclave_core::domain::ports::web::{NullWebClient, WebClient};
use conclave_core::infrastructure::config::ConfigLoader;
use conclave_core::infrastructure::database::{DatabaseConnection, SqliteStore};
use conclave_core::infrastructure::llm::{AnthropicClient, AnthropicClientConfig};
use conclave_core::infrastructure::logging;
use conclave_core::infrastructure::mirror::LinearMirrorClient;
use conclave_core::infrastructure::web::BraveWebClient;
use conclave_core::services::{
    CompletionCascade, DagScheduler, DecompositionEngine, EventSink, ExecutionPipeline, ExternalMirrorSync,
    InboundPoller, ReviewStateMachine,
};
use conclave_core::services::capability_registry;
use conclave_core::services::decomposition_engine::DecomposeInput;

#[derive(Parser)]
#[command(name = "conclave", about = "Durable multi-agent task orchestration core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Directive/message handler (P1): submits a new directive as a mission
    /// and runs the decomposition engine once.
    Ingress {
        #[arg(long)]
        directive: String,
        #[arg(long)]
        project_id: Option<Uuid>,
        #[arg(long)]
        planner_agent_id: Uuid,
    },
    /// Mirror polling + review processing (P2).
    Heartbeat,
    /// DAG scheduler + pipeline executor (P3).
    Worker,
    /// Runs pending SQLite migrations and exits.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load().context("failed to load configuration")?;

    let process_name = match &cli.command {
        Command::Ingress { .. } => "ingress",
        Command::Heartbeat => "heartbeat",
        Command::Worker => "worker",
        Command::Migrate => "migrate",
    };
    let _logger = logging::init(&config.logging, process_name).context("failed to initialize logging")?;

    let database_url = format!("sqlite:{}", config.database.path);
    let db = DatabaseConnection::new(&database_url, config.database.max_connections)
        .await
        .context("failed to connect to database")?;
    db.migrate().await.context("failed to run database migrations")?;

    if matches!(cli.command, Command::Migrate) {
        tracing::info!("migrations applied, exiting");
        return Ok(());
    }

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(db.pool().clone()));
    let llm: Arc<dyn LlmClient> = build_llm_client(&config.llm)?;
    let web: Arc<dyn WebClient> = build_web_client(&config.web)?;
    let mirror: Arc<dyn MirrorClient> = build_mirror_client(&config.mirror)?;

    let events = Arc::new(EventSink::new(store.clone()));
    let mirror_sync = Arc::new(ExternalMirrorSync::new(store.clone(), mirror.clone()));
    let completion_cascade = Arc::new(CompletionCascade::new(store.clone(), events.clone()));

    match cli.command {
        Command::Migrate => unreachable!("handled above"),
        Command::Ingress { directive, project_id, planner_agent_id } => {
            run_ingress(store.clone(), llm.clone(), mirror_sync.clone(), directive, project_id, planner_agent_id).await?;
        }
        Command::Heartbeat => {
            run_heartbeat(
                store.clone(),
                llm.clone(),
                mirror_sync.clone(),
                events.clone(),
                completion_cascade.clone(),
                config.mirror.poll_tick_seconds,
                config.mirror.api_user_id.clone(),
                config.mirror.system_label_id.clone(),
            )
            .await;
        }
        Command::Worker => {
            run_worker(store, llm, web, mirror_sync, events, completion_cascade).await;
        }
    }

    Ok(())
}

fn build_llm_client(config: &conclave_core::infrastructure::config::LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match &config.anthropic_api_key {
        Some(api_key) if !api_key.is_empty() => {
            let client_config = AnthropicClientConfig {
                api_key: api_key.clone(),
                rate_limit_rps: config.rate_limit_rps,
                max_retries: config.max_retries,
                ..AnthropicClientConfig::default()
            };
            let client = AnthropicClient::new(client_config).context("failed to build Anthropic client")?;
            Ok(Arc::new(client))
        }
        _ => {
            tracing::warn!("ANTHROPIC_API_KEY not configured, using null LLM client");
            Ok(Arc::new(NullLlmClient))
        }
    }
}

fn build_web_client(config: &conclave_core::infrastructure::config::WebConfig) -> Result<Arc<dyn WebClient>> {
    match &config.brave_api_key {
        Some(api_key) if !api_key.is_empty() => {
            let client = BraveWebClient::new(api_key.clone()).context("failed to build Brave web client")?;
            Ok(Arc::new(client))
        }
        _ => {
            tracing::warn!("BRAVE_API_KEY not configured, using null web client");
            Ok(Arc::new(NullWebClient))
        }
    }
}

fn build_mirror_client(config: &conclave_core::infrastructure::config::MirrorConfig) -> Result<Arc<dyn MirrorClient>> {
    match (&config.api_key, &config.team_id) {
        (Some(api_key), Some(team_id)) if !api_key.is_empty() && !team_id.is_empty() => {
            let client = LinearMirrorClient::new(api_key.clone(), team_id.clone()).context("failed to build Linear mirror client")?;
            Ok(Arc::new(client))
        }
        _ => {
            tracing::warn!("LINEAR_API_KEY/LINEAR_TEAM_ID not configured, using null mirror client");
            Ok(Arc::new(NullMirrorClient))
        }
    }
}

async fn run_ingress(
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmClient>,
    mirror_sync: Arc<ExternalMirrorSync>,
    directive: String,
    project_id: Option<Uuid>,
    planner_agent_id: Uuid,
) -> Result<()> {
    let phase_at_link = match project_id {
        Some(id) => store.get_project(id).await.context("failed to load project")?.map(|p| p.phase),
        None => None,
    };
    let mission = Mission::new(directive.clone(), project_id, phase_at_link);
    store.create_mission(&mission).await.context("failed to persist mission")?;
    mirror_sync.sync_mission_created(&mission).await;

    let engine = DecompositionEngine::new(store, llm, mirror_sync);
    let input = DecomposeInput { mission_id: mission.id, directive, planner_agent_id };
    let outcome = engine.decompose(input).await.context("decomposition failed")?;
    tracing::info!(mission_id = %mission.id, ?outcome, "directive decomposed");
    Ok(())
}

async fn run_heartbeat(
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmClient>,
    mirror_sync: Arc<ExternalMirrorSync>,
    events: Arc<EventSink>,
    completion_cascade: Arc<CompletionCascade>,
    poll_tick_seconds: u64,
    system_api_user_id: Option<String>,
    system_label_id: Option<String>,
) {
    let inbound_poller = InboundPoller::new(store.clone(), mirror_sync.clone(), events.clone(), system_api_user_id, system_label_id);
    let review_machine = ReviewStateMachine::new(store, llm, mirror_sync, events, completion_cascade);

    let mut ticker = tokio::time::interval(Duration::from_secs(poll_tick_seconds.max(1)));
    loop {
        ticker.tick().await;
        if let Err(err) = inbound_poller.poll_once().await {
            tracing::error!(error = %err, "inbound poll failed");
        }
        if let Err(err) = review_machine.process_next_pending().await {
            tracing::error!(error = %err, "review processing failed");
        }
    }
}

async fn run_worker(
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmClient>,
    web: Arc<dyn WebClient>,
    mirror_sync: Arc<ExternalMirrorSync>,
    events: Arc<EventSink>,
    completion_cascade: Arc<CompletionCascade>,
) {
    let pipeline = Arc::new(ExecutionPipeline::new(store.clone(), llm, web, capability_registry::default_manifest()));
    let scheduler = Arc::new(DagScheduler::new(store, pipeline, mirror_sync, events, completion_cascade));
    scheduler.run_forever().await;
}
