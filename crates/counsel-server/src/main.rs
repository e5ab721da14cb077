mod logging;
mod routes;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Context;
use counsel_agent::{OllamaBackend, VertexBackend};
use counsel_core::{
    agent::ModelBackend,
    client::ModelClient,
    config::Config,
    observer::QualityObserver,
    pipeline::{PipelineEvent, ReportPipeline},
    types::CaseType,
    validator::QualityValidator,
};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::logging::BroadcastLayer;
use crate::routes::ServiceStats;

// ── AppState ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<ReportPipeline>,
    pub observer: QualityObserver,
    pub start_time: Instant,
    pub log_tx: broadcast::Sender<String>,
    pub log_ring: Arc<Mutex<VecDeque<String>>>,
    pub pipeline_event_tx: broadcast::Sender<PipelineEvent>,
    pub stats: Mutex<ServiceStats>,
}

impl AppState {
    pub fn with_logs(
        config: Arc<Config>,
        pipeline: ReportPipeline,
        log_tx: broadcast::Sender<String>,
        log_ring: Arc<Mutex<VecDeque<String>>>,
    ) -> Self {
        let pipeline_event_tx = pipeline.event_sender();
        let pipeline = Arc::new(pipeline);
        let plan = Arc::new(pipeline.plan().clone());
        let observer = QualityObserver::new(*pipeline.validator(), plan).with_alerts(pipeline_event_tx.clone());
        Self {
            config,
            pipeline,
            observer,
            start_time: Instant::now(),
            log_tx,
            log_ring,
            pipeline_event_tx,
            stats: Mutex::new(ServiceStats::default()),
        }
    }
}

// ── Start-up ──────────────────────────────────────────────────────────────

fn init_tracing(config: &Config, log_tx: broadcast::Sender<String>, log_ring: Arc<Mutex<VecDeque<String>>>) {
    let default_filter = if config.debug {
        "counsel_server=debug,counsel_core=debug,counsel_agent=debug,tower_http=debug"
    } else {
        "counsel_server=info,counsel_core=info,counsel_agent=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let fmt_layer = if config.log_format == "json" {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(BroadcastLayer { tx: log_tx, ring: log_ring })
        .init();
}

fn build_backend(config: &Config) -> anyhow::Result<Arc<dyn ModelBackend>> {
    let backend: Arc<dyn ModelBackend> = match config.backend.as_str() {
        "ollama" => Arc::new(OllamaBackend::new(&config.ollama_url, &config.model, config.provider_timeout_s)?),
        _ => {
            if config.vertex_access_token.is_empty() {
                warn!("VERTEX_ACCESS_TOKEN is not set; every model call will fail");
            }
            Arc::new(
                VertexBackend::new(
                    &config.project_id,
                    &config.location,
                    &config.model,
                    &config.vertex_access_token,
                    config.provider_timeout_s,
                )?
                .with_api_base(&config.vertex_api_base),
            )
        }
    };
    Ok(backend)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;

    let (log_tx, _) = broadcast::channel::<String>(1024);
    let log_ring = Arc::new(Mutex::new(VecDeque::new()));
    init_tracing(&config, log_tx.clone(), Arc::clone(&log_ring));

    let backend = build_backend(&config)?;
    let client = ModelClient::new(backend, config.retry, config.pricing.clone());
    let registry = Arc::new(counsel_domains::default_registry()?);
    let plan = Arc::new(counsel_domains::plan_for(CaseType::default()));
    let validator = QualityValidator::new(config.quality_threshold);
    let (pipeline, _events) = ReportPipeline::new(client, registry, plan, validator, config.sampling)?;

    info!(
        backend = %config.backend,
        model = %config.model,
        plan = %pipeline.plan().name,
        sections = pipeline.plan().sections.len(),
        personas = pipeline.registry().len(),
        threshold = config.quality_threshold,
        max_attempts = config.retry.max_attempts,
        "report pipeline ready"
    );

    let config = Arc::new(config);
    let addr = format!("{}:{}", config.web_bind, config.web_port);
    let state = Arc::new(AppState::with_logs(Arc::clone(&config), pipeline, log_tx, log_ring));
    let app = routes::router(state);

    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
