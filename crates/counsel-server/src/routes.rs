use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use counsel_core::{
    error::PipelineError,
    registry::{audit_persona, capabilities, focus_areas},
    types::{CaseInput, Report, ReportValidation},
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};
use tokio_stream::{Stream, StreamExt};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::AppState;

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

/// Unwraps a JSON body, turning any decode failure into a 400.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        warn!(status = rejection.status().as_u16(), "rejected request body: {}", rejection.body_text());
        api_error(StatusCode::BAD_REQUEST, format!("invalid input: {}", rejection.body_text()))
    })
}

// ── Service counters ──────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Serialize)]
pub struct ServiceStats {
    pub analyses: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub degraded_sections: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub total_processing_ms: u64,
}

impl ServiceStats {
    fn record_success(&mut self, report: &Report, elapsed_ms: u64) {
        self.analyses += 1;
        self.succeeded += 1;
        self.degraded_sections += report.metadata.degraded_sections as u64;
        self.total_tokens += report.metadata.total_usage.total();
        self.total_cost += report.metadata.total_cost;
        self.total_processing_ms += elapsed_ms;
    }

    fn record_failure(&mut self, elapsed_ms: u64) {
        self.analyses += 1;
        self.failed += 1;
        self.total_processing_ms += elapsed_ms;
    }

    fn average_processing_ms(&self) -> f64 {
        if self.analyses == 0 {
            0.0
        } else {
            self.total_processing_ms as f64 / self.analyses as f64
        }
    }

    fn success_rate(&self) -> f64 {
        if self.analyses == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.analyses as f64
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────────

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/personas", get(list_personas))
        // Reports
        .route("/analyze", post(analyze))
        .route("/validate", post(validate))
        .route("/metrics", get(get_metrics))
        // Logs and events
        .route("/logs", get(get_logs))
        .route("/logs/stream", get(sse_logs))
        .route("/events", get(sse_events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ──────────────────────────────────────────────────────────────

pub(crate) async fn root() -> Json<Value> {
    Json(json!({
        "service": "counsel",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/status", "/personas", "/analyze", "/validate", "/metrics", "/logs", "/logs/stream", "/events"],
    }))
}

pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "backend": state.config.backend,
        "model": state.pipeline.model(),
    }))
}

pub(crate) async fn get_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let plan = state.pipeline.plan();
    let sections: Vec<Value> = plan
        .ordered()
        .into_iter()
        .map(|s| json!({ "id": s.id, "title": s.title, "persona": s.persona_id }))
        .collect();
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_s": state.start_time.elapsed().as_secs(),
        "backend": state.config.backend,
        "model": state.pipeline.model(),
        "plan": plan.name,
        "sections": sections,
        "personas": state.pipeline.registry().len(),
        "quality_threshold": state.pipeline.validator().threshold(),
        "max_attempts": state.config.retry.max_attempts,
        "background_quality_check": state.config.background_quality_check,
    }))
}

pub(crate) async fn list_personas(State(state): State<Arc<AppState>>) -> Json<Value> {
    let personas: Vec<Value> = state
        .pipeline
        .registry()
        .all()
        .iter()
        .map(|p| {
            let audit = audit_persona(p);
            json!({
                "id": p.id,
                "role": p.role_title,
                "frameworks": p.frameworks,
                "capabilities": capabilities(p),
                "focus_areas": focus_areas(p),
                "min_word_count": p.min_word_count,
                "audit_score": audit.score,
            })
        })
        .collect();
    Json(json!(personas))
}

// Reports

pub(crate) async fn analyze(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CaseInput>, JsonRejection>,
) -> Result<Json<Report>, ApiError> {
    let case = json_body(body)?;
    let started = Instant::now();
    info!(case = %case.case_name, case_type = %case.case_type, "analysis requested");

    let result = tokio::time::timeout(state.config.request_timeout(), state.pipeline.generate_report(&case)).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let report = match result {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            record_failure(&state, elapsed_ms);
            let status = match &e {
                PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                PipelineError::ProviderUnavailable { .. } => StatusCode::BAD_GATEWAY,
                PipelineError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error!(case = %case.case_name, status = status.as_u16(), "analysis failed: {e}");
            return Err(api_error(status, e));
        }
        Err(_) => {
            record_failure(&state, elapsed_ms);
            warn!(case = %case.case_name, elapsed_ms, "analysis timed out");
            return Err(api_error(
                StatusCode::GATEWAY_TIMEOUT,
                format!("analysis exceeded {}s", state.config.request_timeout_s),
            ));
        }
    };

    if let Ok(mut stats) = state.stats.lock() {
        stats.record_success(&report, elapsed_ms);
    }
    if state.config.background_quality_check {
        // Detached: the response does not wait on the re-check.
        let _ = state.observer.spawn_check(report.clone());
    }
    Ok(Json(report))
}

fn record_failure(state: &AppState, elapsed_ms: u64) {
    if let Ok(mut stats) = state.stats.lock() {
        stats.record_failure(elapsed_ms);
    }
}

pub(crate) async fn validate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Report>, JsonRejection>,
) -> Result<Json<ReportValidation>, ApiError> {
    let report = json_body(body)?;
    Ok(Json(state.pipeline.validator().validate_report(&report, state.pipeline.plan())))
}

pub(crate) async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.stats.lock().map(|s| s.clone()).unwrap_or_default();
    Json(json!({
        "analyses": stats.analyses,
        "succeeded": stats.succeeded,
        "failed": stats.failed,
        "success_rate": stats.success_rate(),
        "degraded_sections": stats.degraded_sections,
        "total_tokens": stats.total_tokens,
        "total_cost": stats.total_cost,
        "average_processing_ms": stats.average_processing_ms(),
        "quality": state.observer.metrics(),
    }))
}

// Logs

pub(crate) async fn get_logs(State(state): State<Arc<AppState>>) -> Json<Value> {
    let lines: Vec<Value> = state
        .log_ring
        .lock()
        .map(|ring| ring.iter().filter_map(|l| serde_json::from_str(l).ok()).collect())
        .unwrap_or_default();
    Json(json!(lines))
}

// SSE logs: ring buffer history first, then live lines

pub(crate) async fn sse_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    // Subscribe before snapshotting ring to avoid race
    let live_rx = state.log_tx.subscribe();
    let history: Vec<String> = state
        .log_ring
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .cloned()
        .collect();
    tokio::spawn(async move {
        for line in history {
            if tx.send(line).is_err() {
                return;
            }
        }
        let mut live_rx = live_rx;
        loop {
            match live_rx.recv().await {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });
    let stream = UnboundedReceiverStream::new(rx).map(|data| Ok::<_, Infallible>(Event::default().data(data)));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)).text("ping"))
}

/// Live section lifecycle and quality alerts.
pub(crate) async fn sse_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.pipeline_event_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(event) => {
            let data = serde_json::to_string(&event).ok()?;
            Some(Ok(Event::default().event(event.kind()).data(data)))
        }
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)).text("ping"))
}
