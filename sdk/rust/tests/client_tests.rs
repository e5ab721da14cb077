use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use counsel_sdk::{CaseRequest, CounselClient, SdkError};
use serde_json::{json, Value};

// =============================================================================
// Mock service
// =============================================================================

#[derive(Clone, Default)]
struct Seen {
    analyze: Arc<Mutex<Vec<Value>>>,
    validate: Arc<Mutex<Vec<Value>>>,
}

fn report_body(case_name: &str) -> Value {
    json!({
        "case_name": case_name,
        "case_type": "IP",
        "urgency": "high",
        "brief": {"plaintiff": "Acme Corp", "defendant": "Widget Co"},
        "executive_summary": "Executive summary for Acme v. Widget",
        "sections": [
            {
                "section_id": "liability",
                "title": "Liability Assessment",
                "persona_id": "litigator",
                "state": "ACCEPTED",
                "text": "## Liability Assessment\n\nBody",
                "quality": {"coherence": 0.9, "groundedness": 1.0, "completeness": 1.0, "structure": 1.0},
                "overall": 0.97,
                "attempts": 1,
                "usage": {"input_tokens": 100, "output_tokens": 400},
                "cost": 0.000525,
                "latency_ms": 12,
                "degraded_reason": null
            },
            {
                "section_id": "damages",
                "title": "Damages Analysis",
                "persona_id": "analyst",
                "state": "DEGRADED",
                "text": "[DEGRADED SECTION: Damages Analysis] unavailable",
                "quality": {"coherence": 0.1, "groundedness": 0.2, "completeness": 0.1, "structure": 0.0},
                "overall": 0.0,
                "attempts": 3,
                "usage": {"input_tokens": 300, "output_tokens": 90},
                "cost": 0.0001,
                "latency_ms": 40,
                "degraded_reason": "quality below threshold after 3 attempts"
            }
        ],
        "attempts": [],
        "metadata": {
            "model": "gemini-2.0-flash",
            "plan": "ip-litigation",
            "total_usage": {"input_tokens": 400, "output_tokens": 490},
            "total_cost": 0.000625,
            "total_latency_ms": 52,
            "overall_quality": 0.485,
            "degraded_sections": 1,
            "total_attempts": 4,
            "generated_at": "2026-01-01T00:00:00Z"
        }
    })
}

async fn analyze(State(seen): State<Seen>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    seen.analyze.lock().unwrap().push(body.clone());
    let complaint = body["complaint_text"].as_str().unwrap_or_default();
    if complaint.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid input: complaint_text is empty"})));
    }
    (StatusCode::OK, Json(report_body(body["case_name"].as_str().unwrap_or_default())))
}

async fn validate(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
    seen.validate.lock().unwrap().push(body);
    Json(json!({
        "overall": 0.485,
        "passed": false,
        "section_scores": [
            {"section_id": "liability", "title": "Liability Assessment", "overall": 0.97, "passed": true, "degraded": false},
            {"section_id": "damages", "title": "Damages Analysis", "overall": 0.0, "passed": false, "degraded": true}
        ],
        "issues": ["Damages Analysis: degraded"],
        "recommendations": ["Regenerate Damages Analysis"]
    }))
}

async fn serve() -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/health", get(|| async { Json(json!({"status": "ok", "backend": "vertex", "model": "gemini-2.0-flash"})) }))
        .route(
            "/personas",
            get(|| async {
                Json(json!([{
                    "id": "litigator",
                    "role": "Senior IP Litigator",
                    "frameworks": ["claim construction"],
                    "capabilities": ["litigation"],
                    "focus_areas": ["liability"],
                    "min_word_count": 350,
                    "audit_score": 1.0
                }]))
            }),
        )
        .route("/analyze", post(analyze))
        .route("/validate", post(validate))
        .route(
            "/metrics",
            get(|| async {
                Json(json!({
                    "analyses": 2, "succeeded": 1, "failed": 1, "success_rate": 0.5,
                    "degraded_sections": 1, "total_tokens": 890, "total_cost": 0.000625,
                    "average_processing_ms": 26.0, "quality": {"checks": 1}
                }))
            }),
        )
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/"), seen)
}

fn case() -> CaseRequest {
    CaseRequest::new("Acme v. Widget", "Acme Corp alleges patent infringement by Widget Co.")
        .urgency("high")
        .context("Prior licensing talks failed in 2024.")
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_health_and_personas() {
    let (url, _) = serve().await;
    let client = CounselClient::new(url).unwrap();

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.model, "gemini-2.0-flash");

    let personas = client.personas().await.unwrap();
    assert_eq!(personas.len(), 1);
    assert_eq!(personas[0].id, "litigator");
    assert_eq!(personas[0].min_word_count, 350);
}

#[tokio::test]
async fn test_analyze_sends_case_and_decodes_report() {
    let (url, seen) = serve().await;
    let client = CounselClient::new(url).unwrap();

    let report = client.analyze(&case()).await.unwrap();
    assert_eq!(report.case_name, "Acme v. Widget");
    assert_eq!(report.sections.len(), 2);
    assert!(!report.sections[0].is_degraded());
    assert!(report.sections[1].is_degraded());
    assert_eq!(report.metadata.degraded_sections, 1);
    assert_eq!(report.metadata.total_attempts, 4);

    let sent = seen.analyze.lock().unwrap()[0].clone();
    assert_eq!(sent["case_type"], "IP");
    assert_eq!(sent["urgency"], "high");
    assert_eq!(sent["additional_context"], "Prior licensing talks failed in 2024.");
}

#[tokio::test]
async fn test_additional_context_omitted_when_unset() {
    let (url, seen) = serve().await;
    let client = CounselClient::new(url).unwrap();

    client.analyze(&CaseRequest::new("Acme", "Patent claim dispute.")).await.unwrap();
    let sent = seen.analyze.lock().unwrap()[0].clone();
    assert!(sent.get("additional_context").is_none());
    assert_eq!(sent["urgency"], "medium");
}

#[tokio::test]
async fn test_validate_posts_full_report_back() {
    let (url, seen) = serve().await;
    let client = CounselClient::new(url).unwrap();

    let report = client.analyze(&case()).await.unwrap();
    let validation = client.validate(&report).await.unwrap();
    assert!(!validation.passed);
    assert!(validation.section_scores[1].degraded);
    assert_eq!(validation.recommendations, vec!["Regenerate Damages Analysis"]);

    // Fields the typed view drops still reach the server.
    let posted = seen.validate.lock().unwrap()[0].clone();
    assert_eq!(posted["brief"]["plaintiff"], "Acme Corp");
    assert_eq!(posted["metadata"]["generated_at"], "2026-01-01T00:00:00Z");
}

#[tokio::test]
async fn test_error_status_carries_server_message() {
    let (url, _) = serve().await;
    let client = CounselClient::new(url).unwrap();

    let err = client.analyze(&CaseRequest::new("Acme", "  ")).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    match err {
        SdkError::Api { message, .. } => assert!(message.contains("complaint_text")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_metrics_decode() {
    let (url, _) = serve().await;
    let client = CounselClient::new(url).unwrap();

    let metrics = client.metrics().await.unwrap();
    assert_eq!(metrics.analyses, 2);
    assert_eq!(metrics.success_rate, 0.5);
    assert_eq!(metrics.quality["checks"], 1);
}

#[tokio::test]
async fn test_client_timeout_surfaces_as_http_error() {
    let app = Router::new().route(
        "/health",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"status": "ok", "backend": "ollama", "model": "llama3"}))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let client = CounselClient::with_timeout(format!("http://{addr}"), Duration::from_millis(100)).unwrap();

    let err = client.health().await.unwrap_err();
    assert!(matches!(err, SdkError::Http(ref e) if e.is_timeout()));
}

#[tokio::test]
async fn test_wait_until_healthy_gives_up() {
    let client = CounselClient::with_timeout("http://127.0.0.1:1", Duration::from_millis(200)).unwrap();
    let err = client.wait_until_healthy(2, Duration::from_millis(10)).await.unwrap_err();
    assert!(matches!(err, SdkError::Unavailable(2)));
}
