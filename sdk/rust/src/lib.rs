//! Async client for the Counsel report service.
//!
//! ```no_run
//! # async fn run() -> Result<(), counsel_sdk::SdkError> {
//! let client = counsel_sdk::CounselClient::new("http://127.0.0.1:8000")?;
//! let case = counsel_sdk::CaseRequest::new("Acme v. Widget", "Acme alleges patent infringement.");
//! let report = client.analyze(&case).await?;
//! println!("{:.2}", report.metadata.overall_quality);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("service not healthy after {0} checks")]
    Unavailable(u32),
}

impl SdkError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRequest {
    pub case_name: String,
    pub complaint_text: String,
    pub case_type: String,
    pub urgency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
}

impl CaseRequest {
    pub fn new(case_name: impl Into<String>, complaint_text: impl Into<String>) -> Self {
        Self {
            case_name: case_name.into(),
            complaint_text: complaint_text.into(),
            case_type: "IP".into(),
            urgency: "medium".into(),
            additional_context: None,
        }
    }

    pub fn case_type(mut self, case_type: impl Into<String>) -> Self {
        self.case_type = case_type.into();
        self
    }

    pub fn urgency(mut self, urgency: impl Into<String>) -> Self {
        self.urgency = urgency.into();
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.additional_context = Some(context.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Health {
    pub status: String,
    pub backend: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PersonaInfo {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    pub min_word_count: usize,
    pub audit_score: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportSection {
    pub section_id: String,
    pub title: String,
    pub persona_id: String,
    /// `ACCEPTED` or `DEGRADED`.
    pub state: String,
    pub text: String,
    pub overall: f64,
    pub attempts: u32,
    #[serde(default)]
    pub degraded_reason: Option<String>,
}

impl ReportSection {
    pub fn is_degraded(&self) -> bool {
        self.state == "DEGRADED"
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportMetadata {
    pub model: String,
    pub plan: String,
    pub overall_quality: f64,
    pub degraded_sections: usize,
    pub total_attempts: usize,
    pub total_cost: f64,
    pub total_latency_ms: u64,
}

/// The parts of a report most callers need. `raw` keeps the full body so
/// it can be sent back to [`CounselClient::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub case_name: String,
    pub executive_summary: String,
    pub sections: Vec<ReportSection>,
    pub metadata: ReportMetadata,
    pub raw: Value,
}

#[derive(Deserialize)]
struct ReportBody {
    case_name: String,
    executive_summary: String,
    sections: Vec<ReportSection>,
    metadata: ReportMetadata,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SectionScore {
    pub section_id: String,
    pub title: String,
    pub overall: f64,
    pub passed: bool,
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Validation {
    pub overall: f64,
    pub passed: bool,
    pub section_scores: Vec<SectionScore>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Metrics {
    pub analyses: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub average_processing_ms: f64,
    /// Background quality-check summary, passed through as-is.
    #[serde(default)]
    pub quality: Value,
}

// ── Client ───────────────────────────────────────────────────────────────

pub struct CounselClient {
    base_url: String,
    http: reqwest::Client,
}

impl CounselClient {
    /// Report generation can take minutes, so the default timeout is long.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SdkError> {
        Self::with_timeout(base_url, Duration::from_secs(660))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SdkError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("counsel-sdk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base_url: base_url.into().trim_end_matches('/').to_string(), http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SdkError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
                .unwrap_or(body);
            return Err(SdkError::Api { status: status.as_u16(), message });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SdkError> {
        Self::read(self.http.get(self.url(path)).send().await?).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, SdkError> {
        Self::read(self.http.post(self.url(path)).json(body).send().await?).await
    }

    pub async fn health(&self) -> Result<Health, SdkError> {
        self.get("/health").await
    }

    /// Polls `/health` until it answers, sleeping `interval` between tries.
    pub async fn wait_until_healthy(&self, attempts: u32, interval: Duration) -> Result<Health, SdkError> {
        for attempt in 1..=attempts {
            if let Ok(health) = self.health().await {
                return Ok(health);
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Err(SdkError::Unavailable(attempts))
    }

    pub async fn personas(&self) -> Result<Vec<PersonaInfo>, SdkError> {
        self.get("/personas").await
    }

    pub async fn analyze(&self, case: &CaseRequest) -> Result<Report, SdkError> {
        let raw: Value = self.post("/analyze", case).await?;
        let body: ReportBody = serde_json::from_value(raw.clone())?;
        Ok(Report {
            case_name: body.case_name,
            executive_summary: body.executive_summary,
            sections: body.sections,
            metadata: body.metadata,
            raw,
        })
    }

    pub async fn validate(&self, report: &Report) -> Result<Validation, SdkError> {
        self.post("/validate", &report.raw).await
    }

    pub async fn metrics(&self) -> Result<Metrics, SdkError> {
        self.get("/metrics").await
    }
}
