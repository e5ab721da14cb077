use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use counsel_core::{
    agent::{GenerateRequest, Generation, ModelBackend},
    error::ProviderError,
    types::TokenUsage,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::http::{classify_status, classify_transport};

/// Gemini models on Vertex AI, called through the `generateContent` REST
/// endpoint with a bearer token.
pub struct VertexBackend {
    pub project_id: String,
    pub location: String,
    pub model: String,
    /// Replaces `https://{location}-aiplatform.googleapis.com` when set.
    pub api_base: Option<String>,
    access_token: String,
    pub timeout_secs: u64,
    client: reqwest::Client,
}

impl VertexBackend {
    pub fn new(
        project_id: impl Into<String>,
        location: impl Into<String>,
        model: impl Into<String>,
        access_token: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            project_id: project_id.into(),
            location: location.into(),
            model: model.into(),
            api_base: None,
            access_token: access_token.into(),
            timeout_secs,
            client,
        })
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.api_base = (!base.is_empty()).then_some(base);
        self
    }

    pub fn endpoint(&self) -> String {
        let base = match &self.api_base {
            Some(b) => b.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com", self.location),
        };
        format!(
            "{base}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.project_id, self.location, self.model
        )
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn request_body(request: &GenerateRequest) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        contents: vec![Content { role: "user", parts: vec![Part { text: &request.prompt }] }],
        generation_config: GenerationConfig {
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            top_k: request.sampling.top_k,
            max_output_tokens: request.sampling.max_output_tokens,
        },
    }
}

/// Extracts text and usage from a `generateContent` body. Blocked prompts
/// and safety stops are fatal since resending the same prompt cannot help.
pub fn parse_response(body: &str) -> Result<Generation, ProviderError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::transient(format!("malformed vertex response: {e}")))?;

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::fatal(format!("prompt blocked: {reason}")));
    }
    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return Err(ProviderError::transient("vertex returned no candidates"));
    };
    if let Some(reason) = candidate.finish_reason.as_deref() {
        if matches!(reason, "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT") {
            return Err(ProviderError::fatal(format!("generation stopped: {reason}")));
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ProviderError::transient("vertex returned empty text"));
    }

    let usage = parsed
        .usage_metadata
        .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
        .unwrap_or_default();
    Ok(Generation { text, usage })
}

#[async_trait]
impl ModelBackend for VertexBackend {
    fn name(&self) -> &str {
        "vertex"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        if self.access_token.is_empty() {
            return Err(ProviderError::fatal("no Vertex AI access token configured"));
        }

        info!(
            model = %self.model,
            project = %self.project_id,
            location = %self.location,
            prompt_len = request.prompt.len(),
            "calling vertex generateContent"
        );

        let response = match self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.access_token)
            .json(&request_body(request))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(model = %self.model, "vertex request failed: {}", e);
                return Err(classify_transport(&e, self.timeout_secs));
            }
        };

        let status = response.status();
        let text = response.text().await.map_err(|e| classify_transport(&e, self.timeout_secs))?;
        if !status.is_success() {
            warn!(model = %self.model, status = %status, "vertex returned non-200");
            return Err(classify_status(status.as_u16(), &text));
        }

        let generation = parse_response(&text)?;
        info!(
            model = %self.model,
            output_len = generation.text.len(),
            input_tokens = generation.usage.input,
            output_tokens = generation.usage.output,
            "vertex response received"
        );
        Ok(generation)
    }
}
