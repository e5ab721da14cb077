use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use counsel_core::{
    agent::{GenerateRequest, Generation, ModelBackend, Sampling},
    error::ProviderError,
    types::TokenUsage,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::http::{classify_status, classify_transport};

/// Calls a locally-hosted Ollama model via its native chat API.
///
/// Keeps case material on the local machine. Token usage comes from the
/// prompt and completion eval counts Ollama reports.
pub struct OllamaBackend {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { base_url: base_url.into(), model: model.into(), timeout_secs, client })
    }
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    num_predict: u32,
}

impl From<Sampling> for OllamaOptions {
    fn from(s: Sampling) -> Self {
        Self { temperature: s.temperature, top_p: s.top_p, top_k: s.top_k, num_predict: s.max_output_tokens }
    }
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Deserialize)]
pub(crate) struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

pub(crate) fn parse_chat_response(body: &str) -> Result<Generation, ProviderError> {
    let parsed: OllamaChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::transient(format!("malformed ollama response: {e}")))?;
    if parsed.message.content.trim().is_empty() {
        return Err(ProviderError::transient("ollama returned empty content"));
    }
    Ok(Generation {
        text: parsed.message.content,
        usage: TokenUsage::new(parsed.prompt_eval_count, parsed.eval_count),
    })
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        let body = OllamaChatRequest {
            model: &self.model,
            messages: vec![OllamaMessage { role: "user", content: &request.prompt }],
            stream: false,
            options: request.sampling.into(),
        };

        info!(
            model = %self.model,
            base_url = %self.base_url,
            prompt_len = request.prompt.len(),
            "calling ollama chat API"
        );

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let response = match self.client.post(&url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(model = %self.model, "ollama request failed: {}", e);
                return Err(classify_transport(&e, self.timeout_secs));
            }
        };

        let status = response.status();
        let text = response.text().await.map_err(|e| classify_transport(&e, self.timeout_secs))?;
        if !status.is_success() {
            warn!(model = %self.model, status = %status, "ollama returned non-200: {}", text);
            return Err(classify_status(status.as_u16(), &text));
        }

        let generation = parse_chat_response(&text)?;
        info!(
            model = %self.model,
            output_len = generation.text.len(),
            input_tokens = generation.usage.input,
            output_tokens = generation.usage.output,
            "ollama response received"
        );
        Ok(generation)
    }
}
