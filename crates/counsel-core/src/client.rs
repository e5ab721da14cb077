use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::agent::{GenerateRequest, Generation, ModelBackend};
use crate::error::ProviderError;
use crate::types::TokenUsage;

// ── Retry policy ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Ceiling on model calls per section, shared by transient retries and
    /// quality retries.
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff_base: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, backoff_base: Duration::ZERO }
    }

    /// Wait before attempt `n`: nothing for the first, then base, 2·base, 4·base…
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(16);
        self.backoff_base.saturating_mul(1u32 << exp)
    }

    pub fn budget(&self) -> AttemptBudget {
        AttemptBudget::new(self.max_attempts)
    }
}

/// Attempts left for one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptBudget {
    used: u32,
    max: u32,
}

impl AttemptBudget {
    pub fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    /// Claims the next attempt number, or `None` once the ceiling is hit.
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.used >= self.max {
            return None;
        }
        self.used += 1;
        Some(self.used)
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

// ── Pricing ──────────────────────────────────────────────────────────────

/// USD per 1 000 tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRate {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl PriceRate {
    pub fn cost(&self, usage: TokenUsage) -> f64 {
        (usage.input as f64 / 1000.0) * self.input_per_1k
            + (usage.output as f64 / 1000.0) * self.output_per_1k
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub default: PriceRate,
    /// Per-model overrides keyed by model id.
    pub models: HashMap<String, PriceRate>,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            default: PriceRate { input_per_1k: 0.00025, output_per_1k: 0.00125 },
            models: HashMap::new(),
        }
    }
}

impl Pricing {
    pub fn rate_for(&self, model: &str) -> PriceRate {
        self.models.get(model).copied().unwrap_or(self.default)
    }

    pub fn cost(&self, model: &str, usage: TokenUsage) -> f64 {
        self.rate_for(model).cost(usage)
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// One provider call and what came back.
#[derive(Debug, Clone)]
pub struct Call {
    pub attempt: u32,
    pub waited: Duration,
    pub latency: Duration,
    pub result: Result<Generation, ProviderError>,
}

/// Every call made for one request. The last call is either the success
/// or the terminal failure.
#[derive(Debug, Clone, Default)]
pub struct ClientOutcome {
    pub calls: Vec<Call>,
}

impl ClientOutcome {
    pub fn generation(&self) -> Option<&Generation> {
        self.calls.last().and_then(|c| c.result.as_ref().ok())
    }

    pub fn last_error(&self) -> Option<&ProviderError> {
        self.calls.last().and_then(|c| c.result.as_ref().err())
    }

    pub fn succeeded(&self) -> bool {
        self.generation().is_some()
    }
}

/// Wraps a backend with transient-error retries, backoff and pricing.
#[derive(Clone)]
pub struct ModelClient {
    backend: Arc<dyn ModelBackend>,
    retry: RetryPolicy,
    pricing: Pricing,
}

impl ModelClient {
    pub fn new(backend: Arc<dyn ModelBackend>, retry: RetryPolicy, pricing: Pricing) -> Self {
        Self { backend, retry, pricing }
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn cost(&self, usage: TokenUsage) -> f64 {
        self.pricing.cost(self.backend.model(), usage)
    }

    /// Calls the backend until it succeeds, fails fatally, or `budget` runs
    /// out. Never returns an error: failures are recorded in the outcome.
    pub async fn generate(&self, request: &GenerateRequest, budget: &mut AttemptBudget) -> ClientOutcome {
        let mut outcome = ClientOutcome::default();
        let begun = Instant::now();
        while let Some(attempt) = budget.next_attempt() {
            let waited = self.retry.delay_before(attempt);
            if !waited.is_zero() {
                debug!(attempt, waited_ms = waited.as_millis() as u64, "backing off before model call");
                tokio::time::sleep(waited).await;
            }

            let started = Instant::now();
            let result = self.backend.generate(request).await;
            let latency = started.elapsed();

            let latency_ms = latency.as_millis() as u64;
            let elapsed_ms = begun.elapsed().as_millis() as u64;
            let stop = match &result {
                Ok(_) => true,
                Err(e) if e.is_transient() => {
                    warn!(
                        attempt,
                        model = self.backend.model(),
                        remaining = budget.remaining(),
                        latency_ms,
                        elapsed_ms,
                        "transient model error: {e}"
                    );
                    false
                }
                Err(e) => {
                    warn!(attempt, model = self.backend.model(), latency_ms, elapsed_ms, "fatal model error: {e}");
                    true
                }
            };
            outcome.calls.push(Call { attempt, waited, latency, result });
            if stop {
                break;
            }
        }
        outcome
    }
}
