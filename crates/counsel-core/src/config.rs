use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::agent::Sampling;
use crate::client::{PriceRate, Pricing, RetryPolicy};
use crate::error::ConfigError;
use crate::validator::DEFAULT_THRESHOLD;

/// Full service configuration, read from the process environment over `.env`.
#[derive(Debug, Clone)]
pub struct Config {
    /// "vertex" or "ollama".
    pub backend: String,
    pub model: String,

    // Vertex AI
    pub project_id: String,
    pub location: String,
    pub vertex_access_token: String,
    /// Overrides the regional endpoint (tests, proxies).
    pub vertex_api_base: String,

    // Ollama
    pub ollama_url: String,

    pub sampling: Sampling,
    pub retry: RetryPolicy,
    pub quality_threshold: f64,
    pub pricing: Pricing,

    pub provider_timeout_s: u64,
    pub request_timeout_s: u64,

    // Web
    pub web_bind: String,
    pub web_port: u16,
    pub log_format: String,
    pub debug: bool,
    pub background_quality_check: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: "vertex".into(),
            model: "gemini-2.0-flash".into(),
            project_id: String::new(),
            location: "us-central1".into(),
            vertex_access_token: String::new(),
            vertex_api_base: String::new(),
            ollama_url: "http://127.0.0.1:11434".into(),
            sampling: Sampling::default(),
            retry: RetryPolicy::default(),
            quality_threshold: DEFAULT_THRESHOLD,
            pricing: Pricing::default(),
            provider_timeout_s: 120,
            request_timeout_s: 600,
            web_bind: "0.0.0.0".into(),
            web_port: 8000,
            log_format: "text".into(),
            debug: false,
            background_quality_check: true,
        }
    }
}

pub fn parse_dotenv_file(path: &Path) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(contents) = std::fs::read_to_string(path) else {
        return map;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim().trim_matches('"').trim_matches('\'');
            map.insert(k.trim().to_string(), v.to_string());
        }
    }
    map
}

fn parse_dotenv() -> HashMap<String, String> {
    parse_dotenv_file(Path::new(".env"))
}

fn get(key: &str, vars: &HashMap<String, String>) -> Option<String> {
    vars.get(key).cloned()
}

fn get_str(key: &str, vars: &HashMap<String, String>, default: &str) -> String {
    get(key, vars).unwrap_or_else(|| default.to_string())
}

fn get_bool(key: &str, vars: &HashMap<String, String>, default: bool) -> bool {
    match get(key, vars).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        Some(_) => default,
        None => default,
    }
}

fn get_u32(key: &str, vars: &HashMap<String, String>, default: u32) -> u32 {
    get(key, vars)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_u64(key: &str, vars: &HashMap<String, String>, default: u64) -> u64 {
    get(key, vars)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_u16(key: &str, vars: &HashMap<String, String>, default: u16) -> u16 {
    get(key, vars)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_f32(key: &str, vars: &HashMap<String, String>, default: f32) -> f32 {
    get(key, vars)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Unlike the other numeric keys, a malformed float here is an error:
/// silently falling back would change which sections pass or what a
/// report costs.
fn get_f64_strict(key: &str, vars: &HashMap<String, String>, default: f64) -> Result<f64, ConfigError> {
    match get(key, vars) {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("'{v}' is not a number"),
        }),
    }
}

/// Parses `model=input:output;model=input:output` (USD per 1K tokens).
pub fn parse_pricing_table(raw: &str) -> Result<HashMap<String, PriceRate>, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid { key: "PRICING_TABLE".into(), reason };
    let mut table = HashMap::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (model, rates) = entry
            .split_once('=')
            .ok_or_else(|| invalid(format!("'{entry}' is not model=input:output")))?;
        let (input, output) = rates
            .split_once(':')
            .ok_or_else(|| invalid(format!("'{entry}' is not model=input:output")))?;
        let input_per_1k: f64 = input.trim().parse().map_err(|_| invalid(format!("bad input rate in '{entry}'")))?;
        let output_per_1k: f64 = output.trim().parse().map_err(|_| invalid(format!("bad output rate in '{entry}'")))?;
        table.insert(model.trim().to_string(), PriceRate { input_per_1k, output_per_1k });
    }
    Ok(table)
}

impl Config {
    /// Process environment wins over `.env`.
    pub fn from_env() -> Result<Self> {
        let mut vars = parse_dotenv();
        vars.extend(std::env::vars());
        Ok(Self::from_vars(&vars)?)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let d = Self::default();

        let sampling = Sampling {
            temperature: get_f32("TEMPERATURE", vars, d.sampling.temperature),
            top_p: get_f32("TOP_P", vars, d.sampling.top_p),
            top_k: get_u32("TOP_K", vars, d.sampling.top_k),
            max_output_tokens: get_u32("MAX_OUTPUT_TOKENS", vars, d.sampling.max_output_tokens),
        };
        let retry = RetryPolicy {
            max_attempts: get_u32("MAX_ATTEMPTS", vars, d.retry.max_attempts),
            backoff_base: Duration::from_millis(get_u64("BACKOFF_BASE_MS", vars, 1000)),
        };
        let pricing = Pricing {
            default: PriceRate {
                input_per_1k: get_f64_strict("PRICE_INPUT_PER_1K", vars, d.pricing.default.input_per_1k)?,
                output_per_1k: get_f64_strict("PRICE_OUTPUT_PER_1K", vars, d.pricing.default.output_per_1k)?,
            },
            models: parse_pricing_table(&get_str("PRICING_TABLE", vars, ""))?,
        };

        let config = Config {
            backend: get_str("BACKEND", vars, &d.backend).to_lowercase(),
            model: get_str("MODEL", vars, &d.model),
            project_id: get_str("PROJECT_ID", vars, ""),
            location: get_str("LOCATION", vars, &d.location),
            vertex_access_token: get_str("VERTEX_ACCESS_TOKEN", vars, ""),
            vertex_api_base: get_str("VERTEX_API_BASE", vars, ""),
            ollama_url: get_str("OLLAMA_URL", vars, &d.ollama_url),
            sampling,
            retry,
            quality_threshold: get_f64_strict("QUALITY_THRESHOLD", vars, d.quality_threshold)?,
            pricing,
            provider_timeout_s: get_u64("PROVIDER_TIMEOUT_S", vars, d.provider_timeout_s),
            request_timeout_s: get_u64("REQUEST_TIMEOUT_S", vars, d.request_timeout_s),
            web_bind: get_str("WEB_BIND", vars, &d.web_bind),
            web_port: get_u16("PORT", vars, d.web_port),
            log_format: get_str("LOG_FORMAT", vars, &d.log_format),
            debug: get_bool("DEBUG", vars, d.debug),
            background_quality_check: get_bool("BACKGROUND_QUALITY_CHECK", vars, d.background_quality_check),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, reason: &str| ConfigError::Invalid { key: key.into(), reason: reason.into() };
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(invalid("QUALITY_THRESHOLD", "must be between 0 and 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("MAX_ATTEMPTS", "must be at least 1"));
        }
        match self.backend.as_str() {
            "vertex" if self.project_id.trim().is_empty() => {
                Err(invalid("PROJECT_ID", "required when BACKEND=vertex"))
            }
            "vertex" | "ollama" => Ok(()),
            other => Err(invalid("BACKEND", &format!("unknown backend '{other}'"))),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_s)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_s)
    }
}
