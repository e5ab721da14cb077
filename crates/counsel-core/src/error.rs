use thiserror::Error;

/// Failure reported by a model backend for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Rate limits, network failures, 5xx responses, malformed payloads.
    #[error("transient provider error: {message}")]
    Transient { message: String, status: Option<u16> },
    /// Bad credentials, invalid requests, blocked output. Never retried.
    #[error("fatal provider error: {message}")]
    Fatal { message: String, status: Option<u16> },
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into(), status: None }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal { message: message.into(), status: None }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Fatal { status, .. } => *status,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient { message, .. } | Self::Fatal { message, .. } => message,
        }
    }
}

/// Invalid persona bindings, report plans or settings. Raised at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("section '{section}' references unknown persona '{persona}'")]
    UnknownPersona { section: String, persona: String },
    #[error("persona '{0}' is defined more than once")]
    DuplicatePersona(String),
    #[error("section '{0}' appears more than once in the report plan")]
    DuplicateSection(String),
    #[error("report plan '{0}' has no sections")]
    EmptyPlan(String),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Errors that abort a whole report request.
///
/// Sections that fail the quality gate are degraded in place and never
/// surface here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("invalid case input: {0}")]
    InvalidInput(String),
    #[error("model provider unavailable: {last_error}")]
    ProviderUnavailable { last_error: String },
}
