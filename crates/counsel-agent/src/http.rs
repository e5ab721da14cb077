use counsel_core::error::ProviderError;

/// Maps an HTTP status to the retry taxonomy. Rate limits, timeouts and
/// server errors are transient; every other non-success status is fatal.
pub fn classify_status(status: u16, body: &str) -> ProviderError {
    let snippet: String = body.chars().take(300).collect();
    let message = match status {
        401 | 403 => format!("authentication failed ({status}): {snippet}"),
        429 => format!("rate limited ({status}): {snippet}"),
        400 => format!("invalid request ({status}): {snippet}"),
        404 => format!("model or endpoint not found ({status}): {snippet}"),
        _ => format!("provider returned {status}: {snippet}"),
    };
    if status == 408 || status == 429 || (500..600).contains(&status) {
        ProviderError::Transient { message, status: Some(status) }
    } else {
        ProviderError::Fatal { message, status: Some(status) }
    }
}

/// Connection failures and timeouts are worth retrying; a request that
/// could not even be built is not.
pub fn classify_transport(err: &reqwest::Error, timeout_secs: u64) -> ProviderError {
    if err.is_timeout() {
        ProviderError::transient(format!("request timed out after {timeout_secs}s"))
    } else if err.is_builder() {
        ProviderError::fatal(format!("could not build request: {err}"))
    } else {
        ProviderError::transient(format!("request failed: {err}"))
    }
}
