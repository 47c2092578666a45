use std::time::Duration;

use sfq_core::error::AppError;

const LOCAL_PREFIX: &str = "http://127.0.0.1";

/// Base URL of a model server on this machine. Construction rejects anything but `127.0.0.1`.
#[derive(Debug, Clone)]
pub struct LocalClient {
    base_url: String,
}

impl LocalClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !is_loopback_base(&base_url) {
            return Err(AppError::new(
                "AI_REMOTE_NOT_ALLOWED",
                "Model base URL must be localhost (127.0.0.1)",
            )
            .with_details(format!("base_url={base_url}")));
        }
        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET `path` and require a 200.
    pub fn health_check(&self, path: &str, timeout: Duration) -> Result<(), AppError> {
        let url = self.url(path);
        match ureq::get(&url).timeout(timeout).call() {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(AppError::new("AI_MODEL_UNHEALTHY", "Model server health check failed")
                .with_details(format!("url={url}; status={}", r.status()))),
            Err(e) => Err(AppError::new(
                "AI_MODEL_UNREACHABLE",
                "Failed to reach model server on 127.0.0.1",
            )
            .with_details(format!("url={url}; err={e}"))
            .with_retryable(true)),
        }
    }
}

// Accepts `http://127.0.0.1` with an optional port in 1..=65535 and nothing after it.
fn is_loopback_base(base_url: &str) -> bool {
    match base_url.strip_prefix(LOCAL_PREFIX) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix(':')
            .filter(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
            .and_then(|p| p.parse::<u16>().ok())
            .map_or(false, |port| port != 0),
        None => false,
    }
}
