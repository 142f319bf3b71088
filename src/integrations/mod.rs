//! Thin clients for the third-party services the display reads from.
//!
//! Every client is blocking (`ureq`); async callers go through
//! [`run_blocking`]. Response shaping lives in pure functions so it can be
//! tested without the network.

pub mod news;
pub mod openai;
pub mod prayer;
pub mod sheets;

use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub fn http_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(BROWSER_USER_AGENT)
        .build()
}

/// Map a `ureq` failure to an upstream error, keeping the status code and a
/// bounded slice of the body for the logs.
pub fn upstream_error(context: &str, err: ureq::Error) -> ServiceError {
    match err {
        ureq::Error::Status(code, response) => {
            let body: String = response
                .into_string()
                .unwrap_or_default()
                .chars()
                .take(300)
                .collect();
            ServiceError::Upstream(format!("{context}: HTTP {code}: {body}"))
        }
        ureq::Error::Transport(t) => ServiceError::Upstream(format!("{context}: {t}")),
    }
}

pub async fn run_blocking<T, F>(f: F) -> ServiceResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Upstream(format!("blocking task failed: {e}")))?
}
