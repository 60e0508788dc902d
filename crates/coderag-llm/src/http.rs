//! Shared HTTP client construction for consistent timeout and TLS configuration.

use std::time::Duration;

/// Create an HTTP client for embedding requests.
///
/// Config: 10s connect timeout, `request_timeout` per request, rustls TLS,
/// `coderag/{version}` user-agent, redirect limit 10.
#[must_use]
pub fn embedding_client(request_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(request_timeout)
        .user_agent(concat!("coderag/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("embedding HTTP client construction must not fail")
}

/// Client with the default 30s request timeout.
#[must_use]
pub fn default_client() -> reqwest::Client {
    embedding_client(Duration::from_secs(30))
}
