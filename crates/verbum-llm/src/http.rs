//! Shared HTTP client construction for consistent timeout and TLS configuration.

use std::time::Duration;

/// Build the HTTP client used by the OpenAI-compatible provider.
///
/// Config: 10s connect timeout, rustls TLS, `verbum/{version}` user-agent, redirect limit 10.
/// No request timeout is set here; callers bound each call with their own deadline.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub(crate) fn default_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("verbum/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_client_builds() {
        assert!(default_client().is_ok());
    }
}
