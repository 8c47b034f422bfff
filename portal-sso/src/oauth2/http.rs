//! Shared HTTP client for provider calls
//!
//! The token exchange and the profile fetch go through one `reqwest` client
//! with a bounded timeout and redirects disabled. Calls are never retried;
//! an authorization code is single-use at the provider anyway.

use std::time::Duration;

use super::types::OAuthError;

/// Errors from the token-exchange transport
#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    /// Request failed, timed out, or the body could not be read
    #[error("request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Response could not be rebuilt for the oauth2 crate
    #[error("invalid response: {0}")]
    Http(#[from] ::http::Error),
}

/// Build the client used for every provider call
///
/// # Errors
///
/// Returns error if the TLS backend cannot be initialised
pub fn build_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client, OAuthError> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(|e| OAuthError::InvalidConfig(format!("failed to build HTTP client: {e}")))
}

/// Perform an `oauth2` request with `client`
///
/// # Errors
///
/// Returns error if the request fails, times out, or the response body
/// cannot be read
pub async fn execute(
    client: reqwest::Client,
    request: ::oauth2::HttpRequest,
) -> Result<::oauth2::HttpResponse, HttpClientError> {
    let (parts, body) = request.into_parts();

    let response = client
        .request(parts.method, parts.uri.to_string())
        .headers(parts.headers)
        .body(body)
        .send()
        .await?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    let mut builder = ::http::Response::builder().status(status);
    for (name, value) in &headers {
        builder = builder.header(name, value);
    }

    Ok(builder.body(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client() {
        assert!(build_client(Duration::from_secs(10), "portal-sso/test").is_ok());
    }

    #[tokio::test]
    async fn test_execute_unreachable_host_fails() {
        let client = build_client(Duration::from_millis(500), "portal-sso/test").unwrap();
        let request = ::http::Request::builder()
            .method(::http::Method::POST)
            .uri("http://127.0.0.1:1/token")
            .body(Vec::new())
            .unwrap();

        let result = execute(client, request).await;

        assert!(matches!(result, Err(HttpClientError::Reqwest(_))));
    }
}
