//! Authenticated GET against the REST API.

use anyhow::Context as _;
use bytes::Bytes;
use http::Method;
use http::header::{ACCEPT, AUTHORIZATION};
use realtime::{Config, HttpRequest, Identity, Result, bad_gateway};

/// Fetch `path` relative to the configured `API_URL`.
///
/// # Errors
///
/// Returns [`realtime::Error::BadGateway`] when the transport fails or the
/// API answers with a non-success status.
pub async fn get<P>(path: &str, provider: &P) -> Result<Bytes>
where
    P: Config + HttpRequest + Identity,
{
    let api_url = Config::get(provider, "API_URL").await.context("getting `API_URL`")?;
    let token = Identity::access_token(provider).await.context("getting access token")?;

    let mut builder = http::Request::builder()
        .method(Method::GET)
        .uri(format!("{}{path}", api_url.trim_end_matches('/')))
        .header(ACCEPT, "application/json");
    if !token.is_empty() {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = builder.body(Bytes::new()).context("building api request")?;

    let response = HttpRequest::fetch(provider, request)
        .await
        .map_err(|e| bad_gateway!("request to {} failed: {}", path, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(bad_gateway!("request to {} returned {}", path, status));
    }

    Ok(response.into_body())
}
