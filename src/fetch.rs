//! HTTP transport seam and the conditional fetch flow.
//!
//! Loaders fetch through the [`Transport`] trait so tests can substitute
//! canned responses for the network. [`ReqwestTransport`] is the real
//! implementation; [`FixtureTransport`] replays a scripted sequence of
//! responses.

use std::time::Duration;

use async_trait::async_trait;
use metrics::histogram;
use reqwest::header::HeaderMap;

use crate::error::SyncError;
use crate::revalidate::conditional_headers;
use crate::store::MetaStore;

/// A minimal response view: everything the sync core needs, nothing the
/// wire client is free to change.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

/// One HTTP round trip. Implementations map their own failure modes to
/// [`SyncError::Transport`]; status interpretation happens in
/// [`fetch_conditional`], not here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, url: &str, headers: HeaderMap) -> Result<FetchResponse, SyncError>;
}

/// Production transport backed by a shared `reqwest` client.
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, url: &str, headers: HeaderMap) -> Result<FetchResponse, SyncError> {
        let resp = self
            .client
            .get(url)
            .headers(headers)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SyncError::transport_caused(url, "request failed", e))?;

        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp
            .text()
            .await
            .map_err(|e| SyncError::transport_caused(url, "reading response body", e))?;

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

/// Replays a scripted sequence of responses, one per call, repeating the
/// last one once the script runs out. Lets tests drive a 200-then-304
/// revalidation cycle without a network.
pub struct FixtureTransport {
    responses: std::sync::Mutex<Vec<FetchResponse>>,
    pub requests: std::sync::Mutex<Vec<HeaderMap>>,
}

impl FixtureTransport {
    pub fn new(responses: Vec<FetchResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Single canned 200 response with the given body and headers.
    pub fn ok(body: &str, headers: HeaderMap) -> Self {
        Self::new(vec![FetchResponse {
            status: 200,
            headers,
            body: body.to_string(),
        }])
    }
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn execute(&self, _url: &str, headers: HeaderMap) -> Result<FetchResponse, SyncError> {
        self.requests.lock().expect("requests mutex").push(headers);
        let mut responses = self.responses.lock().expect("responses mutex");
        if responses.len() > 1 {
            Ok(responses.remove(0))
        } else {
            responses
                .first()
                .cloned()
                .ok_or_else(|| SyncError::transport("fixture", "no scripted response"))
        }
    }
}

/// Outcome of a conditional fetch: either the upstream was unchanged, or
/// we have a fresh body.
#[derive(Debug)]
pub enum FetchOutcome {
    NotModified,
    Fetched { body: String, headers: HeaderMap },
}

/// Fetch `url` with conditional headers derived from `meta` and interpret
/// the status.
///
/// Semantics:
/// - 304 with a meta store present yields [`FetchOutcome::NotModified`];
///   stored validators are left untouched. Without a meta store a 304 is
///   treated as an upstream status error, since we never asked for it.
/// - non-2xx yields [`SyncError::HttpStatus`].
/// - an empty body on 200 yields [`SyncError::Validation`] — it usually
///   means a misconfigured source, not an empty one.
///
/// Fresh validators are *not* persisted here: they may only be written
/// once the whole sync completes, so the caller persists the returned
/// response headers via [`crate::revalidate::store_validators`] at the
/// end.
pub async fn fetch_conditional(
    transport: &dyn Transport,
    url: &str,
    base_headers: HeaderMap,
    meta: Option<&dyn MetaStore>,
) -> Result<FetchOutcome, SyncError> {
    let headers = conditional_headers(meta, base_headers);

    let t0 = std::time::Instant::now();
    let resp = transport.execute(url, headers).await?;
    histogram!("sync_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    if resp.status == 304 && meta.is_some() {
        tracing::info!(url, "not modified, skipping");
        return Ok(FetchOutcome::NotModified);
    }

    if !(200..300).contains(&resp.status) {
        return Err(SyncError::http_status(
            url,
            resp.status,
            format!("unexpected status {}", resp.status),
        ));
    }

    if resp.body.is_empty() {
        return Err(SyncError::validation(url, "response body is empty"));
    }

    Ok(FetchOutcome::Fetched {
        body: resp.body,
        headers: resp.headers,
    })
}
