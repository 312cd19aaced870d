//! HTTP transport
//!
//! Requests go through the [`HttpTransport`] trait so fetch logic can be
//! exercised with in-memory fakes. The production transport wraps a blocking
//! `ureq` agent and is always driven from `spawn_blocking`.

use crate::config::HttpConfig;
use crate::error::{FetchError, SkillsyncError, SkillsyncResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A GET request, optionally conditional on an ETag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub if_none_match: Option<String>,
}

/// Raw response; status classification happens in [`fetch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub body: Vec<u8>,
}

/// Blocking HTTP client
pub trait HttpTransport: Send + Sync {
    /// Perform a GET. Non-2xx statuses are returned, not raised.
    fn get(&self, request: &HttpRequest) -> SkillsyncResult<HttpResponse>;
}

/// Outcome of a (possibly conditional) GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    NotModified,
    Body { data: Vec<u8>, etag: Option<String> },
}

/// Production transport backed by `ureq`
pub struct UreqTransport {
    agent: ureq::Agent,
    auth_token: Option<String>,
    max_body_bytes: u64,
}

impl UreqTransport {
    pub fn new(config: &HttpConfig, auth_token: Option<String>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            auth_token,
            max_body_bytes: config.max_artifact_bytes,
        }
    }
}

impl HttpTransport for UreqTransport {
    fn get(&self, request: &HttpRequest) -> SkillsyncResult<HttpResponse> {
        let network = |reason: String| FetchError::Network {
            url: request.url.clone(),
            reason,
        };

        let mut builder = self.agent.get(request.url.as_str());
        if let Some(etag) = &request.if_none_match {
            builder = builder.header("If-None-Match", etag.as_str());
        }
        if let Some(token) = &self.auth_token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }

        let mut response = builder.call().map_err(|e| network(e.to_string()))?;
        let status = response.status().as_u16();
        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = if (200..300).contains(&status) {
            response
                .body_mut()
                .with_config()
                .limit(self.max_body_bytes)
                .read_to_vec()
                .map_err(|e| network(e.to_string()))?
        } else {
            Vec::new()
        };

        Ok(HttpResponse { status, etag, body })
    }
}

/// GET `url` off the async runtime and classify the status
pub async fn fetch(
    transport: Arc<dyn HttpTransport>,
    url: &str,
    etag: Option<String>,
) -> SkillsyncResult<Fetched> {
    let request = HttpRequest {
        url: url.to_string(),
        if_none_match: etag,
    };
    debug!("GET {}", request.url);

    let response = tokio::task::spawn_blocking(move || transport.get(&request))
        .await
        .map_err(|e| SkillsyncError::Internal(format!("HTTP task failed: {}", e)))??;

    classify(url, response)
}

fn classify(url: &str, response: HttpResponse) -> SkillsyncResult<Fetched> {
    match response.status {
        200..=299 => Ok(Fetched::Body {
            data: response.body,
            etag: response.etag,
        }),
        304 => Ok(Fetched::NotModified),
        401 | 403 => Err(FetchError::Auth(url.to_string()).into()),
        404 | 410 => Err(FetchError::NotFound(url.to_string()).into()),
        status => Err(FetchError::Network {
            url: url.to_string(),
            reason: format!("HTTP {}", status),
        }
        .into()),
    }
}
