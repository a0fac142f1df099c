//! HTTP executor - performs one request attempt per call
//!
//! Retries, conditions and classification live in the step runner; this layer
//! only sends a [`ConcreteRequest`] with a timeout and reports what happened.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{HttpResponse, TransportError};
use crate::chain::{ConcreteRequest, HttpAuthConfig, HttpClientConfig};

/// Sends materialized requests
///
/// Implementations must be cheap to share between concurrent runs. Dropping
/// the returned future abandons the request.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn send(
        &self,
        request: &ConcreteRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// [`HttpExecutor`] backed by a pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    config: HttpClientConfig,
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(config: HttpClientConfig) -> Result<Self, TransportError> {
        let mut client_builder = reqwest::Client::builder().redirect(if config.follow_redirects {
            reqwest::redirect::Policy::default()
        } else {
            reqwest::redirect::Policy::none()
        });

        if !config.validate_ssl {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        if let Some(agent) = &config.user_agent {
            client_builder = client_builder.user_agent(agent.clone());
        }

        let client = client_builder
            .build()
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn from_config(config: &HttpClientConfig) -> Result<Self, TransportError> {
        Self::new(config.clone())
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth {
            Some(HttpAuthConfig::Bearer { token }) => {
                request.header("Authorization", format!("Bearer {}", token))
            }
            Some(HttpAuthConfig::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(HttpAuthConfig::ApiKey { header, key }) => request.header(header, key),
            None => request,
        }
    }

    /// Client-wide headers first, then the step's own headers
    fn merged_headers(&self, request: &ConcreteRequest) -> BTreeMap<String, String> {
        let mut headers: BTreeMap<String, String> = self
            .config
            .headers
            .iter()
            .filter(|(k, _)| {
                !request
                    .headers
                    .keys()
                    .any(|own| own.eq_ignore_ascii_case(k))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.extend(request.headers.clone());
        headers
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(timeout.as_millis() as u64)
    } else if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        TransportError::Connection(error.to_string())
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn send(
        &self,
        request: &ConcreteRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {}", request.url, e)))?;

        let mut builder = self.client.request(method, url).timeout(timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = self.apply_auth(builder);
        for (key, value) in self.merged_headers(request) {
            builder = builder.header(key, value);
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        debug!("Sending {} {}", request.method, request.url);
        let start = Instant::now();

        let response = builder.send().await.map_err(|e| classify(e, timeout))?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.text().await.map_err(|e| classify(e, timeout))?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        debug!(
            "{} {} -> {} ({}ms)",
            request.method, request.url, status, elapsed_ms
        );

        Ok(HttpResponse {
            status,
            headers,
            body,
            elapsed_ms,
        })
    }
}

/// Flatten response headers; repeated names are joined with `, ` and values
/// that are not visible ASCII are dropped
fn collect_headers(map: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in map {
        let Ok(value) = value.to_str() else {
            debug!("Dropping non-ASCII value of response header {}", name);
            continue;
        };
        headers
            .entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    headers
}
