use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use futures::{Stream, TryStreamExt};
use tokio::time::Instant;
use tracing::{debug, error, warn};
use url::Url;

use crate::{
    config::AppConfig,
    server::error::{AppResult, Error},
};

pub type DynUpstreamService = Arc<dyn UpstreamServiceTrait + Send + Sync>;

/// one inbound relay call, lives as long as the request does
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub target_url: Url,
    pub referer: Option<String>,
    /// forwarded as is so players can seek inside large segments
    pub range: Option<HeaderValue>,
}

/// the parts of the upstream answer the relay cares about
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub content_length: Option<HeaderValue>,
    pub content_range: Option<HeaderValue>,
    pub accept_ranges: Option<HeaderValue>,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    pub fn content_type_str(&self) -> Option<&str> {
        self.content_type.as_ref().and_then(|v| v.to_str().ok())
    }
}

/// body that hasn't been read yet, dropping it cancels the upstream transfer
pub struct UpstreamBody {
    response: reqwest::Response,
    deadline: Instant,
    timeout: Duration,
}

impl UpstreamBody {
    /// whole body in memory, bound by the same deadline as the request that produced it
    pub async fn bytes(self) -> AppResult<Bytes> {
        match tokio::time::timeout_at(self.deadline, self.response.bytes()).await {
            Ok(result) => result.map_err(|e| unreachable_error(&e)),
            Err(_) => Err(deadline_error(self.timeout)),
        }
    }

    /// streamed bodies have no total deadline, only the client's per read timeout
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send {
        self.response.bytes_stream().inspect_err(|e| {
            error!("Upstream body stream failed: {}", e);
        })
    }
}

#[async_trait::async_trait]
pub trait UpstreamServiceTrait {
    /// GET the target with our user-agent, following redirects. non 2xx answers come back
    /// as `UpstreamHttpError`, transport problems as `UpstreamUnreachable`
    async fn fetch(&self, request: &ProxyRequest) -> AppResult<UpstreamResponse>;
}

pub struct UpstreamService {
    http: reqwest::Client,
    /// total budget for headers, and for the body when it gets buffered
    timeout: Duration,
}

impl UpstreamService {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .read_timeout(config.upstream_read_timeout())
            .connect_timeout(config.upstream_connect_timeout())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .context("Failed to build upstream http client")?;

        Ok(Self {
            http,
            timeout: config.upstream_timeout(),
        })
    }
}

fn copy_header(headers: &HeaderMap, name: header::HeaderName) -> Option<HeaderValue> {
    headers.get(name).cloned()
}

fn deadline_error(timeout: Duration) -> Error {
    Error::UpstreamUnreachable(format!("upstream timed out after {}s", timeout.as_secs()))
}

/// reqwest's display hides the interesting part (refused, dns, cert) in the source chain
fn unreachable_error(err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        return Error::UpstreamUnreachable("upstream timed out while reading".to_string());
    }

    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    Error::UpstreamUnreachable(message)
}

#[async_trait::async_trait]
impl UpstreamServiceTrait for UpstreamService {
    async fn fetch(&self, request: &ProxyRequest) -> AppResult<UpstreamResponse> {
        let mut request_builder = self
            .http
            .get(request.target_url.clone())
            .header(header::ACCEPT, "*/*");

        if let Some(ref referer) = request.referer {
            request_builder = request_builder.header(header::REFERER, referer.as_str());
        }

        if let Some(ref range) = request.range {
            request_builder = request_builder.header(header::RANGE, range.clone());
        }

        debug!("Sending request to target: {}", request.target_url);

        let deadline = Instant::now() + self.timeout;
        let target_response = match tokio::time::timeout_at(deadline, request_builder.send()).await
        {
            Ok(result) => result.map_err(|e| {
                error!("Request to {} failed: {}", request.target_url, e);
                unreachable_error(&e)
            })?,
            Err(_) => {
                error!(
                    "Request to {} timed out after {}s",
                    request.target_url,
                    self.timeout.as_secs()
                );
                return Err(deadline_error(self.timeout));
            }
        };

        let status = target_response.status();
        debug!("Received response with status: {}", status);

        if !status.is_success() {
            // the body is usually some cdn error page, dropped unread along with the connection
            warn!(
                "Response from target not successful: {} for {}",
                status, request.target_url
            );
            return Err(Error::UpstreamHttpError(status));
        }

        let headers = target_response.headers();
        let content_type = copy_header(headers, header::CONTENT_TYPE);
        let content_length = copy_header(headers, header::CONTENT_LENGTH);
        let content_range = copy_header(headers, header::CONTENT_RANGE);
        let accept_ranges = copy_header(headers, header::ACCEPT_RANGES);

        Ok(UpstreamResponse {
            status,
            content_type,
            content_length,
            content_range,
            accept_ranges,
            body: UpstreamBody {
                response: target_response,
                deadline,
                timeout: self.timeout,
            },
        })
    }
}
