use axum::{
    Extension, Router,
    body::{Body, Bytes},
    extract::RawQuery,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::{debug, error, warn};

use crate::server::{
    error::{AppResult, Error},
    services::{
        RelayServices,
        upstream_services::{ProxyRequest, UpstreamResponse},
    },
    utils::{
        content_utils::{self, ContentEncoding},
        playlist_utils::{self, RewriteContext},
        url_utils::{self, PROXY_PATH},
    },
};

const DEFAULT_PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// `url` and `referer` pulled out of the raw query string. a repeated `url` is the same as a
/// missing one, there is no single target to fetch
#[derive(Debug, Default)]
struct ProxyQuery {
    url: Option<String>,
    referer: Option<String>,
}

impl ProxyQuery {
    fn parse(query: Option<&str>) -> Self {
        let mut urls = Vec::new();
        let mut referer = None;

        for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            match key.as_ref() {
                "url" => urls.push(value.into_owned()),
                "referer" if referer.is_none() && !value.is_empty() => {
                    referer = Some(value.into_owned())
                }
                _ => {}
            }
        }

        let url = if urls.len() == 1 { urls.pop() } else { None };
        Self { url, referer }
    }
}

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new().route(
            PROXY_PATH,
            get(Self::proxy_get).options(Self::proxy_options),
        )
    }

    async fn proxy_get(
        Extension(services): Extension<RelayServices>,
        RawQuery(query): RawQuery,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        let params = ProxyQuery::parse(query.as_deref());
        let target_url = url_utils::validate_target_url(params.url.as_deref())?;

        // a referer that can't be a header value would only blow up inside reqwest later
        let referer = match params.referer {
            Some(referer) if HeaderValue::from_str(&referer).is_err() => {
                return Err(Error::InvalidUrl("referer is not a valid header value".into()));
            }
            referer => referer,
        };

        let request = ProxyRequest {
            target_url,
            referer,
            range: headers.get(header::RANGE).cloned(),
        };
        debug!(
            "Proxying: {} (referer: {:?})",
            request.target_url, request.referer
        );

        let upstream = services.upstream.fetch(&request).await?;

        let is_playlist =
            content_utils::is_playlist(upstream.content_type_str(), &request.target_url);
        debug!(
            "Content-Type: {:?}, Detected as playlist: {}",
            upstream.content_type, is_playlist
        );

        if !is_playlist {
            return Ok(Self::build_media_response(upstream, &services));
        }

        // a slice of a playlist can't be rewritten, relay it as the partial answer it is
        if upstream.status == StatusCode::PARTIAL_CONTENT {
            debug!(
                "Playlist from {} came back partial, relaying without rewrite",
                request.target_url
            );
            return Ok(Self::build_media_response(upstream, &services));
        }

        let content_type = upstream.content_type.clone();
        let bytes = upstream.body.bytes().await?;
        debug!("Read {} playlist bytes", bytes.len());

        match std::str::from_utf8(&bytes) {
            Ok(text) => {
                let ctx = RewriteContext::new(
                    &request.target_url,
                    request.referer.as_deref(),
                    services.endpoint.clone(),
                );
                let processed_body = playlist_utils::rewrite_playlist(text, &ctx);
                debug!(
                    "Processed playlist, response length: {} bytes",
                    processed_body.len()
                );

                Self::build_playlist_response(
                    &processed_body,
                    content_type,
                    &headers,
                    &services,
                )
            }
            Err(e) => {
                // not text after all, hand it over untouched
                warn!(
                    "Playlist from {} is not valid UTF-8 ({}), skipping rewrite",
                    request.target_url, e
                );
                Ok(Self::build_passthrough_response(bytes, content_type, &services))
            }
        }
    }

    async fn proxy_options() -> impl IntoResponse {
        StatusCode::NO_CONTENT
    }

    /// build playlist response with proper headers and optional compression
    fn build_playlist_response(
        processed_body: &str,
        content_type: Option<HeaderValue>,
        headers: &HeaderMap,
        services: &RelayServices,
    ) -> AppResult<Response> {
        let encoding = ContentEncoding::from_accept_encoding(
            headers
                .get(header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );

        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CONTENT_TYPE,
            content_type
                .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_PLAYLIST_CONTENT_TYPE)),
        );
        response_headers.insert(
            header::CACHE_CONTROL,
            services.playlist_cache_control.clone(),
        );
        response_headers.insert(header::VARY, HeaderValue::from_static("accept-encoding"));

        let response_body: Vec<u8> = match encoding.as_header_value() {
            Some(enc_header) => {
                let compressed_body =
                    encoding.compress(processed_body.as_bytes()).map_err(|e| {
                        error!("Failed to compress response with {:?}: {}", encoding, e);
                        Error::InternalServerErrorWithContext(
                            "Failed to compress response".to_string(),
                        )
                    })?;
                debug!(
                    "Compressed playlist with {:?} from {} to {} bytes",
                    encoding,
                    processed_body.len(),
                    compressed_body.len()
                );
                response_headers.insert(
                    header::CONTENT_ENCODING,
                    HeaderValue::from_static(enc_header),
                );
                compressed_body
            }
            None => processed_body.as_bytes().to_vec(),
        };

        Ok((StatusCode::OK, response_headers, response_body).into_response())
    }

    /// playlist that turned out not to be text, relayed like any other binary body
    fn build_passthrough_response(
        bytes: Bytes,
        content_type: Option<HeaderValue>,
        services: &RelayServices,
    ) -> Response {
        let mut response_headers = HeaderMap::new();
        if let Some(content_type) = content_type {
            response_headers.insert(header::CONTENT_TYPE, content_type);
        }
        response_headers.insert(header::CACHE_CONTROL, services.media_cache_control.clone());

        (StatusCode::OK, response_headers, bytes).into_response()
    }

    /// stream binary bodies straight through, the client hanging up drops the upstream stream
    fn build_media_response(upstream: UpstreamResponse, services: &RelayServices) -> Response {
        let mut response_headers = HeaderMap::new();

        let passthrough = [
            (header::CONTENT_TYPE, upstream.content_type),
            (header::CONTENT_LENGTH, upstream.content_length),
            (header::CONTENT_RANGE, upstream.content_range),
            (header::ACCEPT_RANGES, upstream.accept_ranges),
        ];
        for (name, value) in passthrough {
            if let Some(value) = value {
                response_headers.insert(name, value);
            }
        }
        response_headers.insert(header::CACHE_CONTROL, services.media_cache_control.clone());

        debug!("Streaming binary body with status {}", upstream.status);

        let mut response = Response::new(Body::from_stream(upstream.body.into_stream()));
        *response.status_mut() = upstream.status;
        *response.headers_mut() = response_headers;

        response
    }
}
