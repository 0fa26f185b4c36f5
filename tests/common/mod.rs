//! Shared helpers for the relay integration tests: a fake origin and a request helper.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    http::{HeaderMap, Request, Response, StatusCode, header},
    response::{IntoResponse, Redirect},
    routing::get,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceExt;

use stream_relay::{AppConfig, RelayApplicationServer, services::RelayServices};

pub const MASTER_PLAYLIST: &str = "#EXTM3U\n\
#EXT-X-VERSION:6\n\
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"en\",URI=\"audio/en.m3u8\"\n\
#EXT-X-STREAM-INF:BANDWIDTH=1280000\n\
720p/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=2560000\n\
/abs/1080p.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=640000\n\
https://cdn.example.com/360p.m3u8\n";

pub const MEDIA_PLAYLIST: &str = "#EXTM3U\n\
#EXT-X-TARGETDURATION:4\n\
#EXT-X-MAP:URI=\"init.mp4\"\n\
#EXTINF:4.0,\n\
seg0.ts\n\
#EXTINF:4.0,\n\
../../media/seg.ts\n\
#EXT-X-ENDLIST\n";

/// not valid utf-8, has to survive untouched
pub const SEGMENT: &[u8] = &[0x47, 0x40, 0x11, 0x10, 0x00, 0xff, 0xfe, 0x80, 0x0a, 0x23];

/// streamed by `/trickle.ts`, the whole thing takes about a second and a half
pub const TRICKLE_CHUNKS: [&[u8]; 4] = [b"\x47first", b"\x47second", b"\x47third", b"\x47last"];

/// starts like a playlist but the continuation byte is bogus
pub const BROKEN_PLAYLIST: &[u8] = b"#EXTM3U\nseg\xc3\x28.ts\n";

fn playlist(content_type: Option<&'static str>, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type.parse().unwrap());
    }
    response
}

/// honours single `bytes=a-b` ranges like a cdn would
fn ranged(content_type: &'static str, body: &'static [u8], headers: &HeaderMap) -> Response<Body> {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.split_once('-'))
        .and_then(|(start, end)| Some((start.parse::<usize>().ok()?, end.parse::<usize>().ok()?)));

    match range {
        Some((start, end)) => Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::ACCEPT_RANGES, "bytes")
            .header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end, body.len()),
            )
            .body(Body::from(&body[start..=end]))
            .unwrap(),
        None => Response::builder()
            .header(header::CONTENT_TYPE, content_type)
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::from(body))
            .unwrap(),
    }
}

async fn segment(headers: HeaderMap) -> Response<Body> {
    ranged("video/mp2t", SEGMENT, &headers)
}

async fn ranged_playlist(headers: HeaderMap) -> Response<Body> {
    ranged(
        "application/vnd.apple.mpegurl",
        MEDIA_PLAYLIST.as_bytes(),
        &headers,
    )
}

/// first chunk right away, then one every half second
async fn trickle() -> Response<Body> {
    let chunks = futures::stream::unfold(0usize, |n| async move {
        if n == TRICKLE_CHUNKS.len() {
            return None;
        }
        if n > 0 {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Some((Ok::<_, std::io::Error>(TRICKLE_CHUNKS[n]), n + 1))
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "video/mp2t")
        .body(Body::from_stream(chunks))
        .unwrap()
}

async fn echo(headers: HeaderMap) -> impl IntoResponse {
    let value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "referer": value(header::REFERER),
        "user_agent": value(header::USER_AGENT),
    }))
}

/// start a fake origin on a random local port
pub async fn start_upstream() -> SocketAddr {
    let app = Router::new()
        .route(
            "/live/index.m3u8",
            get(|| async { playlist(Some("application/vnd.apple.mpegurl"), MASTER_PLAYLIST) }),
        )
        .route(
            "/live/720p/index.m3u8",
            get(|| async { playlist(Some("application/x-mpegURL"), MEDIA_PLAYLIST) }),
        )
        .route(
            "/plain/list.m3u8",
            get(|| async { playlist(Some("text/plain; charset=utf-8"), MEDIA_PLAYLIST) }),
        )
        .route(
            "/bare/list.m3u8",
            get(|| async { playlist(None, MEDIA_PLAYLIST) }),
        )
        .route(
            "/broken.m3u8",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
                    BROKEN_PLAYLIST,
                )
            }),
        )
        .route("/media/seg.ts", get(segment))
        .route("/ranged/list.m3u8", get(ranged_playlist))
        .route("/trickle.ts", get(trickle))
        .route("/echo", get(echo))
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, "<html>cdn says no</html>") }),
        )
        .route(
            "/redirect",
            get(|| async { Redirect::temporary("/live/index.m3u8") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "too late"
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// an address nothing listens on
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn relay(config: AppConfig) -> Router {
    let services = RelayServices::new(Arc::new(config)).unwrap();
    RelayApplicationServer::router(services)
}

pub fn proxy_uri(target: &str, referer: Option<&str>) -> String {
    let mut uri = format!("/api/stream-proxy?url={}", urlencoding::encode(target));
    if let Some(referer) = referer {
        uri.push_str("&referer=");
        uri.push_str(&urlencoding::encode(referer));
    }
    uri
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

pub async fn get_uri(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

/// pull `url` and `referer` back out of a relay link
pub fn relayed_target(link: &str) -> (String, Option<String>) {
    let (_, query) = link.split_once('?').expect("relay link has a query");
    let mut url = None;
    let mut referer = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "url" => url = Some(value.into_owned()),
            "referer" => referer = Some(value.into_owned()),
            _ => {}
        }
    }
    (url.expect("relay link carries a url"), referer)
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
