use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use tracing::info;

use crate::{
    config::AppConfig,
    server::{
        services::upstream_services::{DynUpstreamService, UpstreamService},
        utils::url_utils::RelayEndpoint,
    },
};

/// everything a relay request needs, cloned into each handler through an Extension.
/// nothing in here is mutated after startup
#[derive(Clone)]
pub struct RelayServices {
    pub upstream: DynUpstreamService,
    pub endpoint: RelayEndpoint,
    pub playlist_cache_control: HeaderValue,
    pub media_cache_control: HeaderValue,
    pub config: Arc<AppConfig>,
}

impl RelayServices {
    pub fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        info!("starting relay services...");

        let upstream = Arc::new(UpstreamService::new(&config)?) as DynUpstreamService;
        Self::with_upstream(config, upstream)
    }

    /// same as `new` but with a custom fetcher
    pub fn with_upstream(
        config: Arc<AppConfig>,
        upstream: DynUpstreamService,
    ) -> anyhow::Result<Self> {
        let playlist_cache_control = HeaderValue::from_str(&config.playlist_cache_control)
            .context("PLAYLIST_CACHE_CONTROL is not a valid header value")?;
        let media_cache_control = HeaderValue::from_str(&config.media_cache_control)
            .context("MEDIA_CACHE_CONTROL is not a valid header value")?;

        let endpoint = RelayEndpoint::new(config.public_base_url.as_deref());
        info!("rewritten playlists will link to {}", endpoint.prefix());

        Ok(Self {
            upstream,
            endpoint,
            playlist_cache_control,
            media_cache_control,
            config,
        })
    }
}
