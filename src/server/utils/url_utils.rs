use tracing::{debug, error};
use url::Url;

use crate::server::error::{AppResult, Error};

/// path of the relay endpoint, rewritten playlists point back at it
pub const PROXY_PATH: &str = "/api/stream-proxy";

/// validate the raw `url` parameter before anything touches the network
pub fn validate_target_url(raw: Option<&str>) -> AppResult<Url> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(Error::MissingParameter)?;

    let parsed = Url::parse(raw).map_err(|e| {
        debug!("Rejected target url {}: {}", raw, e);
        Error::InvalidUrl(e.to_string())
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidUrl("missing host".to_string()));
    }

    Ok(parsed)
}

fn has_http_scheme(reference: &str) -> bool {
    let lower = reference
        .get(..8)
        .unwrap_or(reference)
        .to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// the reference frames a playlist reference can be resolved in
pub struct Resolver {
    base_dir: Url,
    origin: Url,
}

impl Resolver {
    /// base directory is the target with query and fragment dropped, cut after the last `/`
    pub fn new(target: &Url) -> Self {
        let mut base_dir = target.clone();
        base_dir.set_query(None);
        base_dir.set_fragment(None);

        let dir_len = base_dir.path().rfind('/').map_or(0, |i| i + 1);
        let dir = base_dir.path()[..dir_len].to_string();
        base_dir.set_path(if dir.is_empty() { "/" } else { &dir });

        let mut origin = base_dir.clone();
        origin.set_path("/");

        Self { base_dir, origin }
    }

    pub fn base_dir(&self) -> &Url {
        &self.base_dir
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// resolve a raw playlist reference into an absolute http(s) url.
    /// returns None for references that must not be relayed (other schemes, garbage)
    pub fn resolve(&self, reference: &str) -> Option<String> {
        if has_http_scheme(reference) {
            return Some(reference.to_string());
        }

        // data:, skd:// and friends are for the player, not for us
        if Url::parse(reference).is_ok() {
            debug!("Leaving non http reference alone: {}", reference);
            return None;
        }

        let resolved = if reference.starts_with("//") {
            self.base_dir.join(reference)
        } else if reference.starts_with('/') {
            self.origin.join(reference)
        } else {
            self.base_dir.join(reference)
        };

        match resolved {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                error!("Failed to resolve: {} - {}", reference, e);
                None
            }
        }
    }
}

/// builds links into this relay and recognises links that already are
#[derive(Clone, Debug)]
pub struct RelayEndpoint {
    prefix: String,
}

impl RelayEndpoint {
    pub fn new(public_base_url: Option<&str>) -> Self {
        let base = public_base_url.unwrap_or("").trim_end_matches('/');
        Self {
            prefix: format!("{}{}", base, PROXY_PATH),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn link(&self, absolute_url: &str, referer: Option<&str>) -> String {
        let mut link = format!("{}?url={}", self.prefix, urlencoding::encode(absolute_url));
        if let Some(referer) = referer {
            link.push_str("&referer=");
            link.push_str(&urlencoding::encode(referer));
        }
        link
    }

    pub fn is_relay_link(&self, reference: &str) -> bool {
        let points_at = |prefix: &str| {
            reference
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('?'))
        };
        points_at(&self.prefix) || points_at(PROXY_PATH)
    }
}

impl Default for RelayEndpoint {
    fn default() -> Self {
        Self::new(None)
    }
}
