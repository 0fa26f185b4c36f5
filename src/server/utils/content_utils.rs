use std::io::Write;

use flate2::{Compression, write::GzEncoder};
use url::Url;

/// apple's official type and the older generic one, compared lowercased
const PLAYLIST_MEDIA_TYPES: [&str; 2] = ["application/vnd.apple.mpegurl", "x-mpegurl"];

/// types origins slap on anything, these don't tell us what the body is
const AMBIGUOUS_MEDIA_TYPES: [&str; 4] = [
    "text/plain",
    "application/octet-stream",
    "binary/octet-stream",
    "application/unknown",
];

const PLAYLIST_EXTENSION: &str = ".m3u8";

/// decide whether the upstream body is a playlist that needs rewriting.
///
/// the content type wins when it names a playlist, when it is missing or one of the
/// catch-all types the target path extension has the final say
pub fn is_playlist(content_type: Option<&str>, target: &Url) -> bool {
    let content_type = content_type.map(|v| v.trim().to_ascii_lowercase());

    if content_type
        .as_deref()
        .is_some_and(|ct| PLAYLIST_MEDIA_TYPES.iter().any(|t| ct.contains(t)))
    {
        return true;
    }

    let ambiguous = match content_type.as_deref() {
        None | Some("") => true,
        Some(ct) => {
            let essence = ct.split(';').next().unwrap_or("").trim();
            AMBIGUOUS_MEDIA_TYPES.contains(&essence)
        }
    };

    ambiguous
        && target
            .path()
            .to_ascii_lowercase()
            .ends_with(PLAYLIST_EXTENSION)
}

/// Supported compression encodings for rewritten playlists
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContentEncoding {
    Zstd,
    Gzip,
    None,
}

impl ContentEncoding {
    /// determine the best encoding based on Accept-Encoding header.
    /// apple's player sends "gzip, deflate" or "identity" and it must be respected, and so must
    /// any coding refused with `q=0`. zstd wins over gzip whenever both are acceptable
    pub fn from_accept_encoding(accept_encoding: Option<&str>) -> Self {
        let Some(value) = accept_encoding else {
            return Self::None;
        };

        let accepted: Vec<String> = value
            .split(',')
            .filter_map(|entry| {
                let mut params = entry.split(';');
                let coding = params.next()?.trim().to_ascii_lowercase();
                let quality = params
                    .filter_map(|p| {
                        let (key, value) = p.split_once('=')?;
                        key.trim()
                            .eq_ignore_ascii_case("q")
                            .then(|| value.trim().parse::<f32>().ok())?
                    })
                    .next()
                    .unwrap_or(1.0);
                (!coding.is_empty() && quality > 0.0).then_some(coding)
            })
            .collect();

        if accepted.iter().any(|c| c == "zstd") {
            Self::Zstd
        } else if accepted.iter().any(|c| c == "gzip") {
            Self::Gzip
        } else {
            Self::None
        }
    }

    pub fn as_header_value(&self) -> Option<&'static str> {
        match self {
            Self::Zstd => Some("zstd"),
            Self::Gzip => Some("gzip"),
            Self::None => None,
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Zstd => zstd::encode_all(data, 3),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::None => Ok(data.to_vec()),
        }
    }
}
