use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use crate::server::utils::url_utils::{RelayEndpoint, Resolver};

static URI_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"URI="([^"]+)""#).expect("Static regex should compile"));

const BOM: char = '\u{feff}';

/// everything a rewrite needs, built once per playlist
pub struct RewriteContext {
    resolver: Resolver,
    referer: Option<String>,
    endpoint: RelayEndpoint,
}

impl RewriteContext {
    pub fn new(target: &Url, referer: Option<&str>, endpoint: RelayEndpoint) -> Self {
        Self {
            resolver: Resolver::new(target),
            referer: referer.filter(|r| !r.is_empty()).map(str::to_string),
            endpoint,
        }
    }

    /// None means the reference stays exactly as it is
    fn rewrite_reference(&self, reference: &str) -> Option<String> {
        if self.endpoint.is_relay_link(reference) {
            return None;
        }
        let absolute = self.resolver.resolve(reference)?;
        Some(self.endpoint.link(&absolute, self.referer.as_deref()))
    }

    fn rewrite_line<'a>(&self, line: &'a str) -> Cow<'a, str> {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            return Cow::Borrowed(line);
        }

        // directives only get their quoted URI attributes touched, the rest stays put
        if trimmed.starts_with('#') {
            return URI_ATTRIBUTE.replace_all(line, |caps: &Captures| {
                let raw = &caps[1];
                match self.rewrite_reference(raw) {
                    Some(link) => format!("URI=\"{}\"", link),
                    None => caps[0].to_string(),
                }
            });
        }

        match self.rewrite_reference(trimmed) {
            Some(link) => Cow::Owned(link),
            None => Cow::Borrowed(line),
        }
    }
}

/// rewrite every reference in a playlist so it routes back through the relay.
///
/// works line by line on `\n`, a `\r` before it and a leading BOM are kept so unchanged lines
/// come out byte for byte the same
pub fn rewrite_playlist(text: &str, ctx: &RewriteContext) -> String {
    let mut output = String::with_capacity(text.len() + text.len() / 2);

    let body = match text.strip_prefix(BOM) {
        Some(rest) => {
            output.push(BOM);
            rest
        }
        None => text,
    };

    for (i, line) in body.split('\n').enumerate() {
        if i > 0 {
            output.push('\n');
        }

        let (content, carriage_return) = match line.strip_suffix('\r') {
            Some(content) => (content, "\r"),
            None => (line, ""),
        };

        output.push_str(&ctx.rewrite_line(content));
        output.push_str(carriage_return);
    }

    output
}
