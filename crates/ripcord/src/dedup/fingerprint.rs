// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{Display, Write as _};
use std::sync::Arc;

use http::Uri;

use crate::{Body, Request};

/// Canonical identity of a request, used as the deduplication key.
///
/// Two requests share a fingerprint when they have the same method, the same normalized target and
/// the same body. Normalization upper-cases the method, lower-cases the scheme and host, drops
/// default ports and fragments, turns an empty path into `/` and sorts the query pairs by name.
/// JSON bodies are written with object keys sorted at every level; other bodies are hex-encoded.
/// Headers are not part of the fingerprint. A target that is not a valid URI is kept as written,
/// enclosed in `<>` and with spaces escaped.
///
/// # Examples
///
/// ```
/// use ripcord::Request;
/// use ripcord::dedup::Fingerprint;
///
/// let a = Fingerprint::of(&Request::get("HTTPS://API.example.com:443/users?b=2&a=1#top"));
/// let b = Fingerprint::of(&Request::get("https://api.example.com/users?a=1&b=2"));
///
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "GET https://api.example.com/users?a=1&b=2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(Arc<str>);

impl Fingerprint {
    /// Computes the fingerprint of `request`.
    #[must_use]
    pub fn of(request: &Request) -> Self {
        let mut key = String::with_capacity(request.target().len() + 16);

        key.push_str(&request.method().as_str().to_ascii_uppercase());
        key.push(' ');
        push_target(&mut key, request.target());

        match request.body_ref() {
            Body::Empty => {}
            Body::Bytes(bytes) if bytes.is_empty() => {}
            Body::Bytes(bytes) => {
                key.push_str(" hex:");
                for byte in bytes {
                    let _ = write!(key, "{byte:02x}");
                }
            }
            Body::Json(value) => {
                key.push_str(" json:");
                push_json(&mut key, value);
            }
        }

        Self(key.into())
    }

    /// Returns the canonical string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn push_target(key: &mut String, target: &str) {
    let target = target.trim();
    let without_fragment = target.split_once('#').map_or(target, |(before, _)| before);

    let Ok(uri) = without_fragment.parse::<Uri>() else {
        push_raw_target(key, without_fragment);
        return;
    };

    if let Some(scheme) = uri.scheme_str() {
        key.push_str(&scheme.to_ascii_lowercase());
        key.push_str("://");
    }

    if let Some(authority) = uri.authority() {
        key.push_str(&authority.host().to_ascii_lowercase());

        if let Some(port) = authority.port_u16()
            && !is_default_port(uri.scheme_str(), port)
        {
            let _ = write!(key, ":{port}");
        }
    }

    let path = uri.path();
    key.push_str(if path.is_empty() { "/" } else { path });

    if let Some(query) = uri.query() {
        let mut pairs: Vec<&str> = query.split('&').filter(|pair| !pair.is_empty()).collect();
        pairs.sort_by_key(|pair| pair.split_once('=').map_or(*pair, |(name, _)| name));

        if !pairs.is_empty() {
            key.push('?');
            key.push_str(&pairs.join("&"));
        }
    }
}

/// Writes a target that is not a URI as `<...>`, escaping the characters a parsed URI never
/// contains so that no raw target can spell out a normalized one or a body suffix.
fn push_raw_target(key: &mut String, target: &str) {
    key.push('<');
    for ch in target.chars() {
        match ch {
            '%' => key.push_str("%25"),
            ' ' => key.push_str("%20"),
            '<' => key.push_str("%3C"),
            '>' => key.push_str("%3E"),
            _ => key.push(ch),
        }
    }
    key.push('>');
}

fn is_default_port(scheme: Option<&str>, port: u16) -> bool {
    match scheme.map(str::to_ascii_lowercase).as_deref() {
        Some("http" | "ws") => port == 80,
        Some("https" | "wss") => port == 443,
        _ => false,
    }
}

fn push_json(key: &mut String, value: &serde_json::Value) {
    match value {
        serde_json::Value::Array(items) => {
            key.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    key.push(',');
                }
                push_json(key, item);
            }
            key.push(']');
        }
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|left, right| left.0.cmp(right.0));

            key.push('{');
            for (index, (name, item)) in entries.into_iter().enumerate() {
                if index > 0 {
                    key.push(',');
                }
                let _ = write!(key, "{}:", serde_json::Value::String(name.clone()));
                push_json(key, item);
            }
            key.push('}');
        }
        scalar => {
            let _ = write!(key, "{scalar}");
        }
    }
}
