//! URL normalization and cache key construction.
//!
//! Two requests for the same page must land on the same cache key, so every
//! key is built from a [`NormalizedUrl`]. Normalization:
//!
//! - lower-cases the scheme and host
//! - drops default ports (`:80` for http, `:443` for https) and the fragment
//! - strips trailing slashes from the path
//! - keeps only allow-listed query parameters, sorted by name
//! - assumes `https://` when no scheme is given

use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*)://([^/?#]*)([^?#]*)(?:\?([^#]*))?(?:#.*)?$")
        .expect("URL pattern is valid")
});

static SCHEME_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("scheme pattern is valid"));

static HOST_PORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)(?::(\d*))?$").expect("host pattern is valid"));

/// Length of the hex variant tag derived from structured options.
const VARIANT_HEX_LEN: usize = 16;

// ============================================================================
// NORMALIZED URL
// ============================================================================

/// A URL in canonical form. Only [`UrlNormalizer`] constructs these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    /// Borrow the canonical URL text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalizes raw URLs using a query-parameter allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlNormalizer {
    query_allowlist: BTreeSet<String>,
}

impl UrlNormalizer {
    /// Create a normalizer that keeps only the named query parameters.
    pub fn new<I, S>(query_allowlist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            query_allowlist: query_allowlist.into_iter().map(Into::into).collect(),
        }
    }

    /// Query parameter names that survive normalization.
    pub fn query_allowlist(&self) -> impl Iterator<Item = &str> {
        self.query_allowlist.iter().map(String::as_str)
    }

    /// Normalize a raw URL.
    pub fn normalize(&self, raw: &str) -> Result<NormalizedUrl, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid_url(raw, "URL is empty"));
        }

        let with_scheme = if SCHEME_PREFIX.is_match(trimmed) {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };

        let captures = URL_PATTERN
            .captures(&with_scheme)
            .ok_or_else(|| invalid_url(raw, "URL could not be parsed"))?;

        let scheme = captures[1].to_ascii_lowercase();
        let authority = captures.get(2).map_or("", |m| m.as_str());
        let path = captures.get(3).map_or("", |m| m.as_str());
        let query = captures.get(4).map_or("", |m| m.as_str());

        let authority = normalize_authority(&scheme, authority)
            .ok_or_else(|| invalid_url(raw, "URL has no host"))?;

        let mut normalized = format!("{}://{}{}", scheme, authority, path.trim_end_matches('/'));

        let query = self.filter_query(query);
        if !query.is_empty() {
            normalized.push('?');
            normalized.push_str(&query);
        }

        Ok(NormalizedUrl(normalized))
    }

    fn filter_query(&self, query: &str) -> String {
        if self.query_allowlist.is_empty() || query.is_empty() {
            return String::new();
        }

        let mut kept: Vec<(String, &str)> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let raw_name = pair.split('=').next().unwrap_or(pair);
                let name = urlencoding::decode(raw_name)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| raw_name.to_string());
                self.query_allowlist
                    .contains(&name)
                    .then_some((name, pair))
            })
            .collect();

        kept.sort();
        kept.iter()
            .map(|(_, pair)| *pair)
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Lower-case the host, drop a default port. Returns `None` when no host remains.
fn normalize_authority(scheme: &str, authority: &str) -> Option<String> {
    let (userinfo, host_port) = match authority.rfind('@') {
        Some(at) => (Some(&authority[..at]), &authority[at + 1..]),
        None => (None, authority),
    };

    let captures = HOST_PORT.captures(host_port)?;
    let host = captures.get(1).map_or("", |m| m.as_str()).to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }

    let port = captures
        .get(2)
        .map(|m| m.as_str())
        .filter(|port| !port.is_empty())
        .filter(|port| !is_default_port(scheme, port));

    let mut out = String::with_capacity(authority.len());
    if let Some(userinfo) = userinfo {
        out.push_str(userinfo);
        out.push('@');
    }
    out.push_str(&host);
    if let Some(port) = port {
        out.push(':');
        out.push_str(port);
    }
    Some(out)
}

fn is_default_port(scheme: &str, port: &str) -> bool {
    matches!((scheme, port), ("http", "80") | ("https", "443"))
}

fn invalid_url(url: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// CACHE KEY
// ============================================================================

/// Opaque cache key derived from (namespace, normalized URL, optional variant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a URL in a namespace.
    pub fn new(namespace: &str, url: &NormalizedUrl) -> Self {
        Self(format!("{}:{}", namespace, url))
    }

    /// Key for a URL in a namespace, distinguished by a variant tag.
    pub fn with_variant(namespace: &str, url: &NormalizedUrl, variant: &str) -> Self {
        Self(format!("{}:{}#{}", namespace, url, variant))
    }

    /// Key for a URL in a namespace, with a variant hashed from structured options.
    ///
    /// Options that cannot be serialized produce the plain key.
    pub fn for_options<T: Serialize>(namespace: &str, url: &NormalizedUrl, options: &T) -> Self {
        match variant_tag(options) {
            Some(tag) => Self::with_variant(namespace, url, &tag),
            None => Self::new(namespace, url),
        }
    }

    /// Borrow the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Short, stable hash of structured options (first 16 hex chars of SHA-256).
pub fn variant_tag<T: Serialize>(options: &T) -> Option<String> {
    let bytes = serde_json::to_vec(options).ok()?;
    let digest = Sha256::digest(&bytes);
    let mut tag = hex::encode(digest);
    tag.truncate(VARIANT_HEX_LEN);
    Some(tag)
}
