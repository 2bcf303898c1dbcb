//! Endpoint URL canonicalization and cache busting.

/// Query parameter carrying the cache-busting timestamp.
pub const CACHE_BUST_PARAM: &str = "_t";

#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host: {0}")]
    MissingHost(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parse the metadata endpoint.
///
/// The scheme must be spelled out and be http or https; a host is required.
/// Any fragment is dropped since it never reaches the server. The path and
/// query are kept exactly as configured.
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(format!("{trimmed}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(UrlError::UnsupportedScheme(parsed.scheme().to_string()));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(UrlError::MissingHost(trimmed.to_string()));
    }

    parsed.set_fragment(None);
    Ok(parsed)
}

/// Copy of `endpoint` with a unique `_t=<stamp>` query pair appended.
///
/// Existing query pairs are preserved.
pub fn cache_busted(endpoint: &url::Url, stamp: i64) -> url::Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut().append_pair(CACHE_BUST_PARAM, &stamp.to_string());
    url
}
