//! Canonical request construction.
//!
//! Builds the deterministic byte string that both sides feed into the MAC.
//! Client and server must produce identical bytes for identical requests,
//! so the rules here are deliberately rigid: five fields, newline-joined,
//! in a fixed order, with no escaping.

/// Normalize a request path for signing.
///
/// Collapses repeated slashes and strips a trailing slash (except for the
/// root path `/`). An empty path normalizes to `/`. The query string is
/// *not* part of the path; [`canonical_request`] appends it separately.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len().max(1));
    let mut last_was_slash = false;

    for c in path.chars() {
        if c == '/' {
            if !last_was_slash {
                normalized.push('/');
            }
            last_was_slash = true;
        } else {
            normalized.push(c);
            last_was_slash = false;
        }
    }

    if normalized.is_empty() {
        return "/".to_string();
    }
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Build the canonical byte string for a request.
///
/// The five signed fields are joined with `\n` in this exact order:
///
/// ```text
/// METHOD
/// /normalized/path?query
/// <body bytes, verbatim>
/// <timestamp>
/// <nonce>
/// ```
///
/// The method is upper-cased; the body is included as the exact bytes that
/// were (or will be) transmitted, never a re-serialized form; an empty body
/// contributes an empty field, not a null marker.
///
/// # Example
///
/// ```rust
/// use sigil_auth::auth::canonical::canonical_request;
///
/// let canonical = canonical_request(
///     "post",
///     "/api/search",
///     "",
///     br#"{"query":"test"}"#,
///     1704067200,
///     "b52c22e7a9ad40dd9342b0f1b4a9f283",
/// );
/// assert_eq!(
///     canonical,
///     b"POST\n/api/search\n{\"query\":\"test\"}\n1704067200\nb52c22e7a9ad40dd9342b0f1b4a9f283"
/// );
/// ```
pub fn canonical_request(
    method: &str,
    path: &str,
    query: &str,
    body: &[u8],
    timestamp: i64,
    nonce: &str,
) -> Vec<u8> {
    let mut target = normalize_path(path);
    if !query.is_empty() {
        target.push('?');
        target.push_str(query);
    }

    let method = method.to_ascii_uppercase();
    let timestamp = timestamp.to_string();

    let mut canonical = Vec::with_capacity(
        method.len() + target.len() + body.len() + timestamp.len() + nonce.len() + 4,
    );
    canonical.extend_from_slice(method.as_bytes());
    canonical.push(b'\n');
    canonical.extend_from_slice(target.as_bytes());
    canonical.push(b'\n');
    canonical.extend_from_slice(body);
    canonical.push(b'\n');
    canonical.extend_from_slice(timestamp.as_bytes());
    canonical.push(b'\n');
    canonical.extend_from_slice(nonce.as_bytes());
    canonical
}
