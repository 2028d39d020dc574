//! # Cache Key Normalization
//!
//! Turns a raw request URL (or an explicit path plus parameter set) into a
//! canonical string key, so that semantically equivalent requests hit the
//! same cache entry no matter how the URL was spelled: host case, default
//! ports, duplicate or trailing slashes, and query-parameter order all
//! collapse away.
//!
//! Derivation is pure and deterministic. Malformed-but-present input is
//! never an error: anything that fails URL parsing is used verbatim as the
//! key, which is always safe (at worst it fragments the cache, never
//! corrupts it). Absent input is unrepresentable here - `&str` cannot be
//! null, so the "null input is a contract violation" clause of the original
//! interface is enforced by the type system.

use std::collections::HashMap;
use url::form_urlencoded;
use url::Url;

/// Normalize a possibly-absolute URL or bare path+query into a canonical
/// cache key.
///
/// - scheme and host are lowercased; path and query values keep their case;
/// - default ports (80 for http, 443 for https) are stripped;
/// - runs of slashes in the path collapse to one, a single trailing slash
///   is stripped, and the root path normalizes to an empty path;
/// - query parameters are decoded, re-encoded with stable form-encoding
///   (space as `+`), sorted by name, and joined with `&`;
/// - bare paths stay bare; the empty string normalizes to itself;
/// - input that looks absolute but fails URL parsing is returned unchanged.
pub fn normalize(url_or_path: &str) -> String {
    if url_or_path.is_empty() {
        return String::new();
    }

    if url_or_path.contains("://") {
        match Url::parse(url_or_path) {
            Ok(url) => normalize_absolute(&url),
            // Fallback, not an error: the raw input becomes the key.
            Err(_) => url_or_path.to_string(),
        }
    } else {
        normalize_bare(url_or_path)
    }
}

/// Build a key from a base path plus only the named relevant parameters.
///
/// Used where the caller already knows which parameters affect cacheability;
/// parameters outside `relevant` are ignored even if present on the request.
pub fn key_from_params(
    base_path: &str,
    params: &HashMap<String, String>,
    relevant: &[&str],
) -> String {
    let mut selected: Vec<(&str, &str)> = relevant
        .iter()
        .filter_map(|name| params.get(*name).map(|value| (*name, value.as_str())))
        .collect();
    selected.sort();

    let path = normalize_path(base_path);
    match encode_sorted(selected.iter().map(|(k, v)| (k.to_string(), v.to_string()))) {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    }
}

fn normalize_absolute(url: &Url) -> String {
    // The url crate already lowercases scheme and registered-name hosts and
    // drops the default port for the scheme.
    let mut key = String::new();
    key.push_str(url.scheme());
    key.push_str("://");
    if let Some(host) = url.host_str() {
        key.push_str(&host.to_ascii_lowercase());
    }
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(&normalize_path(url.path()));
    if let Some(query) = encode_sorted(url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned()))) {
        key.push('?');
        key.push_str(&query);
    }
    key
}

fn normalize_bare(input: &str) -> String {
    let (path, query) = match input.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (input, None),
    };

    let mut key = normalize_path(path);
    if let Some(query) = query {
        let pairs = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()));
        if let Some(encoded) = encode_sorted(pairs) {
            key.push('?');
            key.push_str(&encoded);
        }
    }
    key
}

/// Collapse duplicate slashes and strip a single trailing slash. The root
/// path normalizes to the empty string.
fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_was_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !prev_was_slash {
                out.push(c);
            }
            prev_was_slash = true;
        } else {
            out.push(c);
            prev_was_slash = false;
        }
    }
    if out.ends_with('/') {
        out.pop();
    }
    out
}

/// Sort decoded pairs by name and re-encode with stable form-encoding.
/// Returns `None` for an empty parameter set.
fn encode_sorted<I>(pairs: I) -> Option<String>
where
    I: Iterator<Item = (String, String)>,
{
    let mut pairs: Vec<(String, String)> = pairs.collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort();

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in &pairs {
        serializer.append_pair(name, value);
    }
    Some(serializer.finish())
}
