//! URL, query-string and header assembly.

use url::form_urlencoded::byte_serialize;

/// Join `prefix`, `path` and the query string built from `query`.
pub fn build_url(prefix: &str, path: &str, query: &[(String, Option<String>)]) -> String {
    format!("{prefix}{path}{}", build_query_string(query))
}

/// `?k=v&...` with form-escaped values, or an empty string when nothing is
/// left.
///
/// Pairs with a `None` value are dropped. A later pair replaces an earlier
/// one with the same key, keeping the earlier position.
pub fn build_query_string(query: &[(String, Option<String>)]) -> String {
    let merged = merge_pairs(query);
    let encoded: Vec<String> = merged
        .into_iter()
        .filter_map(|(key, value)| {
            value.map(|value| format!("{key}={}", byte_serialize(value.as_bytes()).collect::<String>()))
        })
        .collect();
    if encoded.is_empty() {
        return String::new();
    }
    format!("?{}", encoded.join("&"))
}

/// Headers in order: `Accept`, `Accept-Language`, hook headers, then
/// per-call headers. A later header replaces an earlier one with the same
/// name (case-insensitive).
pub fn build_headers(
    accept: Option<&str>,
    lang: Option<&str>,
    hook_headers: Vec<(String, String)>,
    call_headers: &[(String, String)],
) -> Vec<(String, String)> {
    let base = [("Accept", accept), ("Accept-Language", lang)];
    let mut headers: Vec<(String, String)> = base
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), v.to_string())))
        .collect();
    merge_headers(&mut headers, hook_headers);
    merge_headers(&mut headers, call_headers.iter().cloned());
    headers
}

/// Apply `extra` on top of `headers`: a header with a name already present
/// (case-insensitive) replaces its value in place, others are appended.
pub fn merge_headers(
    headers: &mut Vec<(String, String)>,
    extra: impl IntoIterator<Item = (String, String)>,
) {
    for (name, value) in extra {
        match headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => headers.push((name, value)),
        }
    }
}

fn merge_pairs(pairs: &[(String, Option<String>)]) -> Vec<(String, Option<String>)> {
    let mut merged: Vec<(String, Option<String>)> = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        match merged.iter_mut().find(|(existing, _)| existing == key) {
            Some(slot) => slot.1 = value.clone(),
            None => merged.push((key.clone(), value.clone())),
        }
    }
    merged
}
