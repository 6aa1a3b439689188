//! Model reply sanitization shared by the planner and summarizer.

use serde::de::DeserializeOwned;

/// Remove a markdown code fence wrapping the whole reply (```` ```json ... ``` ````).
/// Fences inside the text are left alone.
pub fn strip_code_fence(raw: &str) -> &str {
    let raw = raw.trim();
    let Some(after_open) = raw.strip_prefix("```") else {
        return raw;
    };

    let inner = match after_open.rfind("```") {
        Some(end) => &after_open[..end],
        None => after_open,
    };

    // Drop the rest of the opening fence line (a language tag such as `json`).
    match inner.split_once('\n') {
        Some((tag, rest)) if is_fence_tag(tag) => rest.trim(),
        _ => inner.trim(),
    }
}

fn is_fence_tag(tag: &str) -> bool {
    tag.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Decode a JSON object reply, tolerating fences and surrounding prose.
pub fn decode_json_reply<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let body = strip_code_fence(raw);
    let body = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    };
    serde_json::from_str(body)
}

/// Shorten text for log lines.
pub fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
