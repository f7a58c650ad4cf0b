//! Parsing of structured (JSON) completions.
//!
//! Providers that honour `output_config` return bare JSON. Local models that
//! ignore it often wrap the object in a Markdown code fence, which is stripped
//! before parsing.

use serde::de::DeserializeOwned;

use factbank_types::llm::LlmError;

/// Strip a surrounding Markdown code fence (```json ... ```), if present.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening fence line.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a completion body into `T`.
///
/// Any failure is a structural non-conformance and maps to
/// [`LlmError::Deserialization`].
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let body = strip_code_fence(raw);
    serde_json::from_str(body).map_err(|e| {
        tracing::warn!(
            error = %e,
            content_preview = &body[..floor_char_boundary(body, 200)],
            "Structured response did not match the expected shape"
        );
        LlmError::Deserialization(e.to_string())
    })
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
