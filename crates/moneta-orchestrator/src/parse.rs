//! Lenient parsing of structured LM output.

use serde_json::Value;

/// Parse a JSON object out of LM text. First attempt is a direct parse;
/// the re-parse attempt strips surrounding prose and code fences by
/// taking the outermost brace span.
pub(crate) fn parse_json_lenient(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end])
        .ok()
        .filter(Value::is_object)
}
