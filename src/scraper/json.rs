//! JSON parsing with readable failure messages for API payloads and checkpoints.

use anyhow::Result;

/// Deserialize `body`, reporting failures with the serde path, a readable
/// type mismatch, and a caret under the offending column.
pub fn parse_json_with_context<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let inner = err.inner();
        let (line, column) = (inner.line(), inner.column());
        let path = err.path().to_string();

        let mut msg = String::new();
        if !path.is_empty() && path != "." {
            msg.push_str(&format!("at path '{path}': "));
        }
        msg.push_str(&format!(
            "{} (line {line} col {column})\n{}",
            describe_mismatch(&inner.to_string()),
            snippet(body, line, column, 20)
        ));
        anyhow::anyhow!(msg)
    })
}

/// Turn "invalid type: null, expected a string at line 4 column 2" into
/// "expected a string, got null". Other messages lose only their location.
fn describe_mismatch(msg: &str) -> String {
    let msg = msg.split(" at line ").next().unwrap_or(msg).trim();
    match msg
        .strip_prefix("invalid type: ")
        .and_then(|rest| rest.split_once(", expected "))
    {
        Some((actual, expected)) => format!("expected {expected}, got {actual}"),
        None => msg.to_string(),
    }
}

/// Up to `width` bytes of `line` around the 1-based `column`, with a caret below.
fn snippet(body: &str, line: usize, column: usize, width: usize) -> String {
    let text = body.lines().nth(line.saturating_sub(1)).unwrap_or_default();
    if text.is_empty() {
        return "(empty line)".to_string();
    }

    let at = column.saturating_sub(1);
    let mut end = (at + width / 2).min(text.len());
    let mut start = at.saturating_sub(width / 2).min(end);
    // Scraped bodies are rarely ASCII.
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    while !text.is_char_boundary(end) {
        end += 1;
    }

    let caret = " ".repeat(at.saturating_sub(start));
    format!("...{}...\n   {caret}^", &text[start..end])
}

/// Parse an API payload as an untyped JSON value.
///
/// Aggregator endpoints occasionally answer with an HTML error page and a 200;
/// the error then carries a snippet of the offending body.
pub fn parse_payload(body: &str) -> Result<serde_json::Value> {
    parse_json_with_context(body)
}
