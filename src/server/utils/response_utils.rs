use serde_json::Value;

/// longest upstream message we echo back, cloudflare pages can be huge
const MAX_MESSAGE_LEN: usize = 300;

const DEFAULT_SUB_FORMAT: &str = "srt";

/// name used when the provider doesn't send a file_name
pub fn fallback_file_name(sub_format: Option<&str>) -> String {
    let ext = sub_format
        .map(str::trim)
        .filter(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(DEFAULT_SUB_FORMAT);
    format!("subtitle.{}", ext)
}

/// builds `attachment; filename="..."`, adding a utf-8 `filename*` when the name isn't plain ascii
pub fn content_disposition(file_name: &str) -> String {
    // quotes, backslashes and control chars would break out of the quoted string
    let ascii: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_control() => '_',
            c if c.is_ascii() => c,
            _ => '_',
        })
        .collect();

    if file_name.is_ascii() {
        format!("attachment; filename=\"{}\"", ascii)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            ascii,
            urlencoding::encode(file_name)
        )
    }
}

/// pulls a readable message out of an upstream error body
///
/// the provider uses `message`, `errors: [..]` or `error` depending on the endpoint, and anything
/// that isn't json is passed as (trimmed) text
pub fn upstream_message(body: &[u8]) -> String {
    let from_json = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| {
            if let Some(msg) = value.get("message").and_then(Value::as_str) {
                return Some(msg.to_string());
            }
            if let Some(errors) = value.get("errors").and_then(Value::as_array) {
                let joined = errors
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; ");
                if !joined.is_empty() {
                    return Some(joined);
                }
            }
            value.get("error").and_then(Value::as_str).map(str::to_string)
        });

    let message = from_json.unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    if message.is_empty() {
        return "no response body".to_string();
    }

    truncate(message)
}

fn truncate(mut message: String) -> String {
    if message.len() > MAX_MESSAGE_LEN {
        let mut end = MAX_MESSAGE_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
        message.push_str("...");
    }
    message
}
