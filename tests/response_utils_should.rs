use subtitle_proxy::server::utils::response_utils::{
    content_disposition, fallback_file_name, upstream_message,
};

#[test]
fn test_plain_file_name() {
    assert_eq!(
        content_disposition("subtitle.srt"),
        "attachment; filename=\"subtitle.srt\""
    );
}

#[test]
fn test_quotes_cannot_escape_the_header() {
    let header = content_disposition("evil\"; filename=\"x.exe");
    assert_eq!(header, "attachment; filename=\"evil_; filename=_x.exe\"");
}

#[test]
fn test_non_ascii_names_get_an_encoded_variant() {
    let header = content_disposition("Amélie.fr.srt");
    assert_eq!(
        header,
        "attachment; filename=\"Am_lie.fr.srt\"; filename*=UTF-8''Am%C3%A9lie.fr.srt"
    );
}

#[test]
fn test_fallback_file_name() {
    assert_eq!(fallback_file_name(Some("srt")), "subtitle.srt");
    assert_eq!(fallback_file_name(Some("webvtt")), "subtitle.webvtt");
    // anything that isn't a plain extension falls back to srt
    assert_eq!(fallback_file_name(Some("../etc")), "subtitle.srt");
    assert_eq!(fallback_file_name(Some("")), "subtitle.srt");
    assert_eq!(fallback_file_name(None), "subtitle.srt");
}

#[test]
fn test_upstream_message_shapes() {
    assert_eq!(
        upstream_message(br#"{"message":"You have downloaded your allowed 5 subtitles"}"#),
        "You have downloaded your allowed 5 subtitles"
    );
    assert_eq!(
        upstream_message(br#"{"errors":["file_id is invalid","try again"]}"#),
        "file_id is invalid; try again"
    );
    assert_eq!(upstream_message(br#"{"error":"forbidden"}"#), "forbidden");
    assert_eq!(upstream_message(b"  Bad Gateway \n"), "Bad Gateway");
    assert_eq!(upstream_message(b""), "no response body");
}

#[test]
fn test_long_messages_are_truncated() {
    let body = "x".repeat(1000);
    let message = upstream_message(body.as_bytes());
    assert_eq!(message.len(), 303);
    assert!(message.ends_with("..."));
}
