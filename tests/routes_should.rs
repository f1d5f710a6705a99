// drives the full router (cors, extractors, services, reqwest client) against an httpmock upstream
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use httpmock::prelude::*;
use serde_json::{Value, json};
use tower::ServiceExt;

use subtitle_proxy::{AppConfig, AppServices, ApplicationServer};

const API_KEY: &str = "test-key";
const ORIGIN: &str = "https://player.example.com";

fn config(server: &MockServer, with_credentials: bool) -> AppConfig {
    AppConfig {
        api_key: API_KEY.to_string(),
        upstream_base_url: server.base_url(),
        username: with_credentials.then(|| "user".to_string()),
        password: with_credentials.then(|| "pass".to_string()),
        user_agent: Some("subtitle-proxy-tests".to_string()),
        login_min_interval_ms: 0,
        ..Default::default()
    }
}

fn app(config: AppConfig) -> Router {
    ApplicationServer::router(AppServices::new(Arc::new(config)))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::ORIGIN, ORIGIN)
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header_str<'a>(response: &'a Response, name: header::HeaderName) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

async fn mock_login(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/login")
                .header("api-key", API_KEY)
                .json_body(json!({ "username": "user", "password": "pass" }));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "token": "tok", "status": 200 }));
        })
        .await
}

#[tokio::test]
async fn answer_options_with_an_empty_204() {
    let server = MockServer::start_async().await;

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/search")
        .header(header::ORIGIN, ORIGIN)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();

    let response = app(config(&server, true)).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN),
        Some("*")
    );
    let methods = header_str(&response, header::ACCESS_CONTROL_ALLOW_METHODS).unwrap_or_default();
    assert!(methods.contains("GET") && methods.contains("POST"));
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn reject_an_empty_search_without_calling_upstream() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(GET).path("/subtitles");
            then.status(200).json_body(json!({ "data": [] }));
        })
        .await;

    let response = app(config(&server, true))
        .oneshot(get("/search?query="))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "bad_request");
    assert!(body["message"].as_str().unwrap().contains("query"));

    search.assert_calls_async(0).await;
}

#[tokio::test]
async fn forward_search_parameters_and_return_the_body_verbatim() {
    let server = MockServer::start_async().await;
    let upstream_body = json!({
        "total_count": 1,
        "page": 2,
        "data": [{ "id": "9000", "attributes": { "language": "en" } }]
    });
    let search = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/subtitles")
                .header("api-key", API_KEY)
                .query_param("query", "the matrix")
                .query_param("languages", "en,fr")
                .query_param("season_number", "1")
                .query_param("page", "2");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(upstream_body.clone());
        })
        .await;

    let response = app(config(&server, false))
        .oneshot(get(
            "/search?query=the%20matrix&languages=en,fr&season_number=1&page=2",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN),
        Some("*")
    );
    assert_eq!(body_json(response).await, upstream_body);

    search.assert_calls_async(1).await;
}

#[tokio::test]
async fn mirror_upstream_search_failures() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/subtitles");
            then.status(429)
                .header("content-type", "application/json")
                .json_body(json!({ "message": "Throttle limit reached" }));
        })
        .await;

    let response = app(config(&server, false))
        .oneshot(get("/search?imdb_id=133093"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["error"], "upstream_error");
    assert!(body["message"].as_str().unwrap().contains("Throttle limit reached"));
}

#[tokio::test]
async fn return_the_download_link_unchanged() {
    let server = MockServer::start_async().await;
    let login = mock_login(&server).await;
    let upstream_body = json!({
        "link": "https://dl.example.com/download/abc/subtitle.srt",
        "file_name": "subtitle.srt",
        "requests": 1,
        "remaining": 99
    });
    let download = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/download")
                .header("authorization", "Bearer tok")
                .json_body(json!({ "file_id": 12345 }));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(upstream_body.clone());
        })
        .await;

    let response = app(config(&server, true))
        .oneshot(get("/download?file_id=12345"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["link"], upstream_body["link"]);
    assert_eq!(body["file_name"], upstream_body["file_name"]);

    login.assert_calls_async(1).await;
    download.assert_calls_async(1).await;
}

#[tokio::test]
async fn accept_download_requests_as_json() {
    let server = MockServer::start_async().await;
    mock_login(&server).await;
    let download = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/download")
                .json_body(json!({ "file_id": 12345, "sub_format": "webvtt" }));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "link": "https://dl.example.com/x", "file_name": "x.vtt" }));
        })
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/download")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "file_id": 12345, "sub_format": "webvtt" }).to_string(),
        ))
        .unwrap();

    let response = app(config(&server, true)).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["file_name"], "x.vtt");
    download.assert_calls_async(1).await;
}

#[tokio::test]
async fn stream_the_subtitle_file_as_an_attachment() {
    let server = MockServer::start_async().await;
    mock_login(&server).await;
    let file_link = server.url("/files/abc");
    server
        .mock_async(|when, then| {
            when.method(POST).path("/download");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "link": file_link, "file_name": "subtitle.srt" }));
        })
        .await;
    let subtitle = "1\n00:00:01,000 --> 00:00:02,000\nWake up, Neo.\n";
    let file = server
        .mock_async(|when, then| {
            when.method(GET).path("/files/abc");
            then.status(200)
                .header("content-type", "application/x-subrip")
                .body(subtitle);
        })
        .await;

    let response = app(config(&server, true))
        .oneshot(get("/download-file?file_id=12345&sub_format=srt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::CONTENT_DISPOSITION),
        Some("attachment; filename=\"subtitle.srt\"")
    );
    assert_eq!(
        header_str(&response, header::CONTENT_TYPE),
        Some("application/x-subrip")
    );
    assert_eq!(
        header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN),
        Some("*")
    );
    assert_eq!(body_bytes(response).await, subtitle.as_bytes());

    file.assert_calls_async(1).await;
}

#[tokio::test]
async fn pass_file_fetch_failures_through_as_text() {
    let server = MockServer::start_async().await;
    mock_login(&server).await;
    let file_link = server.url("/files/expired");
    server
        .mock_async(|when, then| {
            when.method(POST).path("/download");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "link": file_link, "file_name": "subtitle.srt" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/files/expired");
            then.status(410).body("link expired");
        })
        .await;

    let response = app(config(&server, true))
        .oneshot(get("/download-file?file_id=12345&sub_format=srt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GONE);
    assert!(header_str(&response, header::CONTENT_DISPOSITION).is_none());
    assert_eq!(body_bytes(response).await, b"Failed to fetch subtitle file");
}

#[tokio::test]
async fn refuse_downloads_without_credentials() {
    let server = MockServer::start_async().await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST).path("/login");
            then.status(200).json_body(json!({ "token": "tok" }));
        })
        .await;

    let response = app(config(&server, false))
        .oneshot(get("/download?file_id=12345"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "config_error");
    login.assert_calls_async(0).await;
}

#[tokio::test]
async fn mirror_a_rejected_login() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/login");
            then.status(401)
                .header("content-type", "application/json")
                .json_body(json!({ "message": "Error, invalid username/password", "status": 401 }));
        })
        .await;

    let response = app(config(&server, true))
        .oneshot(get("/download?file_id=12345"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "auth_error");
    assert!(body["message"].as_str().unwrap().contains("invalid username/password"));
}

#[tokio::test]
async fn reject_a_non_numeric_file_id() {
    let server = MockServer::start_async().await;

    let response = app(config(&server, true))
        .oneshot(get("/download?file_id=abc"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad_request");
}

#[tokio::test]
async fn answer_unknown_routes_with_a_json_404() {
    let server = MockServer::start_async().await;

    let response = app(config(&server, true))
        .oneshot(get("/nope"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN),
        Some("*")
    );
    let body = body_json(response).await;
    assert_eq!(body["error"], "not_found");
    assert!(body["message"].as_str().unwrap().contains("/nope"));
}

#[tokio::test]
async fn report_health_and_token_state() {
    let server = MockServer::start_async().await;

    let response = app(config(&server, false))
        .oneshot(get("/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["downloads_enabled"], false);
    assert_eq!(body["token"]["cached"], false);
    assert_eq!(body["environment"], "development");
}

#[tokio::test]
async fn answer_plain_options_requests_with_204_too() {
    let server = MockServer::start_async().await;

    for uri in ["/search", "/download-file"] {
        let request = Request::builder()
            .method("OPTIONS")
            .uri(uri)
            .body(Body::empty())
            .unwrap();

        let response = app(config(&server, true)).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT, "{}", uri);
        assert_eq!(
            header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some("*")
        );
    }
}

#[tokio::test]
async fn answer_unsupported_methods_with_a_json_405() {
    let server = MockServer::start_async().await;

    for uri in ["/search", "/download-file", "/health"] {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::ORIGIN, ORIGIN)
            .body(Body::empty())
            .unwrap();

        let response = app(config(&server, true)).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", uri);
        assert_eq!(
            header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some("*")
        );
        let body = body_json(response).await;
        assert_eq!(body["error"], "method_not_allowed");
        assert!(body["message"].as_str().unwrap().contains(uri));
    }
}

#[tokio::test]
async fn treat_empty_search_fields_as_missing() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/subtitles")
                .query_param("query", "matrix");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "data": [] }));
        })
        .await;

    let response = app(config(&server, true))
        .oneshot(get("/search?query=matrix&season_number=&episode_number=&page="))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    search.assert_calls_async(1).await;
}

#[tokio::test]
async fn treat_an_empty_sub_format_as_missing() {
    let server = MockServer::start_async().await;
    mock_login(&server).await;
    let download = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/download")
                .json_body(json!({ "file_id": 12345 }));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "link": "https://dl.example.com/x", "file_name": "x.srt" }));
        })
        .await;

    let response = app(config(&server, true))
        .oneshot(get("/download?file_id=12345&sub_format="))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    download.assert_calls_async(1).await;
}
