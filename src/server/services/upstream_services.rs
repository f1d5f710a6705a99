use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, header};
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use mockall::automock;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::{
    config::AppConfig,
    server::{
        error::{AppResult, Error},
        utils::response_utils::upstream_message,
    },
};

pub type DynUpstreamService = Arc<dyn UpstreamServiceTrait + Send + Sync>;

/// one call against the provider api, `path` is relative to the configured base url
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl UpstreamRequest {
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::GET,
            path: path.to_string(),
            query: Vec::new(),
            bearer: None,
            body: None,
        }
    }

    pub fn post(path: &str, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            path: path.to_string(),
            query: Vec::new(),
            bearer: None,
            body: Some(body),
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }
}

/// whatever the provider answered, non-2xx included
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn json<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            error!("failed to parse upstream response: {}", e);
            Error::Upstream {
                status: StatusCode::BAD_GATEWAY.as_u16(),
                message: format!("invalid upstream response: {}", e),
            }
        })
    }

    /// turns a non-2xx reply into the matching error
    pub fn into_upstream_error(self) -> Error {
        Error::Upstream {
            status: self.status.as_u16(),
            message: upstream_message(&self.body),
        }
    }
}

/// a file body that is forwarded chunk by chunk instead of buffered
pub struct UpstreamStream {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: BoxStream<'static, Result<Bytes, std::io::Error>>,
}

#[automock]
#[async_trait]
pub trait UpstreamServiceTrait {
    /// send a request to `<base_url><path>` with the api key attached
    async fn call(&self, request: UpstreamRequest) -> AppResult<UpstreamResponse>;

    /// GET an absolute (signed) link and hand back the body as a stream
    async fn fetch(&self, link: &str) -> AppResult<UpstreamStream>;
}

pub struct OpenSubtitlesService {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    user_agent: String,
}

impl OpenSubtitlesService {
    pub fn new(config: &AppConfig) -> Self {
        let user_agent = config.user_agent();

        let http_client = reqwest::Client::builder()
            .user_agent(user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            base_url: config.upstream_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            user_agent,
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl UpstreamServiceTrait for OpenSubtitlesService {
    async fn call(&self, request: UpstreamRequest) -> AppResult<UpstreamResponse> {
        let url = self.url_for(&request.path);
        debug!("upstream {} {}", request.method, url);

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .header("Api-Key", &self.api_key)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if let Some(token) = request.bearer.as_deref() {
            builder = builder.bearer_auth(token);
        }

        if let Some(body) = request.body.as_ref() {
            // .json() sets the content type for us
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            error!("upstream request to {} failed: {}", request.path, e);
            Error::Transport(e.to_string())
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            error!("failed to read upstream response body: {}", e);
            Error::Transport(format!("failed to read upstream response: {}", e))
        })?;

        debug!(
            "upstream {} answered {} ({} bytes)",
            request.path,
            status,
            body.len()
        );

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }

    async fn fetch(&self, link: &str) -> AppResult<UpstreamStream> {
        let url = url::Url::parse(link).map_err(|e| {
            error!("upstream handed out an invalid file link: {}", e);
            Error::Upstream {
                status: StatusCode::BAD_GATEWAY.as_u16(),
                message: format!("invalid file link: {}", e),
            }
        })?;

        let response = self
            .http_client
            .get(url)
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                error!("file fetch failed: {}", e);
                Error::Transport(e.to_string())
            })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        debug!("file fetch answered {}", status);

        let body = response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed();

        Ok(UpstreamStream {
            status,
            content_type,
            body,
        })
    }
}
