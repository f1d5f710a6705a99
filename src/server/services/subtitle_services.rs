use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::StatusCode;
use futures::stream::BoxStream;
use tracing::{debug, info, warn};

use crate::server::{
    dtos::subtitle_dto::{DownloadLink, DownloadParams, SearchParams},
    error::{AppResult, Error},
    services::{
        token_services::TokenBroker,
        upstream_services::{DynUpstreamService, UpstreamRequest, UpstreamResponse},
    },
    utils::response_utils::fallback_file_name,
};

pub type DynSubtitleService = Arc<dyn SubtitleServiceTrait + Send + Sync>;

/// result of `/download-file`
pub enum SubtitleFile {
    Ready {
        file_name: String,
        content_type: Option<String>,
        body: BoxStream<'static, Result<Bytes, std::io::Error>>,
    },
    /// the signed link itself failed, nothing gets streamed
    FetchFailed { status: StatusCode },
}

#[async_trait]
pub trait SubtitleServiceTrait {
    /// search passthrough, params are expected to be validated already
    async fn search(&self, params: &SearchParams) -> AppResult<UpstreamResponse>;

    /// asks the provider for a temporary download link
    async fn request_download(&self, params: &DownloadParams) -> AppResult<UpstreamResponse>;

    /// requests the link and opens the file behind it
    async fn download_file(&self, params: &DownloadParams) -> AppResult<SubtitleFile>;
}

pub struct SubtitleService {
    upstream: DynUpstreamService,
    tokens: Arc<TokenBroker>,
}

impl SubtitleService {
    pub fn new(upstream: DynUpstreamService, tokens: Arc<TokenBroker>) -> Self {
        Self { upstream, tokens }
    }
}

#[async_trait]
impl SubtitleServiceTrait for SubtitleService {
    async fn search(&self, params: &SearchParams) -> AppResult<UpstreamResponse> {
        let query = params.to_upstream_query();
        debug!("searching subtitles with {:?}", query);

        let response = self
            .upstream
            .call(UpstreamRequest::get("/subtitles").with_query(query))
            .await?;

        if !response.is_success() {
            warn!("subtitle search answered {}", response.status);
            return Err(response.into_upstream_error());
        }

        Ok(response)
    }

    async fn request_download(&self, params: &DownloadParams) -> AppResult<UpstreamResponse> {
        let body = params.upstream_body();
        let upstream = self.upstream.clone();

        let response = self
            .tokens
            .authorized_call(|token| {
                let upstream = upstream.clone();
                let request = UpstreamRequest::post("/download", body.clone()).with_bearer(&token);
                async move { upstream.call(request).await }
            })
            .await?;

        if !response.is_success() {
            warn!(
                "download link request for file {} answered {}",
                params.file_id, response.status
            );
            return Err(response.into_upstream_error());
        }

        info!("download link issued for file {}", params.file_id);
        Ok(response)
    }

    async fn download_file(&self, params: &DownloadParams) -> AppResult<SubtitleFile> {
        let response = self.request_download(params).await?;
        let info: DownloadLink = response.json()?;

        let link = info
            .link
            .filter(|link| !link.is_empty())
            .ok_or_else(|| Error::Upstream {
                status: StatusCode::BAD_GATEWAY.as_u16(),
                message: "download response did not contain a link".to_string(),
            })?;

        let file_name = info
            .file_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| fallback_file_name(params.sub_format.as_deref()));

        let file = self.upstream.fetch(&link).await?;

        if !file.status.is_success() {
            warn!(
                "fetching subtitle file {} answered {}",
                params.file_id, file.status
            );
            return Ok(SubtitleFile::FetchFailed {
                status: file.status,
            });
        }

        debug!("streaming {} to client", file_name);

        Ok(SubtitleFile::Ready {
            file_name,
            content_type: file.content_type,
            body: file.body,
        })
    }
}
