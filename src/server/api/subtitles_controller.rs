// thin handlers, all the upstream and token logic sits in the services
use axum::{
    Extension, Router,
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::{debug, error};

use crate::server::{
    dtos::subtitle_dto::{DownloadParams, SearchParams},
    error::{AppResult, Error},
    extractors::{ValidatedJson, ValidatedQuery},
    services::{
        app_services::AppServices, subtitle_services::SubtitleFile,
        upstream_services::UpstreamResponse,
    },
    utils::response_utils::content_disposition,
};

pub struct SubtitlesController;

impl SubtitlesController {
    pub fn app() -> Router {
        Router::new()
            .route("/search", get(Self::search))
            .route("/download", get(Self::download_get).post(Self::download_post))
            .route("/download-file", get(Self::download_file))
    }

    async fn search(
        Extension(services): Extension<AppServices>,
        ValidatedQuery(params): ValidatedQuery<SearchParams>,
    ) -> AppResult<Response> {
        let response = services.subtitles.search(&params).await?;
        Ok(Self::passthrough(response))
    }

    async fn download_get(
        Extension(services): Extension<AppServices>,
        ValidatedQuery(params): ValidatedQuery<DownloadParams>,
    ) -> AppResult<Response> {
        let response = services.subtitles.request_download(&params).await?;
        Ok(Self::passthrough(response))
    }

    async fn download_post(
        Extension(services): Extension<AppServices>,
        ValidatedJson(params): ValidatedJson<DownloadParams>,
    ) -> AppResult<Response> {
        let response = services.subtitles.request_download(&params).await?;
        Ok(Self::passthrough(response))
    }

    async fn download_file(
        Extension(services): Extension<AppServices>,
        ValidatedQuery(params): ValidatedQuery<DownloadParams>,
    ) -> AppResult<Response> {
        match services.subtitles.download_file(&params).await? {
            SubtitleFile::Ready {
                file_name,
                content_type,
                body,
            } => {
                let mut headers = HeaderMap::new();

                let content_type = content_type
                    .and_then(|ct| HeaderValue::from_str(&ct).ok())
                    .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
                headers.insert(header::CONTENT_TYPE, content_type);

                let disposition =
                    HeaderValue::from_str(&content_disposition(&file_name)).map_err(|e| {
                        error!("could not build content-disposition for {}: {}", file_name, e);
                        Error::InternalServerErrorWithContext(
                            "invalid subtitle file name".to_string(),
                        )
                    })?;
                headers.insert(header::CONTENT_DISPOSITION, disposition);

                // signed links expire, nothing downstream should keep a copy
                headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

                debug!("sending {} as attachment", file_name);
                Ok((StatusCode::OK, headers, Body::from_stream(body)).into_response())
            }
            SubtitleFile::FetchFailed { status } => Ok((
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "Failed to fetch subtitle file",
            )
                .into_response()),
        }
    }

    /// upstream status and body as-is, keeping its content type when it sent one
    fn passthrough(response: UpstreamResponse) -> Response {
        let content_type = response
            .content_type()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));

        (
            response.status,
            [(header::CONTENT_TYPE, content_type)],
            response.body,
        )
            .into_response()
    }
}
