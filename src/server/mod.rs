pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    Extension, Router,
    extract::Request,
    http::{HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use once_cell::sync::Lazy;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::AppConfig;
use api::{SubtitlesController, health_controller::health_endpoint};
use error::Error;

pub use services::app_services::AppServices;

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct ApplicationServer;

impl ApplicationServer {
    pub async fn serve(config: Arc<AppConfig>) -> anyhow::Result<()> {
        Lazy::force(&START_TIME);

        let services = AppServices::new(config.clone());
        let app = Self::router(services);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!("routes initialized, listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("error while serving")?;

        info!("server stopped");
        Ok(())
    }

    /// the whole app minus the listener, tests drive this directly
    pub fn router(services: AppServices) -> Router {
        let cors = Self::cors_layer(&services.config.cors_origin);

        Router::new()
            .route("/health", get(health_endpoint))
            .merge(SubtitlesController::app())
            .method_not_allowed_fallback(Self::method_not_allowed)
            .fallback(Self::not_found)
            .layer(
                // top to bottom is outside to inside. cors builds its preflight replies with
                // `Default` bodies so trace has to wrap it, and the 204 rewrite has to see
                // what cors answers
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(middleware::from_fn(Self::preflight_no_content))
                    .layer(cors)
                    .layer(Extension(services)),
            )
    }

    fn cors_layer(origins: &str) -> CorsLayer {
        let allow_origin = if origins.trim() == "*" {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(origins.split(',').filter_map(|origin| {
                let origin = origin.trim();
                HeaderValue::from_str(origin)
                    .inspect_err(|_| warn!("ignoring invalid cors origin {:?}", origin))
                    .ok()
            }))
        };

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
                HeaderName::from_static("x-requested-with"),
            ])
            .expose_headers([header::CONTENT_DISPOSITION])
            .max_age(Duration::from_secs(86400))
    }

    /// every OPTIONS request ends here with an empty 204, cors headers included
    async fn preflight_no_content(request: Request, next: Next) -> Response {
        let is_options = request.method() == Method::OPTIONS;
        let mut response = next.run(request).await;

        if is_options && response.status().is_success() {
            *response.status_mut() = StatusCode::NO_CONTENT;
        }

        response
    }

    async fn not_found(uri: Uri) -> Error {
        Error::NotFound(format!("no route for {}", uri.path()))
    }

    async fn method_not_allowed(method: Method, uri: Uri) -> Error {
        Error::MethodNotAllowed(format!("{} is not supported on {}", method, uri.path()))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("could not listen for ctrl-c: {}", e);
        // never resolve, the server just runs until killed
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
