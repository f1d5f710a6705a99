use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;

use super::{
    subtitle_services::{DynSubtitleService, SubtitleService},
    token_services::TokenBroker,
    upstream_services::{DynUpstreamService, OpenSubtitlesService},
};

/// everything a handler needs, cloned into each request through an Extension
#[derive(Clone)]
pub struct AppServices {
    pub tokens: Arc<TokenBroker>,
    pub subtitles: DynSubtitleService,
    pub config: Arc<AppConfig>,
}

impl AppServices {
    pub fn new(config: Arc<AppConfig>) -> Self {
        info!("starting services...");

        let upstream = Arc::new(OpenSubtitlesService::new(&config)) as DynUpstreamService;
        info!("upstream client ok ({})", config.upstream_base_url);

        Self::with_upstream(config, upstream)
    }

    /// same wiring but with any upstream implementation, tests hand in their own
    pub fn with_upstream(config: Arc<AppConfig>, upstream: DynUpstreamService) -> Self {
        let tokens = Arc::new(TokenBroker::from_config(upstream.clone(), &config));

        let subtitles =
            Arc::new(SubtitleService::new(upstream, tokens.clone())) as DynSubtitleService;

        Self {
            tokens,
            subtitles,
            config,
        }
    }
}
