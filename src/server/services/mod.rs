pub mod app_services;
pub mod subtitle_services;
pub mod token_services;
pub mod upstream_services;

pub use subtitle_services::DynSubtitleService;
pub use upstream_services::DynUpstreamService;
