pub mod health_controller;
pub mod subtitles_controller;

pub use subtitles_controller::SubtitlesController;
