use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::server::services::token_services::TokenStatus;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    // search works but downloads don't (no credentials)
    Degraded,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
    pub environment: String,
    pub downloads_enabled: bool,
    pub token: TokenStatus,
}
