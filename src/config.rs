use std::time::Duration;

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.opensubtitles.com/api/v1";

#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser, Clone)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum, default_value = "development")]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // api key from the subtitle provider consumer page, every upstream call needs it
    #[clap(long, env = "OPENSUBTITLES_API_KEY")]
    pub api_key: String,

    // login credentials, only the download routes need these so they're optional here and
    // checked when a token is actually requested
    #[clap(long, env = "OPENSUBTITLES_USERNAME")]
    pub username: Option<String>,

    #[clap(long, env = "OPENSUBTITLES_PASSWORD")]
    pub password: Option<String>,

    // the provider rejects requests without a recognisable user agent
    #[clap(long, env = "OPENSUBTITLES_USER_AGENT")]
    pub user_agent: Option<String>,

    #[clap(long, env = "OPENSUBTITLES_BASE_URL", default_value = DEFAULT_UPSTREAM_BASE_URL)]
    pub upstream_base_url: String,

    // either * for allowing everything, or a comma seperated list of origins like
    // https://example.com,https://something.com
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    // how long a login token is reused before logging in again
    #[clap(long, env, default_value = "43200")]
    pub token_ttl_secs: u64,

    // minimum gap between two login calls, the provider throttles anything faster
    #[clap(long, env, default_value = "1000")]
    pub login_min_interval_ms: u64,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn login_min_interval(&self) -> Duration {
        Duration::from_millis(self.login_min_interval_ms)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or_else(|| format!("subtitle-proxy v{}", env!("CARGO_PKG_VERSION")))
    }

    /// both halves have to be present and non-empty, otherwise downloads are disabled
    pub fn credentials(&self) -> Option<(String, String)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user.to_string(), pass.to_string()))
            }
            _ => None,
        }
    }
}

impl Default for AppConfig {
    // only really used by tests, a real run always goes through clap
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            api_key: String::new(),
            username: None,
            password: None,
            user_agent: None,
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            cors_origin: "*".to_string(),
            token_ttl_secs: 43200,
            login_min_interval_ms: 1000,
            sentry_dsn: None,
        }
    }
}
