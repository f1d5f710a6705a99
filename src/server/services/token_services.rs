// keeps the one upstream login token for the whole process
//
// callers never talk to /login directly, they ask the broker for a token. a fresh cached token is
// handed out as-is, otherwise exactly one login runs at a time and everybody who shows up while
// it's running waits on that same login. the login itself runs in its own task so a client
// hanging up mid request can't cancel it for everybody else.
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    config::AppConfig,
    server::{
        error::{AppResult, Error},
        services::upstream_services::{
            DynUpstreamService, UpstreamRequest, UpstreamResponse, UpstreamServiceTrait,
        },
        utils::response_utils::upstream_message,
    },
};

type SharedLogin = Shared<BoxFuture<'static, AppResult<String>>>;

#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    /// how long a token is reused after login
    pub ttl: Duration,
    /// minimum gap between the start of two login attempts
    pub min_login_interval: Duration,
}

impl TokenPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ttl: config.token_ttl(),
            min_login_interval: config.login_min_interval(),
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// never print the password, not even in debug logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

struct CachedToken {
    value: String,
    acquired_at: Instant,
}

#[derive(Default)]
struct TokenState {
    token: Option<CachedToken>,
    last_attempt_at: Option<Instant>,
    in_flight: Option<SharedLogin>,
}

impl TokenState {
    fn fresh_token(&self, ttl: Duration, now: Instant) -> Option<String> {
        self.token
            .as_ref()
            .filter(|cached| now.duration_since(cached.acquired_at) < ttl)
            .map(|cached| cached.value.clone())
    }

    /// a login that already resolved (or whose task died) doesn't count as in flight
    fn pending_login(&self) -> Option<SharedLogin> {
        self.in_flight
            .as_ref()
            .filter(|login| login.peek().is_none())
            .cloned()
    }
}

/// snapshot of the cache for the health endpoint
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TokenStatus {
    pub cached: bool,
    pub age_seconds: Option<u64>,
    pub login_in_flight: bool,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

pub struct TokenBroker {
    upstream: DynUpstreamService,
    credentials: Option<Credentials>,
    policy: TokenPolicy,
    state: Arc<Mutex<TokenState>>,
}

impl TokenBroker {
    pub fn new(
        upstream: DynUpstreamService,
        credentials: Option<Credentials>,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            upstream,
            credentials,
            policy,
            state: Arc::new(Mutex::new(TokenState::default())),
        }
    }

    pub fn from_config(upstream: DynUpstreamService, config: &AppConfig) -> Self {
        let credentials = config
            .credentials()
            .map(|(username, password)| Credentials::new(username, password));

        if credentials.is_none() {
            warn!("no upstream username/password configured, downloads will be rejected");
        }

        Self::new(upstream, credentials, TokenPolicy::from_config(config))
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// returns a usable bearer token, logging in when the cache is empty or stale
    pub async fn acquire_token(&self) -> AppResult<String> {
        let login = {
            let mut state = self.state.lock().await;

            if let Some(token) = state.fresh_token(self.policy.ttl, Instant::now()) {
                debug!("reusing cached upstream token");
                return Ok(token);
            }

            match state.pending_login() {
                Some(pending) => {
                    debug!("login already in flight, waiting on it");
                    pending
                }
                None => {
                    let credentials = self.credentials.clone().ok_or_else(|| {
                        Error::Config("upstream username and password are not configured".into())
                    })?;
                    let pending = self.spawn_login(credentials);
                    state.in_flight = Some(pending.clone());
                    pending
                }
            }
        };

        login.await
    }

    /// drops the cached token, but only if it is still the one that got rejected
    pub async fn invalidate(&self, rejected: &str) {
        let mut state = self.state.lock().await;

        if state
            .token
            .as_ref()
            .is_some_and(|cached| cached.value == rejected)
        {
            info!("upstream token invalidated");
            state.token = None;
        }
    }

    /// runs `op` with a token, and on a 401 logs in again and runs it exactly one more time
    pub async fn authorized_call<F, Fut>(&self, mut op: F) -> AppResult<UpstreamResponse>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = AppResult<UpstreamResponse>>,
    {
        let token = self.acquire_token().await?;
        let response = op(token.clone()).await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!("upstream rejected the cached token, logging in again");
        self.invalidate(&token).await;

        let token = self.acquire_token().await?;
        let response = op(token.clone()).await?;

        if response.status == StatusCode::UNAUTHORIZED {
            error!("upstream rejected a freshly issued token");
            self.invalidate(&token).await;
            return Err(Error::Auth {
                status: StatusCode::UNAUTHORIZED.as_u16(),
                message: upstream_message(&response.body),
            });
        }

        Ok(response)
    }

    pub async fn status(&self) -> TokenStatus {
        let state = self.state.lock().await;
        let now = Instant::now();

        let age = state
            .token
            .as_ref()
            .filter(|cached| now.duration_since(cached.acquired_at) < self.policy.ttl)
            .map(|cached| now.duration_since(cached.acquired_at).as_secs());

        TokenStatus {
            cached: age.is_some(),
            age_seconds: age,
            login_in_flight: state.pending_login().is_some(),
        }
    }

    fn spawn_login(&self, credentials: Credentials) -> SharedLogin {
        let upstream = self.upstream.clone();
        let state = self.state.clone();
        let min_interval = self.policy.min_login_interval;

        let handle = tokio::spawn(async move {
            let not_before = state
                .lock()
                .await
                .last_attempt_at
                .map(|at| at + min_interval);

            if let Some(not_before) = not_before.filter(|at| *at > Instant::now()) {
                debug!(
                    "spacing logins, waiting {}ms",
                    not_before.duration_since(Instant::now()).as_millis()
                );
                tokio::time::sleep_until(not_before).await;
            }

            state.lock().await.last_attempt_at = Some(Instant::now());

            let result = login(upstream.as_ref(), &credentials).await;

            let mut guard = state.lock().await;
            guard.in_flight = None;
            match &result {
                Ok(token) => {
                    info!("upstream login succeeded");
                    guard.token = Some(CachedToken {
                        value: token.clone(),
                        acquired_at: Instant::now(),
                    });
                }
                Err(e) => {
                    warn!("upstream login failed: {}", e);
                    guard.token = None;
                }
            }

            result
        });

        handle
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    error!("login task died: {}", e);
                    Err(Error::InternalServerErrorWithContext(format!(
                        "login task failed: {}",
                        e
                    )))
                })
            })
            .boxed()
            .shared()
    }
}

async fn login(
    upstream: &(dyn UpstreamServiceTrait + Send + Sync),
    credentials: &Credentials,
) -> AppResult<String> {
    debug!("logging in to upstream as {}", credentials.username);

    let request = UpstreamRequest::post(
        "/login",
        json!({
            "username": credentials.username,
            "password": credentials.password,
        }),
    );

    let response = upstream.call(request).await?;

    if !response.is_success() {
        return Err(Error::Auth {
            status: response.status.as_u16(),
            message: upstream_message(&response.body),
        });
    }

    let parsed: LoginResponse = response.json().map_err(|_| Error::Auth {
        status: StatusCode::BAD_GATEWAY.as_u16(),
        message: "login response was not valid json".to_string(),
    })?;

    parsed
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::Auth {
            status: StatusCode::BAD_GATEWAY.as_u16(),
            message: "login response did not contain a token".to_string(),
        })
}
