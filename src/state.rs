use std::sync::Arc;

use crate::auth::JwtKeys;
use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::middleware::rate_limit::ENDPOINT_LIMITS;
use crate::middleware::EndpointRateLimiter;

/// Shared state handed to every handler and stateful middleware.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Arc<AppConfig>,
    /// Signing keys derived from `auth.jwt_secret`.
    pub jwt: Arc<JwtKeys>,
    pub metrics: Metrics,
    /// Limits for login, export and upload; see [`ENDPOINT_LIMITS`].
    pub rate_limiter: EndpointRateLimiter,
}

impl AppState {
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> Self {
        let jwt = JwtKeys::from_config(&config.auth);
        Self {
            db,
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            metrics: Metrics::new(),
            rate_limiter: EndpointRateLimiter::new().with_limits(&ENDPOINT_LIMITS),
        }
    }
}
