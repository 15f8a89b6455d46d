use super::ip::resolve_client_ip;
use axum::{
    extract::{connect_info::ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::{config::AppConfig, error::AppError, state::AppState};

/// Endpoint limits applied by [`endpoint_rate_limit_middleware`]: (path, max requests, window seconds).
pub const ENDPOINT_LIMITS: [(&str, usize, u64); 3] = [
    ("/api/auth/login", 10, 60),
    ("/api/books/export", 30, 60),
    ("/api/upload/book-image", 30, 60),
];

/// A thread-safe rate limiter based on the sliding window algorithm.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<RwLock<HashMap<IpAddr, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_seconds),
        }
    }

    /// Records the request and returns `Ok(())`, or `RateLimited` with the seconds
    /// until the oldest request in the window expires.
    pub async fn check_rate_limit(&self, ip: IpAddr) -> Result<(), AppError> {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        let timestamps = requests.entry(ip).or_default();

        // on clock skew keep the timestamp
        timestamps.retain(|&t| now.checked_duration_since(t).map(|d| d < self.window).unwrap_or(true));

        if timestamps.len() >= self.max_requests {
            let oldest = timestamps.first().copied().unwrap_or(now);
            let retry_after = match now.checked_duration_since(oldest) {
                Some(elapsed) => self.window.saturating_sub(elapsed),
                None => Duration::from_secs(1),
            };
            return Err(AppError::RateLimited { retry_after_seconds: retry_after.as_secs().max(1) });
        }

        timestamps.push(now);
        Ok(())
    }

    /// Drops timestamps outside the window and forgets idle clients.
    pub async fn cleanup_old_entries(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, timestamps| {
            timestamps.retain(|&t| now.checked_duration_since(t).map(|d| d < self.window).unwrap_or(true));
            !timestamps.is_empty()
        });
    }

    #[cfg(test)]
    pub async fn tracked_clients(&self) -> usize {
        self.requests.read().await.len()
    }
}

fn client_ip(req: &Request, trust_proxy: bool) -> IpAddr {
    let remote_ip = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    resolve_client_ip(req.headers(), remote_ip, trust_proxy)
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}

/// Global per-IP limiter.
///
/// Defaults to 1000 requests per 60 seconds; override with
/// `BOOKSTOCK_RATE_LIMIT_MAX_REQUESTS` and `BOOKSTOCK_RATE_LIMIT_WINDOW_SECONDS`.
pub async fn rate_limit_middleware(State(cfg): State<Arc<AppConfig>>, req: Request, next: Next) -> Response {
    lazy_static::lazy_static! {
        static ref GLOBAL_RATE_LIMITER: RateLimiter = RateLimiter::new(
            env_or("BOOKSTOCK_RATE_LIMIT_MAX_REQUESTS", 1000usize),
            env_or("BOOKSTOCK_RATE_LIMIT_WINDOW_SECONDS", 60u64),
        );
        static ref GLOBAL_CLEANUP_STARTED: OnceLock<()> = OnceLock::new();
    }

    GLOBAL_CLEANUP_STARTED.get_or_init(|| {
        let limiter = GLOBAL_RATE_LIMITER.clone();
        let cleanup_secs = env_or("BOOKSTOCK_GLOBAL_RATE_LIMIT_CLEANUP_INTERVAL", 600u64).clamp(60, 3600);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(cleanup_secs));
            loop {
                interval.tick().await;
                limiter.cleanup_old_entries().await;
            }
        });
    });

    let ip = client_ip(&req, cfg.server.trust_proxy);
    match GLOBAL_RATE_LIMITER.check_rate_limit(ip).await {
        Ok(()) => next.run(req).await,
        Err(e) => {
            tracing::warn!(%ip, path = %req.uri().path(), "global rate limit exceeded");
            e.into_response()
        }
    }
}

/// Applies the per-endpoint limits held in [`AppState::rate_limiter`].
pub async fn endpoint_rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let ip = client_ip(&req, state.config.server.trust_proxy);
    let path = req.uri().path().to_string();
    match state.rate_limiter.check_endpoint_limit(&path, ip).await {
        Ok(()) => next.run(req).await,
        Err(e) => {
            tracing::warn!(%ip, %path, "endpoint rate limit exceeded");
            e.into_response()
        }
    }
}

/// Per-endpoint rate limiters keyed by exact request path.
#[derive(Clone, Default)]
pub struct EndpointRateLimiter {
    limiters: Arc<HashMap<String, RateLimiter>>,
}

impl EndpointRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces limits for the given endpoints.
    pub fn with_limits(self, limits: &[(&str, usize, u64)]) -> Self {
        let mut map = Arc::try_unwrap(self.limiters).unwrap_or_else(|arc| (*arc).clone());
        for &(endpoint, max_requests, window_seconds) in limits {
            map.insert(endpoint.to_string(), RateLimiter::new(max_requests, window_seconds));
        }
        Self { limiters: Arc::new(map) }
    }

    pub async fn check_endpoint_limit(&self, endpoint: &str, ip: IpAddr) -> Result<(), AppError> {
        match self.limiters.get(endpoint) {
            Some(limiter) => limiter.check_rate_limit(ip).await,
            None => Ok(()),
        }
    }

    pub async fn cleanup_all(&self) {
        for limiter in self.limiters.values() {
            limiter.cleanup_old_entries().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter() {
        let limiter = RateLimiter::new(3, 1);
        let ip = IpAddr::from([127, 0, 0, 1]);

        assert!(limiter.check_rate_limit(ip).await.is_ok());
        assert!(limiter.check_rate_limit(ip).await.is_ok());
        assert!(limiter.check_rate_limit(ip).await.is_ok());

        match limiter.check_rate_limit(ip).await {
            Err(AppError::RateLimited { retry_after_seconds }) => assert!(retry_after_seconds >= 1),
            other => panic!("expected RateLimited, got {:?}", other),
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(limiter.check_rate_limit(ip).await.is_ok());
    }

    #[tokio::test]
    async fn test_different_ips() {
        let limiter = RateLimiter::new(1, 1);
        let ip1 = IpAddr::from([127, 0, 0, 1]);
        let ip2 = IpAddr::from([127, 0, 0, 2]);

        assert!(limiter.check_rate_limit(ip1).await.is_ok());
        assert!(limiter.check_rate_limit(ip2).await.is_ok());

        assert!(limiter.check_rate_limit(ip1).await.is_err());
        assert!(limiter.check_rate_limit(ip2).await.is_err());
    }

    #[tokio::test]
    async fn cleanup_forgets_idle_clients() {
        let limiter = RateLimiter::new(5, 1);
        limiter.check_rate_limit(IpAddr::from([10, 0, 0, 1])).await.unwrap();
        assert_eq!(limiter.tracked_clients().await, 1);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        limiter.cleanup_old_entries().await;
        assert_eq!(limiter.tracked_clients().await, 0);
    }

    #[tokio::test]
    async fn endpoint_limits_only_apply_to_listed_paths() {
        let limiter = EndpointRateLimiter::new().with_limits(&[("/api/auth/login", 1, 60)]);
        let ip = IpAddr::from([127, 0, 0, 1]);
        assert!(limiter.check_endpoint_limit("/api/auth/login", ip).await.is_ok());
        assert!(limiter.check_endpoint_limit("/api/auth/login", ip).await.is_err());
        assert!(limiter.check_endpoint_limit("/api/books", ip).await.is_ok());
        assert!(limiter.check_endpoint_limit("/api/books", ip).await.is_ok());
    }
}
