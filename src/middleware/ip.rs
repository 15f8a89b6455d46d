use axum::{
    extract::{connect_info::ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use crate::state::AppState;

/// Client IP for rate limiting and audit entries.
///
/// With `trust_proxy` set, `x-forwarded-for` (first hop) and then `x-real-ip` take
/// precedence. Otherwise only the socket address counts, so clients cannot pick
/// their own key. Falls back to loopback when no socket address is known.
pub fn resolve_client_ip(headers: &HeaderMap, remote: Option<IpAddr>, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        if let Some(ip) = forwarded_ip(headers) {
            return ip;
        }
    }
    remote.unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(h) = headers.get("x-forwarded-for").and_then(|hv| hv.to_str().ok()) {
        if let Some(ip) = h.split(',').next().and_then(|first| first.trim().parse::<IpAddr>().ok()) {
            return Some(ip);
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|hv| hv.to_str().ok())
        .and_then(|h| h.trim().parse::<IpAddr>().ok())
}

/// Like `ConnectInfo`, but never rejects when the connection info is absent (tests, custom services).
#[derive(Clone, Copy, Debug, Default)]
pub struct MaybeRemoteAddr(pub Option<SocketAddr>);

impl<S> FromRequestParts<S> for MaybeRemoteAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeRemoteAddr(parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0)))
    }
}

/// Resolved client address and user agent, as recorded in audit entries.
#[derive(Clone, Debug, Default)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_parts(headers: &HeaderMap, remote: Option<SocketAddr>, trust_proxy: bool) -> Self {
        Self {
            ip: resolve_client_ip(headers, remote.map(|a| a.ip()), trust_proxy).to_string(),
            user_agent: headers
                .get(axum::http::header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }
}

impl FromRequestParts<AppState> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let MaybeRemoteAddr(remote) = MaybeRemoteAddr::from_request_parts(parts, state).await?;
        Ok(ClientInfo::from_parts(&parts.headers, remote, state.config.server.trust_proxy))
    }
}
