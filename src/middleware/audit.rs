use axum::{
    extract::{connect_info::ConnectInfo, OriginalUri, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

use super::ip::ClientInfo;
use crate::{
    audit::{self, action_for_method, entity_id_from_path, AuditEntry, AuditedEntity},
    auth::Claims,
    state::AppState,
};

/// Records one audit entry per successful mutating request on the book routes.
///
/// Must run inside [`super::auth::require_auth`] so the caller's claims are available.
/// Failures to persist the entry are logged and do not affect the response.
pub async fn audit_mutations(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(action) = action_for_method(req.method()) else {
        return next.run(req).await;
    };

    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|u| u.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let remote = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0);
    let client = ClientInfo::from_parts(req.headers(), remote, state.config.server.trust_proxy);
    let user_id = req.extensions().get::<Claims>().map(|c| c.sub.clone());

    let res = next.run(req).await;
    if !res.status().is_success() {
        return res;
    }

    let entity_id = res
        .extensions()
        .get::<AuditedEntity>()
        .map(|e| e.0.clone())
        .or_else(|| entity_id_from_path(&path));
    let entry = AuditEntry {
        user_id,
        entity: "Book".to_string(),
        action,
        entity_id,
        meta: Some(serde_json::json!({ "path": path })),
        ip: Some(client.ip),
        user_agent: client.user_agent,
    };
    if let Err(e) = audit::record(&state.db, &entry).await {
        tracing::warn!(action = action.as_str(), path = %path, "failed to write audit entry: {}", e);
    }
    res
}
