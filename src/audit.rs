//! Append-only audit trail for logins and book mutations.

use axum::http::Method;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Login => "LOGIN",
        }
    }
}

/// Maps a mutating HTTP method to its audit action. Safe methods yield `None`.
pub fn action_for_method(method: &Method) -> Option<AuditAction> {
    match *method {
        Method::GET | Method::HEAD | Method::OPTIONS => None,
        Method::POST => Some(AuditAction::Create),
        Method::DELETE => Some(AuditAction::Delete),
        _ => Some(AuditAction::Update),
    }
}

/// `/api/books/<id>` -> `Some("<id>")`. Collection paths and `export` yield `None`.
pub fn entity_id_from_path(path: &str) -> Option<String> {
    let mut segments = path.trim_matches('/').split('/').filter(|s| !s.is_empty());
    while let Some(seg) = segments.next() {
        if seg == "books" {
            return segments
                .next()
                .filter(|id| *id != "export")
                .map(str::to_string);
        }
    }
    None
}

/// Attached to a response by handlers that create an entity, so the audit layer
/// can record the id that was assigned.
#[derive(Debug, Clone)]
pub struct AuditedEntity(pub String);

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: Option<String>,
    pub entity: String,
    pub action: AuditAction,
    pub entity_id: Option<String>,
    pub meta: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

pub async fn record(db: &SqlitePool, entry: &AuditEntry) -> AppResult<()> {
    let meta = entry.meta.as_ref().map(|m| m.to_string());
    sqlx::query(
        "INSERT INTO audit_logs (id, user_id, entity, action, entity_id, meta, ip, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&entry.user_id)
    .bind(&entry.entity)
    .bind(entry.action.as_str())
    .bind(&entry.entity_id)
    .bind(meta)
    .bind(&entry.ip)
    .bind(&entry.user_agent)
    .execute(db)
    .await?;
    tracing::debug!(entity = %entry.entity, action = entry.action.as_str(), entity_id = ?entry.entity_id, "audit entry recorded");
    Ok(())
}
