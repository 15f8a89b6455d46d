//! Credentials, JWT issuing/verification and user persistence.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction, AuditEntry},
    config::AuthConfig,
    error::{AppError, AppResult},
    types::{LoginResponse, UserDto},
};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        if let AuthError::InvalidToken(inner) = &err {
            tracing::debug!("token rejected: {}", inner);
        }
        AppError::Unauthorized(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

/// JWT payload. `sub` is the user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// HS256 signing and verification keys derived from the configured secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl JwtKeys {
    pub fn new(secret: &[u8], ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    pub fn from_config(cfg: &AuthConfig) -> Self {
        Self::new(cfg.jwt_secret.as_bytes(), cfg.token_ttl_secs)
    }

    pub fn issue(&self, user: &UserDto) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now.saturating_add(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX)),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

/// Cost used when `auth.bcrypt_cost` is not configured.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Work factors bcrypt accepts.
pub const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// Stored form: a bcrypt hash string (`$2b$<cost>$...`) carrying its own salt.
pub fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    bcrypt::hash(password, cost).map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))
}

/// False for a wrong password and for a stored value that is not a bcrypt hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

// bcrypt is CPU-bound; keep it off the async workers
async fn run_blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password task failed: {}", e)))
}

struct UserRecord {
    user: UserDto,
    password_hash: String,
}

async fn find_user_by_email(db: &SqlitePool, email: &str) -> AppResult<Option<UserRecord>> {
    let row = sqlx::query(
        "SELECT id, email, password_hash, role FROM users WHERE email = ?1 AND deleted_at IS NULL",
    )
    .bind(email)
    .fetch_optional(db)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let role_raw: String = row.try_get("role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown role '{}' for user", role_raw)))?;
    Ok(Some(UserRecord {
        user: UserDto { id: row.try_get("id")?, email: row.try_get("email")?, role },
        password_hash: row.try_get("password_hash")?,
    }))
}

pub async fn create_user(db: &SqlitePool, email: &str, password: &str, role: Role, cost: u32) -> AppResult<UserDto> {
    let email = email.trim();
    if !email.contains('@') {
        return Err(AppError::validation("email", "must be an email address"));
    }
    if password.chars().count() < 8 {
        return Err(AppError::validation("password", "must be at least 8 characters"));
    }
    let plain = password.to_string();
    let password_hash = run_blocking(move || hash_password(&plain, cost)).await??;
    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO users (id, email, password_hash, role) VALUES (?1, ?2, ?3, ?4)")
        .bind(&id)
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .execute(db)
        .await?;
    Ok(UserDto { id, email: email.to_string(), role })
}

/// Creates the configured admin account unless a user with that email already exists.
pub async fn seed_admin(db: &SqlitePool, cfg: &AuthConfig) -> AppResult<()> {
    let (Some(email), Some(password)) = (cfg.admin_email.as_deref(), cfg.admin_password.as_deref()) else {
        tracing::debug!("no admin credentials configured, skipping admin seed");
        return Ok(());
    };
    if find_user_by_email(db, email).await?.is_some() {
        tracing::debug!(%email, "admin user already present");
        return Ok(());
    }
    let admin = create_user(db, email, password, Role::Admin, cfg.bcrypt_cost).await?;
    tracing::info!(user_id = %admin.id, email = %admin.email, "seeded admin user");
    Ok(())
}

/// Request metadata recorded with the login audit entry.
#[derive(Debug, Clone, Default)]
pub struct LoginMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

pub async fn login(
    db: &SqlitePool,
    keys: &JwtKeys,
    email: &str,
    password: &str,
    meta: LoginMeta,
) -> AppResult<LoginResponse> {
    let verified = match find_user_by_email(db, email.trim()).await? {
        Some(UserRecord { user, password_hash }) => {
            let plain = password.to_string();
            run_blocking(move || verify_password(&plain, &password_hash)).await?.then_some(user)
        }
        None => None,
    };
    let Some(user) = verified else {
        tracing::warn!(email = %email, ip = ?meta.ip, "login failed");
        return Err(AuthError::InvalidCredentials.into());
    };

    let access_token = keys.issue(&user).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

    let entry = AuditEntry {
        user_id: Some(user.id.clone()),
        entity: "Auth".to_string(),
        action: AuditAction::Login,
        entity_id: None,
        meta: Some(serde_json::json!({ "ip": meta.ip, "ua": meta.user_agent })),
        ip: meta.ip,
        user_agent: meta.user_agent,
    };
    if let Err(e) = audit::record(db, &entry).await {
        tracing::warn!(user_id = %user.id, "failed to write login audit entry: {}", e);
    }

    tracing::info!(user_id = %user.id, "login succeeded");
    Ok(LoginResponse { access_token })
}

/// Returns the value of `Authorization: Bearer <token>`, if present.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hashes_are_salted_bcrypt() {
        let a = hash_password("admin1234", 4).unwrap();
        let b = hash_password("admin1234", 4).unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$2b$04$"), "unexpected hash format: {a}");
        assert!(verify_password("admin1234", &a));
        assert!(verify_password("admin1234", &b));
        assert!(!verify_password("admin12345", &a));
        assert!(!verify_password("admin1234", "no-separator"));
    }

    #[test]
    fn hash_records_configured_cost() {
        let hash = hash_password("reader1234", DEFAULT_BCRYPT_COST).unwrap();
        assert!(hash.starts_with("$2b$10$"));
        assert!(verify_password("reader1234", &hash));
        assert!(hash_password("x", 3).is_err());
    }

    #[test]
    fn token_issue_and_verify() {
        let keys = JwtKeys::new(b"0123456789abcdef0123", 3600);
        let user = UserDto { id: "u1".into(), email: "a@b.c".into(), role: Role::Admin };
        let token = keys.issue(&user).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, Role::Admin);
        assert!(claims.is_admin());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let user = UserDto { id: "u1".into(), email: "a@b.c".into(), role: Role::User };
        let token = JwtKeys::new(b"first-secret-0123456", 60).issue(&user).unwrap();
        let err = JwtKeys::new(b"other-secret-0123456", 60).verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
        assert!(JwtKeys::new(b"first-secret-0123456", 60).verify("garbage").is_err());
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = axum::http::HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }
}
