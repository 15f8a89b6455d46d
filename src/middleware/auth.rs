use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::{
    auth::{bearer_token, AuthError, Claims},
    error::AppError,
    state::AppState,
};

/// Rejects requests without a valid `Authorization: Bearer <jwt>` header.
///
/// On success the decoded [`Claims`] are stored in the request extensions and
/// can be read by handlers through [`CurrentUser`].
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let token = bearer_token(req.headers()).ok_or(AuthError::MissingToken)?;
    let claims = state.jwt.verify(token)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Claims of the authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Claims);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AuthError::MissingToken.into())
    }
}
