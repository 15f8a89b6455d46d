use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    Json,
};

use crate::{
    auth::{self, LoginMeta},
    error::{AppError, AppResult},
    metrics::Metrics,
    middleware::{auth::CurrentUser, ip::ClientInfo},
    state::AppState,
    types::{Envelope, LoginRequest, UserDto},
};

pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = body.map_err(|rej| AppError::BadRequest(rej.body_text()))?;
    let meta = LoginMeta { ip: Some(client.ip), user_agent: client.user_agent };
    match auth::login(&state.db, &state.jwt, &req.email, &req.password, meta).await {
        Ok(token) => {
            Metrics::inc(&state.metrics.logins_ok);
            Ok(Json(token))
        }
        Err(e) => {
            if matches!(e, AppError::Unauthorized(_)) {
                Metrics::inc(&state.metrics.logins_failed);
            }
            Err(e)
        }
    }
}

pub async fn me(user: CurrentUser) -> impl IntoResponse {
    let CurrentUser(claims) = user;
    Json(Envelope::ok(UserDto { id: claims.sub, email: claims.email, role: claims.role }))
}
