use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use crate::{
    audit::AuditedEntity,
    books,
    error::{AppError, AppResult},
    listing::{single_value, ListingQuery},
    metrics::Metrics,
    middleware::auth::CurrentUser,
    state::AppState,
    types::{CreateBookRequest, UpdateBookRequest},
};

/// Builds the listing query from raw pairs. `includeDeleted=true` is only honoured for administrators.
fn scoped_query(pairs: &[(String, String)], user: &CurrentUser) -> ListingQuery {
    let mut query = ListingQuery::from_pairs(pairs);
    query.include_deleted = user.0.is_admin() && single_value(pairs, "includeDeleted").as_deref() == Some("true");
    query
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    body.map(|Json(v)| v).map_err(|rej| AppError::BadRequest(rej.body_text()))
}

pub async fn list_books(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(pairs): Query<Vec<(String, String)>>,
) -> AppResult<impl IntoResponse> {
    let query = scoped_query(&pairs, &user);
    let page = books::list(&state.db, &query).await?;
    Metrics::inc(&state.metrics.listings);
    Ok(Json(page))
}

pub async fn export_books(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(pairs): Query<Vec<(String, String)>>,
) -> AppResult<impl IntoResponse> {
    let query = scoped_query(&pairs, &user);
    let body = books::export_csv(&state.db, &query).await?;
    Metrics::inc(&state.metrics.exports);
    tracing::info!(user_id = %user.0.sub, bytes = body.len(), "books exported");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"books.csv\""),
        ],
        body,
    ))
}

pub async fn get_book(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<impl IntoResponse> {
    Ok(Json(books::find_one(&state.db, &id).await?))
}

pub async fn create_book(
    State(state): State<AppState>,
    body: Result<Json<CreateBookRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let input = json_body(body)?.validate()?;
    let book = books::create(&state.db, input).await?;
    Metrics::inc(&state.metrics.books_created);
    Ok((StatusCode::CREATED, Extension(AuditedEntity(book.id.clone())), Json(book)))
}

pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateBookRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let patch = json_body(body)?.validate()?;
    let book = books::update(&state.db, &id, patch).await?;
    Metrics::inc(&state.metrics.books_updated);
    Ok(Json(book))
}

pub async fn delete_book(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<impl IntoResponse> {
    let deleted = books::soft_delete(&state.db, &id).await?;
    Metrics::inc(&state.metrics.books_deleted);
    Ok(Json(deleted))
}
