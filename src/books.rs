//! Book persistence: listing, CSV export and CRUD with soft delete.

use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    db::NOW_SQL,
    error::{AppError, AppResult, OptionExt},
    listing::{build_filter, build_order, paginate, push_order, ListingQuery, Page},
    types::{Book, CreateBookRequest, DeleteBookResponse, UpdateBookRequest},
};

const BOOK_COLUMNS: &str =
    "id, title, author, publisher, genre, price, available, image_url, created_at, updated_at, deleted_at";

/// Limit requested by the CSV export. `paginate` still caps it at `MAX_LIMIT`.
pub const EXPORT_LIMIT: i64 = 10_000;

pub const CSV_HEADER: [&str; 7] = ["id", "title", "author", "publisher", "price", "available", "genre"];

const MAX_TEXT_LEN: usize = 255;

fn book_from_row(row: &SqliteRow) -> Result<Book, sqlx::Error> {
    Ok(Book {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        publisher: row.try_get("publisher")?,
        genre: row.try_get("genre")?,
        price: row.try_get("price")?,
        available: row.try_get::<i64, _>("available")? != 0,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

pub async fn list(db: &SqlitePool, query: &ListingQuery) -> AppResult<Page<Book>> {
    let filter = build_filter(query);
    let order = build_order(query.sort.as_deref());
    let pagination = paginate(query.page.as_deref(), query.limit.as_deref());

    let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS cnt FROM books");
    filter.push_where(&mut count_qb);
    let total: i64 = count_qb.build().fetch_one(db).await?.try_get("cnt")?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM books", BOOK_COLUMNS));
    filter.push_where(&mut qb);
    push_order(&order, &mut qb);
    qb.push(" LIMIT ").push_bind(pagination.limit).push(" OFFSET ").push_bind(pagination.offset);

    let rows = qb.build().fetch_all(db).await?;
    let items = rows.iter().map(book_from_row).collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(items, total, pagination))
}

pub async fn export_csv(db: &SqlitePool, query: &ListingQuery) -> AppResult<String> {
    let mut export_query = query.clone();
    export_query.page = Some("1".to_string());
    export_query.limit = Some(EXPORT_LIMIT.to_string());
    let page = list(db, &export_query).await?;
    to_csv(&page.items)
}

/// Serializes books with a header row, `\n` terminators and minimal quoting.
pub fn to_csv(books: &[Book]) -> AppResult<String> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    wtr.write_record(CSV_HEADER)?;
    for b in books {
        let available = if b.available { "true" } else { "false" };
        wtr.write_record([
            b.id.as_str(),
            b.title.as_str(),
            b.author.as_str(),
            b.publisher.as_str(),
            b.price.as_str(),
            available,
            b.genre.as_str(),
        ])?;
    }
    let bytes = wtr.into_inner().map_err(|e| anyhow::anyhow!("CSV flush failed: {}", e.error()))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(e.into()))
}

pub async fn find_one(db: &SqlitePool, id: &str) -> AppResult<Book> {
    let row = sqlx::query(&format!("SELECT {} FROM books WHERE id = ?1 AND deleted_at IS NULL", BOOK_COLUMNS))
        .bind(id)
        .fetch_optional(db)
        .await?;
    row.as_ref().map(book_from_row).transpose()?.ok_or_not_found("Book")
}

async fn find_active_in(conn: &mut SqliteConnection, id: &str) -> AppResult<Option<Book>> {
    let row = sqlx::query(&format!("SELECT {} FROM books WHERE id = ?1 AND deleted_at IS NULL", BOOK_COLUMNS))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.as_ref().map(book_from_row).transpose()?)
}

/// A create request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub genre: String,
    pub price: String,
    pub available: bool,
    pub image_url: Option<String>,
}

impl CreateBookRequest {
    pub fn validate(self) -> AppResult<NewBook> {
        Ok(NewBook {
            title: validate_title(&self.title)?,
            author: validate_text("author", &self.author)?,
            publisher: validate_text("publisher", &self.publisher)?,
            genre: validate_text("genre", &self.genre)?,
            price: normalize_price(&self.price.as_text())?,
            available: self.available,
            image_url: self.image_url.map(|u| validate_image_url(&u)).transpose()?,
        })
    }
}

/// An update request that passed validation; `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    pub price: Option<String>,
    pub available: Option<bool>,
    pub image_url: Option<Option<String>>,
}

impl BookPatch {
    pub fn is_empty(&self) -> bool {
        *self == BookPatch::default()
    }
}

impl UpdateBookRequest {
    pub fn validate(self) -> AppResult<BookPatch> {
        Ok(BookPatch {
            title: self.title.as_deref().map(validate_title).transpose()?,
            author: self.author.as_deref().map(|v| validate_text("author", v)).transpose()?,
            publisher: self.publisher.as_deref().map(|v| validate_text("publisher", v)).transpose()?,
            genre: self.genre.as_deref().map(|v| validate_text("genre", v)).transpose()?,
            price: self.price.map(|p| normalize_price(&p.as_text())).transpose()?,
            available: self.available,
            image_url: match self.image_url {
                Some(Some(url)) => Some(Some(validate_image_url(&url)?)),
                Some(None) => Some(None),
                None => None,
            },
        })
    }
}

fn validate_title(value: &str) -> AppResult<String> {
    if value.trim().is_empty() {
        return Err(AppError::validation("title", "must not be empty"));
    }
    validate_text("title", value)
}

fn validate_text(field: &str, value: &str) -> AppResult<String> {
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(AppError::validation(field, format!("must be at most {} characters", MAX_TEXT_LEN)));
    }
    if value.contains('\0') {
        return Err(AppError::validation(field, "contains null characters"));
    }
    Ok(value.to_string())
}

fn validate_image_url(value: &str) -> AppResult<String> {
    validate_text("imageUrl", value)
}

/// Parses a decimal price and renders it with exactly two fractional digits (`DECIMAL(10,2)`).
pub fn normalize_price(raw: &str) -> AppResult<String> {
    let value = Decimal::from_str(raw.trim())
        .map_err(|_| AppError::validation("price", format!("'{}' is not a decimal number", raw)))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AppError::validation("price", "must not be negative"));
    }
    let rounded = value.round_dp(2);
    if rounded >= Decimal::new(100_000_000, 0) {
        return Err(AppError::validation("price", "must be below 100000000"));
    }
    Ok(format!("{:.2}", rounded))
}

pub async fn create(db: &SqlitePool, book: NewBook) -> AppResult<Book> {
    let id = Uuid::new_v4().to_string();
    let mut tx = db.begin().await?;
    sqlx::query(
        r#"INSERT INTO books (id, title, author, publisher, genre, price, available, image_url,
                              title_search, author_search, publisher_search)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
    )
    .bind(&id)
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.publisher)
    .bind(&book.genre)
    .bind(&book.price)
    .bind(book.available)
    .bind(&book.image_url)
    .bind(book.title.to_lowercase())
    .bind(book.author.to_lowercase())
    .bind(book.publisher.to_lowercase())
    .execute(&mut *tx)
    .await?;
    let created = find_active_in(&mut tx, &id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("inserted book {} not readable", id)))?;
    tx.commit().await?;

    tracing::info!(book_id = %created.id, title = %created.title, "book created");
    Ok(created)
}

pub async fn update(db: &SqlitePool, id: &str, patch: BookPatch) -> AppResult<Book> {
    let mut tx = db.begin().await?;
    let current = find_active_in(&mut tx, id).await?.ok_or_not_found("Book")?;
    if patch.is_empty() {
        tx.commit().await?;
        return Ok(current);
    }

    let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE books SET updated_at = {}", NOW_SQL));
    if let Some(title) = patch.title {
        qb.push(", title_search = ").push_bind(title.to_lowercase());
        qb.push(", title = ").push_bind(title);
    }
    if let Some(author) = patch.author {
        qb.push(", author_search = ").push_bind(author.to_lowercase());
        qb.push(", author = ").push_bind(author);
    }
    if let Some(publisher) = patch.publisher {
        qb.push(", publisher_search = ").push_bind(publisher.to_lowercase());
        qb.push(", publisher = ").push_bind(publisher);
    }
    if let Some(genre) = patch.genre {
        qb.push(", genre = ").push_bind(genre);
    }
    if let Some(price) = patch.price {
        qb.push(", price = ").push_bind(price);
    }
    if let Some(available) = patch.available {
        qb.push(", available = ").push_bind(available);
    }
    if let Some(image_url) = patch.image_url {
        qb.push(", image_url = ").push_bind(image_url);
    }
    qb.push(" WHERE id = ").push_bind(id.to_string()).push(" AND deleted_at IS NULL");
    qb.build().execute(&mut *tx).await?;

    let updated = find_active_in(&mut tx, id).await?.ok_or_not_found("Book")?;
    tx.commit().await?;

    tracing::info!(book_id = %id, "book updated");
    Ok(updated)
}

pub async fn soft_delete(db: &SqlitePool, id: &str) -> AppResult<DeleteBookResponse> {
    let mut tx = db.begin().await?;
    let result = sqlx::query(&format!(
        "UPDATE books SET deleted_at = {now}, updated_at = {now} WHERE id = ?1 AND deleted_at IS NULL",
        now = NOW_SQL
    ))
    .bind(id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Book not found".to_string()));
    }
    tx.commit().await?;

    tracing::info!(book_id = %id, "book soft-deleted");
    Ok(DeleteBookResponse { id: id.to_string(), deleted: true })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: &str, title: &str, available: bool) -> Book {
        Book {
            id: id.into(),
            title: title.into(),
            author: "AA".into(),
            publisher: "P1".into(),
            genre: "G".into(),
            price: "10.00".into(),
            available,
            image_url: None,
            created_at: "2025-01-01T00:00:00.000Z".into(),
            updated_at: "2025-01-01T00:00:00.000Z".into(),
            deleted_at: None,
        }
    }

    #[test]
    fn csv_single_book() {
        let csv = to_csv(&[book("1", "A", true)]).unwrap();
        assert_eq!(csv, "id,title,author,publisher,price,available,genre\n1,A,AA,P1,10.00,true,G\n");
    }

    #[test]
    fn csv_quotes_embedded_commas_and_quotes() {
        let csv = to_csv(&[book("2", "Hello, \"World\"", false)]).unwrap();
        assert_eq!(
            csv,
            "id,title,author,publisher,price,available,genre\n2,\"Hello, \"\"World\"\"\",AA,P1,10.00,false,G\n"
        );
    }

    #[test]
    fn csv_without_rows_has_header() {
        assert_eq!(to_csv(&[]).unwrap(), "id,title,author,publisher,price,available,genre\n");
    }

    #[test]
    fn price_is_normalized_to_two_decimals() {
        assert_eq!(normalize_price("10").unwrap(), "10.00");
        assert_eq!(normalize_price(" 12990.5 ").unwrap(), "12990.50");
        assert_eq!(normalize_price("1.239").unwrap(), "1.24");
        assert_eq!(normalize_price("0").unwrap(), "0.00");
    }

    #[test]
    fn price_rejects_garbage_and_negatives() {
        for raw in ["abc", "", "-1", "1.2.3", "100000000"] {
            match normalize_price(raw) {
                Err(AppError::ValidationError { field, .. }) => assert_eq!(field, "price"),
                other => panic!("expected price validation error for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn create_request_requires_title() {
        let req = CreateBookRequest {
            title: "   ".into(),
            author: "a".into(),
            publisher: "p".into(),
            genre: "g".into(),
            price: crate::types::PriceInput::Text("1".into()),
            available: true,
            image_url: None,
        };
        assert!(matches!(req.validate(), Err(AppError::ValidationError { field, .. }) if field == "title"));
    }

    #[test]
    fn update_request_distinguishes_null_image() {
        let patch: UpdateBookRequest = serde_json::from_str(r#"{"imageUrl": null}"#).unwrap();
        assert_eq!(patch.validate().unwrap().image_url, Some(None));
        let patch: UpdateBookRequest = serde_json::from_str(r#"{"price": 5}"#).unwrap();
        let patch = patch.validate().unwrap();
        assert_eq!(patch.image_url, None);
        assert_eq!(patch.price.as_deref(), Some("5.00"));
        assert!(UpdateBookRequest::default().validate().unwrap().is_empty());
    }
}
