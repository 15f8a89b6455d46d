//! Listing query builder for the book collection.
//!
//! Turns an untrusted, query-string-shaped [`ListingQuery`] into a filter, an
//! ordering and a page window. Nothing in here rejects input: malformed
//! filters, sort expressions and pagination values degrade to defaults.

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

const LIKE_ESCAPE: char = '!';

/// Raw listing parameters as they arrive on `GET /api/books` and `/api/books/export`.
#[derive(Debug, Clone, Default)]
pub struct ListingQuery {
    pub q: Option<String>,
    pub genre: Option<String>,
    pub publisher: Option<String>,
    pub author: Option<String>,
    pub available: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
    /// Never read from the query string; handlers set it for administrators.
    pub include_deleted: bool,
}

impl ListingQuery {
    /// Folds raw query-string pairs into a query. A key that appears more than
    /// once is not a single string value and is dropped, so its default applies.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        ListingQuery {
            q: single_value(pairs, "q"),
            genre: single_value(pairs, "genre"),
            publisher: single_value(pairs, "publisher"),
            author: single_value(pairs, "author"),
            available: single_value(pairs, "available"),
            page: single_value(pairs, "page"),
            limit: single_value(pairs, "limit"),
            sort: single_value(pairs, "sort"),
            include_deleted: false,
        }
    }
}

/// The value of `key` when it occurs exactly once in `pairs`.
pub fn single_value(pairs: &[(String, String)], key: &str) -> Option<String> {
    let mut values = pairs.iter().filter(|(k, _)| k == key).map(|(_, v)| v);
    match (values.next(), values.next()) {
        (Some(v), None) => Some(v.clone()),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Title,
    Author,
    Publisher,
    Price,
    Available,
    Genre,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    /// Whitelist lookup. Names are the public (camelCase) field names and match exactly.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "title" => Some(SortField::Title),
            "author" => Some(SortField::Author),
            "publisher" => Some(SortField::Publisher),
            "price" => Some(SortField::Price),
            "available" => Some(SortField::Available),
            "genre" => Some(SortField::Genre),
            "createdAt" => Some(SortField::CreatedAt),
            "updatedAt" => Some(SortField::UpdatedAt),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Author => "author",
            SortField::Publisher => "publisher",
            SortField::Price => "price",
            SortField::Available => "available",
            SortField::Genre => "genre",
            SortField::CreatedAt => "createdAt",
            SortField::UpdatedAt => "updatedAt",
        }
    }

    /// SQL expression to order by. Price is stored as text and must sort numerically.
    pub fn column(self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Author => "author",
            SortField::Publisher => "publisher",
            SortField::Price => "CAST(price AS REAL)",
            SortField::Available => "available",
            SortField::Genre => "genre",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Only `asc` (any case) is ascending; everything else, including empty, is descending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(dir) if dir.eq_ignore_ascii_case("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortKey {
    pub const fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::new(SortField::CreatedAt, SortDirection::Desc)
    }
}

/// Parses `field:direction[,field:direction...]`, dropping pairs outside the whitelist.
pub fn build_order(sort: Option<&str>) -> Vec<SortKey> {
    let mut order = Vec::new();
    for pair in sort.unwrap_or("").split(',') {
        let mut parts = pair.split(':').map(str::trim);
        let Some(field) = parts.next().and_then(SortField::parse) else {
            continue;
        };
        order.push(SortKey::new(field, SortDirection::parse(parts.next())));
    }
    if order.is_empty() {
        order.push(SortKey::default());
    }
    order
}

/// Conditions derived from a [`ListingQuery`]. All of them are ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    /// Substring matched against title, author or publisher, with Unicode case folding.
    pub search: Option<String>,
    pub genre: Option<String>,
    pub publisher: Option<String>,
    pub author: Option<String>,
    pub available: Option<bool>,
    pub include_deleted: bool,
}

/// Empty strings count as absent. `available` only filters for the exact
/// lowercase strings `true` and `false`; `TRUE` or `1` leave it unfiltered.
pub fn build_filter(query: &ListingQuery) -> BookFilter {
    BookFilter {
        search: non_empty(&query.q),
        genre: non_empty(&query.genre),
        publisher: non_empty(&query.publisher),
        author: non_empty(&query.author),
        available: match query.available.as_deref() {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        },
        include_deleted: query.include_deleted,
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

impl BookFilter {
    /// Appends ` WHERE ...` for the `books` table. Every user value is bound, never inlined.
    pub fn push_where<'a>(&self, qb: &mut QueryBuilder<'a, Sqlite>) {
        qb.push(" WHERE ");
        if self.include_deleted {
            qb.push("1 = 1");
        } else {
            qb.push("deleted_at IS NULL");
        }

        // the *_search columns are stored lowercased, so lowercasing the term is the whole fold
        if let Some(term) = &self.search {
            let pattern = format!("%{}%", escape_like_pattern(&term.to_lowercase()));
            qb.push(" AND (title_search LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '!' OR author_search LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '!' OR publisher_search LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '!')");
        }
        if let Some(genre) = &self.genre {
            qb.push(" AND genre = ").push_bind(genre.clone());
        }
        if let Some(publisher) = &self.publisher {
            qb.push(" AND publisher = ").push_bind(publisher.clone());
        }
        if let Some(author) = &self.author {
            qb.push(" AND author = ").push_bind(author.clone());
        }
        if let Some(available) = self.available {
            qb.push(" AND available = ").push_bind(available);
        }
    }
}

/// Appends ` ORDER BY ...`. Columns come from the whitelist, so they are pushed verbatim.
pub fn push_order<'a>(order: &[SortKey], qb: &mut QueryBuilder<'a, Sqlite>) {
    qb.push(" ORDER BY ");
    for (i, key) in order.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(key.field.column()).push(" ").push(key.direction.sql());
    }
}

fn escape_like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            out.push(LIKE_ESCAPE);
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub offset: i64,
}

pub fn paginate(page: Option<&str>, limit: Option<&str>) -> Pagination {
    let page = page.and_then(parse_leading_int).filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE);
    let limit = limit
        .and_then(parse_leading_int)
        .filter(|l| *l > 0)
        .map(|l| l.min(MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT);
    Pagination { page, limit, offset: (page - 1).saturating_mul(limit) }
}

/// Reads the leading integer of `raw` the way a lenient form parser would:
/// `" 12"` -> 12, `"2abc"` -> 2, `"1.5"` -> 1, `"abc"` -> None. Saturates on overflow.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let digits: &str = &digits[..digits.bytes().take_while(u8::is_ascii_digit).count()];
    if digits.is_empty() {
        return None;
    }
    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

/// `ceil(total / limit)`, and 1 for an empty result.
pub fn total_pages(total: i64, limit: i64) -> i64 {
    if total <= 0 || limit <= 0 {
        return 1;
    }
    (total + limit - 1) / limit
}

/// A page of results plus pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
            total_pages: total_pages(total, pagination.limit),
        }
    }
}
