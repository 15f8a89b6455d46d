use sqlx::SqlitePool;

/// Timestamp expression used for every `*_at` column (UTC, millisecond precision).
pub const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%fZ','now')";

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    // Pragmas for better durability/performance
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA synchronous=NORMAL;").execute(pool).await {
        tracing::warn!("Failed to set synchronous mode: {}", e);
    }
    sqlx::query("PRAGMA foreign_keys=ON;").execute(pool).await?;
    if let Err(e) = sqlx::query("PRAGMA busy_timeout=10000;").execute(pool).await {
        tracing::warn!("Failed to set busy_timeout: {}", e);
    }

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('admin', 'user')),
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            deleted_at TEXT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    // price is kept as text (normalized to two decimals) and cast for ordering;
    // *_search hold the Unicode-lowercased text columns matched by `q`
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            publisher TEXT NOT NULL,
            genre TEXT NOT NULL,
            price TEXT NOT NULL,
            available INTEGER NOT NULL DEFAULT 1,
            image_url TEXT NULL,
            title_search TEXT NOT NULL DEFAULT '',
            author_search TEXT NOT NULL DEFAULT '',
            publisher_search TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            deleted_at TEXT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            user_id TEXT NULL,
            entity TEXT NOT NULL,
            action TEXT NOT NULL,
            entity_id TEXT NULL,
            meta TEXT NULL,
            ip TEXT NULL,
            user_agent TEXT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        )"#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        ("idx_books_title", "CREATE INDEX IF NOT EXISTS idx_books_title ON books(title)"),
        ("idx_books_author", "CREATE INDEX IF NOT EXISTS idx_books_author ON books(author)"),
        ("idx_books_publisher", "CREATE INDEX IF NOT EXISTS idx_books_publisher ON books(publisher)"),
        ("idx_books_genre", "CREATE INDEX IF NOT EXISTS idx_books_genre ON books(genre)"),
        ("idx_books_available", "CREATE INDEX IF NOT EXISTS idx_books_available ON books(available)"),
        ("idx_books_created", "CREATE INDEX IF NOT EXISTS idx_books_created ON books(deleted_at, created_at DESC)"),
        ("idx_audit_entity_action", "CREATE INDEX IF NOT EXISTS idx_audit_entity_action ON audit_logs(entity, action)"),
        ("idx_audit_user", "CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_logs(user_id)"),
    ];

    for (name, query) in indexes {
        if let Err(e) = sqlx::query(query).execute(pool).await {
            tracing::warn!("Failed to create index {}: {}", name, e);
        }
    }

    Ok(())
}
