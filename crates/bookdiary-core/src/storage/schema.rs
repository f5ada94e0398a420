//! SQLite schema for durable storage
//!
//! Both sides of the Book/Genre association are stored (`book_genres` and
//! `genre_books`) so each list keeps its own order across reloads. Foreign
//! keys are deferred to commit time: a transaction may write rows in any
//! order, but it cannot commit a dangling reference.

use rusqlite::{Connection, Result};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY,
            seq INTEGER NOT NULL,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            published_year INTEGER NOT NULL,
            cover TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS genres (
            id TEXT PRIMARY KEY,
            seq INTEGER NOT NULL,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Notes are owned by at most one book
        CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            seq INTEGER NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            photo TEXT,
            book_id TEXT,
            book_position INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (book_id) REFERENCES books(id)
                ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED
        );

        -- Book side of the many-to-many association
        CREATE TABLE IF NOT EXISTS book_genres (
            book_id TEXT NOT NULL,
            genre_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (book_id, genre_id),
            FOREIGN KEY (book_id) REFERENCES books(id)
                ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
            FOREIGN KEY (genre_id) REFERENCES genres(id)
                ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED
        );

        -- Genre side of the many-to-many association
        CREATE TABLE IF NOT EXISTS genre_books (
            genre_id TEXT NOT NULL,
            book_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (genre_id, book_id),
            FOREIGN KEY (genre_id) REFERENCES genres(id)
                ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
            FOREIGN KEY (book_id) REFERENCES books(id)
                ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED
        );

        -- Insertion order
        CREATE INDEX IF NOT EXISTS idx_books_seq ON books(seq);
        CREATE INDEX IF NOT EXISTS idx_genres_seq ON genres(seq);
        CREATE INDEX IF NOT EXISTS idx_notes_seq ON notes(seq);

        -- Reverse lookups
        CREATE INDEX IF NOT EXISTS idx_notes_book_id ON notes(book_id);
        CREATE INDEX IF NOT EXISTS idx_book_genres_genre_id ON book_genres(genre_id);
        CREATE INDEX IF NOT EXISTS idx_genre_books_book_id ON genre_books(book_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if the schema needs to be created
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}
