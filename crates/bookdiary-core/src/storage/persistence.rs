//! SQLite persistence
//!
//! Loads the committed state into a [`Snapshot`] and writes a [`ChangeSet`]
//! back in a single transaction. Either every pending change lands or none
//! does.
//!
//! Storage location: `~/.local/share/bookdiary/bookdiary.db` (configurable via
//! `Config`)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, Transaction};
use tracing::debug;

use crate::models::{AttachmentHandle, Book, BookId, Genre, GenreId, Note, NoteId};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{init_schema, needs_init};

macro_rules! sql_uuid {
    ($($name:ty),*) => {$(
        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.to_string()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: uuid::Error| FromSqlError::Other(Box::new(e)))
            }
        }
    )*};
}

sql_uuid!(BookId, GenreId, NoteId, AttachmentHandle);

/// A record together with its insertion sequence number
#[derive(Debug, Clone)]
pub struct Stored<E> {
    pub seq: u64,
    pub record: E,
}

/// The complete committed state, with relationship collections populated
#[derive(Debug, Default)]
pub struct Snapshot {
    pub books: Vec<Stored<Book>>,
    pub genres: Vec<Stored<Genre>>,
    pub notes: Vec<Stored<Note>>,
}

/// A record to be inserted or updated by a commit
#[derive(Debug)]
pub struct Pending<'a, E> {
    pub seq: u64,
    pub record: &'a E,
    /// Position within the owning book's note list (notes only)
    pub position: Option<usize>,
}

/// Every change a single `save()` must write
#[derive(Debug, Default)]
pub struct ChangeSet<'a> {
    pub books: Vec<Pending<'a, Book>>,
    pub genres: Vec<Pending<'a, Genre>>,
    pub notes: Vec<Pending<'a, Note>>,
    pub deleted_books: Vec<BookId>,
    pub deleted_genres: Vec<GenreId>,
    pub deleted_notes: Vec<NoteId>,
}

impl ChangeSet<'_> {
    /// True when there is nothing to write
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
            && self.genres.is_empty()
            && self.notes.is_empty()
            && self.deleted_books.is_empty()
            && self.deleted_genres.is_empty()
            && self.deleted_notes.is_empty()
    }

    /// Number of rows touched (upserts plus deletes)
    pub fn len(&self) -> usize {
        self.books.len()
            + self.genres.len()
            + self.notes.len()
            + self.deleted_books.len()
            + self.deleted_genres.len()
            + self.deleted_notes.len()
    }
}

/// Durable backend behind the entity store
pub trait Persistence {
    /// Read the full committed state
    fn load(&mut self) -> StorageResult<Snapshot>;

    /// Write all changes atomically
    fn commit(&mut self, changes: &ChangeSet<'_>) -> StorageResult<()>;
}

/// SQLite-backed persistence
pub struct SqlitePersistence {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqlitePersistence {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        Self::prepare(conn, Some(path.to_path_buf()))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::prepare(Connection::open_in_memory()?, None)
    }

    fn prepare(conn: Connection, path: Option<PathBuf>) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        Ok(Self { conn, path })
    }

    /// Database file path (`None` for in-memory databases)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn load_books(&self) -> StorageResult<Vec<Stored<Book>>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, seq, title, author, published_year, cover, created_at, updated_at
             FROM books ORDER BY seq",
        )?;

        let books = stmt
            .query_map([], |row| {
                let mut book = Book::with_id(
                    row.get(0)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get(4)?,
                );
                book.cover = row.get(5)?;
                book.created_at = from_millis(row.get(6)?);
                book.updated_at = from_millis(row.get(7)?);
                Ok(Stored {
                    seq: row.get::<_, i64>(1)? as u64,
                    record: book,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(books)
    }

    fn load_genres(&self) -> StorageResult<Vec<Stored<Genre>>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, seq, name, created_at, updated_at FROM genres ORDER BY seq",
        )?;

        let genres = stmt
            .query_map([], |row| {
                let mut genre = Genre::with_id(row.get(0)?, row.get::<_, String>(2)?);
                genre.created_at = from_millis(row.get(3)?);
                genre.updated_at = from_millis(row.get(4)?);
                Ok(Stored {
                    seq: row.get::<_, i64>(1)? as u64,
                    record: genre,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(genres)
    }

    fn load_notes(&self) -> StorageResult<Vec<(Stored<Note>, Option<i64>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, seq, title, message, photo, book_id, book_position, created_at, updated_at
             FROM notes ORDER BY seq",
        )?;

        let notes = stmt
            .query_map([], |row| {
                let mut note = Note::with_id(
                    row.get(0)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                );
                note.photo = row.get(4)?;
                note.set_book(row.get(5)?);
                note.created_at = from_millis(row.get(7)?);
                note.updated_at = from_millis(row.get(8)?);
                let stored = Stored {
                    seq: row.get::<_, i64>(1)? as u64,
                    record: note,
                };
                Ok((stored, row.get(6)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    fn load_links<A: FromSql, B: FromSql>(&self, sql: &str) -> StorageResult<Vec<(A, B)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let links = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }
}

impl Persistence for SqlitePersistence {
    fn load(&mut self) -> StorageResult<Snapshot> {
        let mut books = self.load_books()?;
        let mut genres = self.load_genres()?;
        let notes = self.load_notes()?;

        let book_index: HashMap<BookId, usize> = books
            .iter()
            .enumerate()
            .map(|(i, stored)| (stored.record.id(), i))
            .collect();
        let genre_index: HashMap<GenreId, usize> = genres
            .iter()
            .enumerate()
            .map(|(i, stored)| (stored.record.id(), i))
            .collect();

        let book_genres: Vec<(BookId, GenreId)> = self.load_links(
            "SELECT book_id, genre_id FROM book_genres ORDER BY book_id, position",
        )?;
        for (book_id, genre_id) in book_genres {
            let i = *book_index.get(&book_id).ok_or_else(|| dangling("book_genres", book_id))?;
            books[i].record.genres_mut().push(genre_id);
        }

        let genre_books: Vec<(GenreId, BookId)> = self.load_links(
            "SELECT genre_id, book_id FROM genre_books ORDER BY genre_id, position",
        )?;
        for (genre_id, book_id) in genre_books {
            let i = *genre_index
                .get(&genre_id)
                .ok_or_else(|| dangling("genre_books", genre_id))?;
            genres[i].record.books_mut().push(book_id);
        }

        // Owned notes are attached in (position, seq) order
        let mut owned: Vec<(BookId, i64, u64, NoteId)> = notes
            .iter()
            .filter_map(|(stored, position)| {
                stored.record.book().map(|book| {
                    (
                        book,
                        position.unwrap_or(i64::MAX),
                        stored.seq,
                        stored.record.id(),
                    )
                })
            })
            .collect();
        owned.sort_by_key(|&(_, position, seq, _)| (position, seq));
        for (book_id, _, _, note_id) in owned {
            let i = *book_index.get(&book_id).ok_or_else(|| dangling("notes", book_id))?;
            books[i].record.notes_mut().push(note_id);
        }

        let snapshot = Snapshot {
            books,
            genres,
            notes: notes.into_iter().map(|(stored, _)| stored).collect(),
        };
        debug!(
            "Loaded {} books, {} genres, {} notes",
            snapshot.books.len(),
            snapshot.genres.len(),
            snapshot.notes.len()
        );
        Ok(snapshot)
    }

    fn commit(&mut self, changes: &ChangeSet<'_>) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        for id in &changes.deleted_notes {
            tx.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
        }
        for id in &changes.deleted_genres {
            tx.execute("DELETE FROM genres WHERE id = ?1", params![id])?;
        }
        for id in &changes.deleted_books {
            tx.execute("DELETE FROM books WHERE id = ?1", params![id])?;
        }

        for pending in &changes.books {
            upsert_book(&tx, pending)?;
        }
        for pending in &changes.genres {
            upsert_genre(&tx, pending)?;
        }
        for pending in &changes.notes {
            upsert_note(&tx, pending)?;
        }

        for pending in &changes.books {
            write_book_links(&tx, pending.record)?;
        }
        for pending in &changes.genres {
            write_genre_links(&tx, pending.record)?;
        }

        // Deferred foreign keys are checked here
        tx.commit()?;
        Ok(())
    }
}

// ==================== Transaction helpers ====================

fn upsert_book(tx: &Transaction, pending: &Pending<'_, Book>) -> rusqlite::Result<()> {
    let book = pending.record;
    tx.execute(
        r#"
        INSERT INTO books (id, seq, title, author, published_year, cover, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            author = excluded.author,
            published_year = excluded.published_year,
            cover = excluded.cover,
            updated_at = excluded.updated_at
        "#,
        params![
            book.id(),
            pending.seq as i64,
            book.title,
            book.author,
            book.published_year,
            book.cover,
            book.created_at.timestamp_millis(),
            book.updated_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}

fn upsert_genre(tx: &Transaction, pending: &Pending<'_, Genre>) -> rusqlite::Result<()> {
    let genre = pending.record;
    tx.execute(
        r#"
        INSERT INTO genres (id, seq, name, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            updated_at = excluded.updated_at
        "#,
        params![
            genre.id(),
            pending.seq as i64,
            genre.name,
            genre.created_at.timestamp_millis(),
            genre.updated_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}

fn upsert_note(tx: &Transaction, pending: &Pending<'_, Note>) -> rusqlite::Result<()> {
    let note = pending.record;
    tx.execute(
        r#"
        INSERT INTO notes (id, seq, title, message, photo, book_id, book_position, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            message = excluded.message,
            photo = excluded.photo,
            book_id = excluded.book_id,
            book_position = excluded.book_position,
            updated_at = excluded.updated_at
        "#,
        params![
            note.id(),
            pending.seq as i64,
            note.title,
            note.message,
            note.photo,
            note.book(),
            pending.position.map(|p| p as i64),
            note.created_at.timestamp_millis(),
            note.updated_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}

/// Rewrite the book side of its genre links and the order of its notes
fn write_book_links(tx: &Transaction, book: &Book) -> rusqlite::Result<()> {
    tx.execute(
        "DELETE FROM book_genres WHERE book_id = ?1",
        params![book.id()],
    )?;
    for (position, genre_id) in book.genres().iter().enumerate() {
        tx.execute(
            "INSERT INTO book_genres (book_id, genre_id, position) VALUES (?1, ?2, ?3)",
            params![book.id(), genre_id, position as i64],
        )?;
    }

    for (position, note_id) in book.notes().iter().enumerate() {
        tx.execute(
            "UPDATE notes SET book_position = ?2 WHERE id = ?1 AND book_id = ?3",
            params![note_id, position as i64, book.id()],
        )?;
    }
    Ok(())
}

/// Rewrite the genre side of its book links
fn write_genre_links(tx: &Transaction, genre: &Genre) -> rusqlite::Result<()> {
    tx.execute(
        "DELETE FROM genre_books WHERE genre_id = ?1",
        params![genre.id()],
    )?;
    for (position, book_id) in genre.books().iter().enumerate() {
        tx.execute(
            "INSERT INTO genre_books (genre_id, book_id, position) VALUES (?1, ?2, ?3)",
            params![genre.id(), book_id, position as i64],
        )?;
    }
    Ok(())
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

fn dangling(table: &'static str, id: impl std::fmt::Display) -> StorageError {
    StorageError::InvalidRecord {
        table,
        details: format!("reference to missing record {}", id),
    }
}
