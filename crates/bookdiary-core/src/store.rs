//! Unified storage interface
//!
//! The `Store` owns the entity store and the attachment store and exposes
//! the operations a presentation layer needs:
//! - inserts and updates go straight to the entity store
//! - deletes and edge changes go through the relationship manager
//! - `save()` commits everything pending, then reclaims released attachments
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = Store::open()?;
//!
//! let dune = store.insert_book(Book::new("Dune", "Herbert", 1965));
//! let scifi = store.insert_genre(Genre::new("Sci-Fi"));
//! store.set_genres(dune, &[scifi])?;
//! store.save()?;
//!
//! let books = store.query().books_in_genre(scifi)?;
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use crate::config::Config;
use crate::entity_store::{EntityStore, PendingChanges};
use crate::error::{Error, Result};
use crate::models::{
    AttachmentHandle, Book, BookId, Entity, Genre, GenreId, Note, NoteId,
};
use crate::query::QueryEngine;
use crate::relationships::RelationshipManager;
use crate::storage::{AttachmentStore, Persistence, SqlitePersistence, StorageError, StorageStats};

/// Unified storage interface for BookDiary
pub struct Store {
    entities: EntityStore,
    attachments: AttachmentStore,
    config: Config,
}

impl Store {
    /// Open the store using the configuration from the default location
    pub fn open() -> anyhow::Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config)
    }

    /// Open the store with a specific configuration
    ///
    /// Creates the database and attachment directory on first run.
    pub fn open_with_config(config: Config) -> anyhow::Result<Self> {
        let persistence = SqlitePersistence::open(&config.sqlite_path())
            .context("Failed to open SQLite database")?;
        Self::open_with_backend(config, Box::new(persistence))
    }

    /// Open the store over a caller-supplied persistence backend
    pub fn open_with_backend(
        config: Config,
        backend: Box<dyn Persistence>,
    ) -> anyhow::Result<Self> {
        let entities = EntityStore::open(backend).context("Failed to load records")?;
        let attachments = AttachmentStore::open(config.attachments_dir())
            .context("Failed to open attachment directory")?;

        info!("Opened store at {:?}", config.data_dir);
        Ok(Self {
            entities,
            attachments,
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check if the store holds no records
    pub fn is_new(&self) -> bool {
        self.book_count() == 0 && self.genre_count() == 0 && self.note_count() == 0
    }

    /// Direct access to the entity store
    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// Read-only queries over the working set
    pub fn query(&self) -> QueryEngine<'_> {
        QueryEngine::new(&self.entities)
    }

    fn relationships(&mut self) -> RelationshipManager<'_> {
        RelationshipManager::new(&mut self.entities)
    }

    // ==================== Mutation ====================

    /// Add a book
    pub fn insert_book(&mut self, book: Book) -> BookId {
        self.entities.insert(book)
    }

    /// Add a genre
    pub fn insert_genre(&mut self, genre: Genre) -> GenreId {
        self.entities.insert(genre)
    }

    /// Add a note, attaching it to the book given by [`Note::for_book`]
    ///
    /// Fails with `NotFound` before inserting anything if that book is missing.
    pub fn insert_note(&mut self, mut note: Note) -> Result<NoteId> {
        let owner = note.take_book();
        if let Some(book) = owner {
            self.entities.require::<Book>(book)?;
        }

        let id = self.entities.insert(note);
        if let Some(book) = owner {
            self.relationships().attach_note(id, book)?;
        }
        Ok(id)
    }

    /// Write a record's editable fields back
    pub fn update<E: Entity>(&mut self, record: &E) -> Result<()> {
        self.entities.update(record)
    }

    /// Delete a book together with its notes
    pub fn delete_book(&mut self, id: BookId) -> Result<()> {
        self.relationships().delete_book(id)
    }

    /// Delete a genre; tagged books are kept
    pub fn delete_genre(&mut self, id: GenreId) -> Result<()> {
        self.relationships().delete_genre(id)
    }

    pub fn delete_note(&mut self, id: NoteId) -> Result<()> {
        self.relationships().delete_note(id)
    }

    /// Replace a book's genres
    pub fn set_genres(&mut self, book: BookId, genres: &[GenreId]) -> Result<()> {
        self.relationships().set_genres(book, genres)
    }

    /// Attach a note to a book, moving it from any previous owner
    pub fn attach_note(&mut self, note: NoteId, book: BookId) -> Result<()> {
        self.relationships().attach_note(note, book)
    }

    pub fn detach_note(&mut self, note: NoteId) -> Result<()> {
        self.relationships().detach_note(note)
    }

    // ==================== Commit ====================

    /// Commit every pending change
    ///
    /// After a successful commit, attachments that no record references any
    /// more are removed from disk.
    pub fn save(&mut self) -> Result<()> {
        let released = self.entities.save()?;
        self.reclaim(released);
        Ok(())
    }

    /// Abandon every pending change
    pub fn discard_changes(&mut self) -> Result<()> {
        self.entities.discard_changes()
    }

    pub fn has_changes(&self) -> bool {
        self.entities.has_changes()
    }

    pub fn pending_changes(&self) -> PendingChanges {
        self.entities.pending_changes()
    }

    fn reclaim(&self, released: Vec<AttachmentHandle>) {
        if released.is_empty() {
            return;
        }

        let referenced = self.entities.referenced_attachments();
        for handle in released {
            if referenced.contains(&handle) {
                continue;
            }
            // The commit already succeeded; a leftover blob is swept later
            if let Err(e) = self.attachments.remove(handle) {
                warn!("Failed to remove attachment {}: {}", handle, e);
            }
        }
    }

    // ==================== Reads ====================

    /// Every live record of a type, in insertion order
    pub fn all<E: Entity>(&self) -> Vec<&E> {
        self.entities.all()
    }

    pub fn by_id<E: Entity>(&self, id: E::Id) -> Option<&E> {
        self.entities.get(id)
    }

    /// Records matching `predicate`, in insertion order
    pub fn filter<E: Entity>(&self, predicate: impl Fn(&E) -> bool) -> Vec<&E> {
        self.query().filter(predicate)
    }

    pub fn book_count(&self) -> usize {
        self.entities.count::<Book>()
    }

    pub fn genre_count(&self) -> usize {
        self.entities.count::<Genre>()
    }

    pub fn note_count(&self) -> usize {
        self.entities.count::<Note>()
    }

    // ==================== Attachments ====================

    /// Store blob bytes, returning a handle to put on a record
    pub fn put_attachment(&self, bytes: &[u8]) -> Result<AttachmentHandle> {
        Ok(self.attachments.put(bytes)?)
    }

    /// Copy a file into the attachment store
    pub fn import_attachment(&self, path: &Path) -> Result<AttachmentHandle> {
        Ok(self.attachments.import(path)?)
    }

    /// Read blob bytes back
    pub fn attachment(&self, handle: AttachmentHandle) -> Result<Vec<u8>> {
        self.attachments.get(handle).map_err(|e| match e {
            StorageError::NotFound { .. } => Error::AttachmentNotFound(handle),
            other => Error::Persistence(other),
        })
    }

    /// Remove blobs that no record references
    ///
    /// Blobs stored with `put_attachment` but not yet assigned to any record
    /// count as orphans, so run this with no assignment in flight. Returns
    /// the number of blobs removed.
    pub fn reclaim_orphaned_attachments(&self) -> Result<usize> {
        let referenced: HashSet<AttachmentHandle> = self.entities.referenced_attachments();
        let mut removed = 0;

        for handle in self.attachments.handles()? {
            if !referenced.contains(&handle) && self.attachments.remove(handle)? {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Reclaimed {} orphaned attachments", removed);
        }
        Ok(removed)
    }

    /// On-disk footprint of the database and attachments
    pub fn storage_stats(&self) -> StorageStats {
        let db_path = self.config.sqlite_path();
        let database_size = fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

        StorageStats {
            database_exists: db_path.exists(),
            database_size,
            attachment_count: self.attachments.handles().map(|h| h.len()).unwrap_or(0),
            attachment_size: self.attachments.total_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChangeSet, Snapshot, StorageResult};
    use std::cell::Cell;
    use std::io;
    use std::path::PathBuf;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            log_file: None,
        }
    }

    fn open(temp_dir: &TempDir) -> Store {
        Store::open_with_config(test_config(temp_dir)).unwrap()
    }

    #[test]
    fn test_open_creates_new_store() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let store = Store::open_with_config(config.clone()).unwrap();

        assert!(store.is_new());
        assert!(config.sqlite_path().exists());
        assert!(config.attachments_dir().is_dir());
    }

    #[test]
    fn test_genre_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        let dune = store.insert_book(Book::new("Dune", "Herbert", 1965));
        let scifi = store.insert_genre(Genre::new("Sci-Fi"));
        store.set_genres(dune, &[scifi]).unwrap();
        store.save().unwrap();

        let genre = store.query().genre_named("Sci-Fi").unwrap().id();
        let titles: Vec<_> = store
            .query()
            .books_in_genre(genre)
            .unwrap()
            .iter()
            .map(|b| b.title.clone())
            .collect();
        assert_eq!(titles, vec!["Dune"]);

        store.delete_book(dune).unwrap();
        store.save().unwrap();
        assert!(store.query().books_in_genre(genre).unwrap().is_empty());
    }

    #[test]
    fn test_note_cascade_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        let a = store.insert_book(Book::new("A", "Author", 2001));
        store.insert_note(Note::for_book(a, "n1", "")).unwrap();
        store.save().unwrap();

        store.delete_book(a).unwrap();
        store.save().unwrap();

        assert!(store.all::<Note>().iter().all(|n| n.title != "n1"));

        let reopened = open(&temp_dir);
        assert_eq!(reopened.note_count(), 0);
    }

    #[test]
    fn test_symmetry_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let (book, genre) = {
            let mut store = open(&temp_dir);
            let book = store.insert_book(Book::new("Dune", "Herbert", 1965));
            let genre = store.insert_genre(Genre::new("Sci-Fi"));
            store.set_genres(book, &[genre]).unwrap();
            store.save().unwrap();
            (book, genre)
        };

        let store = open(&temp_dir);
        assert_eq!(store.by_id::<Book>(book).unwrap().genres(), &[genre]);
        assert_eq!(store.by_id::<Genre>(genre).unwrap().books(), &[book]);
    }

    #[test]
    fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();

        {
            let mut store = open(&temp_dir);
            let a = store.insert_book(Book::new("First", "One", 1900));
            store.insert_book(Book::new("Second", "Two", -300));
            store.insert_note(Note::for_book(a, "n1", "body 1")).unwrap();
            store.insert_note(Note::for_book(a, "n2", "body 2")).unwrap();
            store.insert_note(Note::new("loose", "")).unwrap();
            store.save().unwrap();
        }

        let store = open(&temp_dir);
        let books = store.all::<Book>();
        let titles: Vec<_> = books.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
        assert_eq!(books[1].published_year, -300);

        let notes = store.query().notes_of_book(books[0].id()).unwrap();
        let note_titles: Vec<_> = notes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(note_titles, vec!["n1", "n2"]);
        assert_eq!(store.note_count(), 3);
    }

    #[test]
    fn test_tied_titles_keep_insertion_order_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = open(&temp_dir);
            store.insert_book(Book::new("Fox", "first", 2000));
            store.insert_book(Book::new("fox", "second", 2000));
            store.insert_book(Book::new("FOX", "third", 2000));
            store.save().unwrap();
        }

        for _ in 0..3 {
            let store = open(&temp_dir);
            let authors: Vec<_> = store
                .query()
                .books_with_title_containing("fox")
                .iter()
                .map(|b| b.author.clone())
                .collect();
            assert_eq!(authors, vec!["first", "second", "third"]);
        }
    }

    #[test]
    fn test_insert_note_for_missing_book() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        let err = store
            .insert_note(Note::for_book(BookId::new(), "n1", ""))
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.note_count(), 0);
    }

    #[test]
    fn test_unsaved_changes_are_not_durable() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = open(&temp_dir);
            store.insert_genre(Genre::new("Draft"));
            assert!(store.has_changes());
        }

        assert!(open(&temp_dir).is_new());
    }

    #[test]
    fn test_attachment_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(&temp_dir);

        let bytes = vec![0u8, 1, 2, 255, 254];
        let handle = store.put_attachment(&bytes).unwrap();
        assert_eq!(store.attachment(handle).unwrap(), bytes);

        let err = store.attachment(AttachmentHandle::new()).unwrap_err();
        assert!(matches!(err, Error::AttachmentNotFound(_)));
    }

    #[test]
    fn test_replaced_cover_is_reclaimed_after_save() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        let old = store.put_attachment(b"old cover").unwrap();
        let mut book = Book::new("Dune", "Herbert", 1965);
        book.set_cover(Some(old));
        let id = store.insert_book(book);
        store.save().unwrap();

        let new = store.put_attachment(b"new cover").unwrap();
        let mut book = store.by_id::<Book>(id).unwrap().clone();
        book.set_cover(Some(new));
        store.update(&book).unwrap();

        // Still readable until the change is committed
        assert!(store.attachment(old).is_ok());

        store.save().unwrap();
        assert!(store.attachment(old).unwrap_err().is_not_found());
        assert_eq!(store.attachment(new).unwrap(), b"new cover");
    }

    #[test]
    fn test_deleted_note_photo_is_reclaimed() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        let photo = store.put_attachment(b"photo").unwrap();
        let mut note = Note::new("n1", "");
        note.set_photo(Some(photo));
        let id = store.insert_note(note).unwrap();
        store.save().unwrap();

        store.delete_note(id).unwrap();
        store.save().unwrap();
        assert!(store.attachment(photo).is_err());
    }

    #[test]
    fn test_discard_keeps_released_attachment() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        let photo = store.put_attachment(b"photo").unwrap();
        let mut note = Note::new("n1", "");
        note.set_photo(Some(photo));
        let id = store.insert_note(note).unwrap();
        store.save().unwrap();

        store.delete_note(id).unwrap();
        store.discard_changes().unwrap();
        store.save().unwrap();

        assert!(store.by_id::<Note>(id).is_some());
        assert_eq!(store.attachment(photo).unwrap(), b"photo");
    }

    #[test]
    fn test_reclaim_orphaned_attachments() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        let kept = store.put_attachment(b"kept").unwrap();
        let orphan = store.put_attachment(b"orphan").unwrap();
        let mut book = Book::new("Dune", "Herbert", 1965);
        book.set_cover(Some(kept));
        store.insert_book(book);
        store.save().unwrap();

        assert_eq!(store.reclaim_orphaned_attachments().unwrap(), 1);
        assert!(store.attachment(kept).is_ok());
        assert!(store.attachment(orphan).is_err());
    }

    struct FailingCommits {
        inner: SqlitePersistence,
        failing: Rc<Cell<bool>>,
    }

    impl Persistence for FailingCommits {
        fn load(&mut self) -> StorageResult<Snapshot> {
            self.inner.load()
        }

        fn commit(&mut self, changes: &ChangeSet<'_>) -> StorageResult<()> {
            if self.failing.get() {
                return Err(StorageError::from_io(
                    io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
                    PathBuf::from("bookdiary.db"),
                ));
            }
            self.inner.commit(changes)
        }
    }

    #[test]
    fn test_failed_save_keeps_attachments_and_retries() {
        let temp_dir = TempDir::new().unwrap();
        let failing = Rc::new(Cell::new(false));
        let backend = FailingCommits {
            inner: SqlitePersistence::open_in_memory().unwrap(),
            failing: failing.clone(),
        };
        let mut store = Store::open_with_backend(test_config(&temp_dir), Box::new(backend)).unwrap();

        let cover = store.put_attachment(b"cover").unwrap();
        let mut book = Book::new("Dune", "Herbert", 1965);
        book.set_cover(Some(cover));
        let id = store.insert_book(book);
        store.save().unwrap();

        failing.set(true);
        store.delete_book(id).unwrap();
        let err = store.save().unwrap_err();
        assert!(err.is_retryable());
        assert!(store.has_changes());
        assert!(store.attachment(cover).is_ok());

        failing.set(false);
        store.save().unwrap();
        assert!(store.is_new());
        assert!(store.attachment(cover).is_err());
    }

    #[test]
    fn test_storage_stats() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(&temp_dir);
        store.put_attachment(&[7u8; 2048]).unwrap();

        let stats = store.storage_stats();
        assert!(stats.database_exists);
        assert!(stats.database_size > 0);
        assert_eq!(stats.attachment_count, 1);
        assert_eq!(stats.attachment_size, 2048);
    }
}
