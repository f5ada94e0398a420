//! BookDiary Core Library
//!
//! Persistence core for BookDiary, a personal reading diary of books,
//! genres and notes.
//!
//! # Architecture
//!
//! - **EntityStore**: in-memory records with New/Clean/Modified/Deleted
//!   tracking, committed to SQLite in one transaction per `save()`
//! - **RelationshipManager**: the single path that changes Book/Genre and
//!   Book/Note edges, applying cascade and nullify rules
//! - **AttachmentStore**: cover images and note photos as files, referenced
//!   from records by handle
//! - **QueryEngine**: sorted and filtered views over the working set
//!
//! # Quick Start
//!
//! ```text
//! let mut store = Store::open()?;
//!
//! let dune = store.insert_book(Book::new("Dune", "Herbert", 1965));
//! store.insert_note(Note::for_book(dune, "First read", "Spice."))?;
//! store.save()?;
//!
//! let books = store.query().books_with_title_containing("dune");
//! ```
//!
//! # Modules
//!
//! - `store`: Unified storage interface (main entry point)
//! - `models`: Books, genres, notes and their identities
//! - `entity_store`: Transactional record container
//! - `relationships`: Cascade, nullify and symmetric edge maintenance
//! - `query`: Read-only queries
//! - `storage`: SQLite persistence and attachment files
//! - `config`: Application configuration

pub mod config;
pub mod entity_store;
pub mod error;
pub mod models;
pub mod query;
pub mod relationships;
pub mod storage;
pub mod store;

pub use config::Config;
pub use entity_store::{EntityStore, PendingChanges, RecordState};
pub use error::{Error, Result, ValidationError};
pub use models::{
    AttachmentHandle, Book, BookId, BookSort, Entity, EntityKind, Genre, GenreId, GenreSort,
    Note, NoteId, NoteSort, RecordId,
};
pub use query::QueryEngine;
pub use relationships::RelationshipManager;
pub use storage::{AttachmentStore, StorageError, StorageStats};
pub use store::Store;
