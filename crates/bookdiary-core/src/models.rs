//! Data models for BookDiary
//!
//! Defines the three record types (Book, Genre, Note), their typed identities,
//! and the handle type used to reference externally stored attachments.
//!
//! Relationship collections (`Book::genres`, `Book::notes`, `Genre::books`,
//! `Note::book`) are read-only outside this crate. They are only ever changed
//! by the [`RelationshipManager`](crate::relationships::RelationshipManager),
//! which keeps both sides of every edge in step.

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity_store::{EntityStore, Table};
use crate::error::ValidationError;

/// Common behaviour of the typed identities below
pub trait RecordId: Copy + Eq + Hash + fmt::Debug + fmt::Display {
    /// The raw UUID behind this identity
    fn uuid(self) -> Uuid;
}

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identity
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID (for loading from storage)
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Get the underlying UUID
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl RecordId for $name {
            fn uuid(self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_newtype!(
    /// Identity of a [`Book`]
    BookId
);
uuid_newtype!(
    /// Identity of a [`Genre`]
    GenreId
);
uuid_newtype!(
    /// Identity of a [`Note`]
    NoteId
);
uuid_newtype!(
    /// Opaque reference to a blob held by the attachment store
    AttachmentHandle
);

/// The kind of a stored record, used in error messages and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Book,
    Genre,
    Note,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Book => "Book",
            EntityKind::Genre => "Genre",
            EntityKind::Note => "Note",
        };
        f.write_str(name)
    }
}

/// Behaviour shared by every record type the store manages
///
/// Implemented by [`Book`], [`Genre`] and [`Note`]; the generic operations on
/// [`EntityStore`] and [`QueryEngine`](crate::query::QueryEngine) are written
/// against this trait.
pub trait Entity: Clone + fmt::Debug {
    /// Typed identity of this record
    type Id: RecordId;
    /// Fields this record type can be sorted by
    type SortKey: Copy + fmt::Debug;

    const KIND: EntityKind;

    /// Identity of this record
    fn id(&self) -> Self::Id;

    /// Compare two records by the given sort key
    fn compare_by(&self, other: &Self, key: Self::SortKey) -> Ordering;

    /// Attachment handles held by this record
    fn attachments(&self) -> Vec<AttachmentHandle>;

    /// Copy caller-editable fields from `other`, leaving identity and
    /// relationship collections untouched
    fn copy_fields_from(&mut self, other: &Self);

    /// Reset relationship collections to empty
    fn clear_relationships(&mut self);

    /// Check required fields before commit
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    #[doc(hidden)]
    fn table(store: &EntityStore) -> &Table<Self>;

    #[doc(hidden)]
    fn table_mut(store: &mut EntityStore) -> &mut Table<Self>;
}

/// Case-insensitive ordering used for every text sort key
pub(crate) fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

// ==================== Book ====================

/// A book in the diary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    id: BookId,
    /// Book title
    pub title: String,
    /// Author name
    pub author: String,
    /// Year of publication (no range is enforced by the store)
    pub published_year: i32,
    /// Cover image held in the attachment store
    pub cover: Option<AttachmentHandle>,
    /// Genres this book is tagged with
    #[serde(default)]
    genres: Vec<GenreId>,
    /// Notes owned by this book
    #[serde(default)]
    notes: Vec<NoteId>,
    /// When this book was created
    pub created_at: DateTime<Utc>,
    /// When this book was last updated
    pub updated_at: DateTime<Utc>,
}

/// Sort keys for [`Book`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSort {
    Title,
    Author,
    PublishedYear,
}

impl Book {
    /// Create a new book with its required fields
    pub fn new(title: impl Into<String>, author: impl Into<String>, published_year: i32) -> Self {
        Self::with_id(BookId::new(), title, author, published_year)
    }

    /// Create a book with a specific ID (for loading from storage)
    pub fn with_id(
        id: BookId,
        title: impl Into<String>,
        author: impl Into<String>,
        published_year: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            author: author.into(),
            published_year,
            cover: None,
            genres: Vec::new(),
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Book identity
    pub fn id(&self) -> BookId {
        self.id
    }

    /// Genres this book is tagged with, in assignment order
    pub fn genres(&self) -> &[GenreId] {
        &self.genres
    }

    /// Notes owned by this book, in the order they were attached
    pub fn notes(&self) -> &[NoteId] {
        &self.notes
    }

    /// Update the title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.updated_at = Utc::now();
    }

    /// Update the author
    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
        self.updated_at = Utc::now();
    }

    /// Update the publication year
    pub fn set_published_year(&mut self, year: i32) {
        self.published_year = year;
        self.updated_at = Utc::now();
    }

    /// Replace (or clear) the cover image
    pub fn set_cover(&mut self, cover: Option<AttachmentHandle>) {
        self.cover = cover;
        self.updated_at = Utc::now();
    }

    pub(crate) fn genres_mut(&mut self) -> &mut Vec<GenreId> {
        &mut self.genres
    }

    pub(crate) fn notes_mut(&mut self) -> &mut Vec<NoteId> {
        &mut self.notes
    }
}

impl Entity for Book {
    type Id = BookId;
    type SortKey = BookSort;

    const KIND: EntityKind = EntityKind::Book;

    fn id(&self) -> BookId {
        self.id
    }

    fn compare_by(&self, other: &Self, key: BookSort) -> Ordering {
        match key {
            BookSort::Title => compare_text(&self.title, &other.title),
            BookSort::Author => compare_text(&self.author, &other.author),
            BookSort::PublishedYear => self.published_year.cmp(&other.published_year),
        }
    }

    fn attachments(&self) -> Vec<AttachmentHandle> {
        self.cover.into_iter().collect()
    }

    fn copy_fields_from(&mut self, other: &Self) {
        self.title = other.title.clone();
        self.author = other.author.clone();
        self.published_year = other.published_year;
        self.cover = other.cover;
        self.updated_at = other.updated_at;
    }

    fn clear_relationships(&mut self) {
        self.genres.clear();
        self.notes.clear();
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle { book: self.id });
        }
        if self.author.trim().is_empty() {
            return Err(ValidationError::MissingAuthor { book: self.id });
        }
        Ok(())
    }

    fn table(store: &EntityStore) -> &Table<Self> {
        store.books()
    }

    fn table_mut(store: &mut EntityStore) -> &mut Table<Self> {
        store.books_mut()
    }
}

// ==================== Genre ====================

/// A literary genre used to tag books
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Genre {
    id: GenreId,
    /// Display name (uniqueness is not enforced)
    pub name: String,
    /// Books tagged with this genre
    #[serde(default)]
    books: Vec<BookId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sort keys for [`Genre`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenreSort {
    Name,
}

impl Genre {
    /// Create a new genre
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(GenreId::new(), name)
    }

    /// Create a genre with a specific ID (for loading from storage)
    pub fn with_id(id: GenreId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            books: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> GenreId {
        self.id
    }

    /// Books tagged with this genre, in the order they were tagged
    pub fn books(&self) -> &[BookId] {
        &self.books
    }

    /// Rename the genre
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.updated_at = Utc::now();
    }

    pub(crate) fn books_mut(&mut self) -> &mut Vec<BookId> {
        &mut self.books
    }
}

impl Entity for Genre {
    type Id = GenreId;
    type SortKey = GenreSort;

    const KIND: EntityKind = EntityKind::Genre;

    fn id(&self) -> GenreId {
        self.id
    }

    fn compare_by(&self, other: &Self, key: GenreSort) -> Ordering {
        match key {
            GenreSort::Name => compare_text(&self.name, &other.name),
        }
    }

    fn attachments(&self) -> Vec<AttachmentHandle> {
        Vec::new()
    }

    fn copy_fields_from(&mut self, other: &Self) {
        self.name = other.name.clone();
        self.updated_at = other.updated_at;
    }

    fn clear_relationships(&mut self) {
        self.books.clear();
    }

    fn table(store: &EntityStore) -> &Table<Self> {
        store.genres()
    }

    fn table_mut(store: &mut EntityStore) -> &mut Table<Self> {
        store.genres_mut()
    }
}

// ==================== Note ====================

/// A free-text note, optionally owned by a book
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    id: NoteId,
    /// Note title
    pub title: String,
    /// Note body
    pub message: String,
    /// Photo held in the attachment store
    pub photo: Option<AttachmentHandle>,
    /// Owning book
    #[serde(default)]
    book: Option<BookId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sort keys for [`Note`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteSort {
    Title,
}

impl Note {
    /// Create a new note that belongs to no book
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_id(NoteId::new(), title, message)
    }

    /// Create a new note that will be attached to `book` when inserted
    pub fn for_book(book: BookId, title: impl Into<String>, message: impl Into<String>) -> Self {
        let mut note = Self::new(title, message);
        note.book = Some(book);
        note
    }

    /// Create a note with a specific ID (for loading from storage)
    pub fn with_id(id: NoteId, title: impl Into<String>, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            message: message.into(),
            photo: None,
            book: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> NoteId {
        self.id
    }

    /// The book owning this note, if any
    pub fn book(&self) -> Option<BookId> {
        self.book
    }

    /// Update the title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.updated_at = Utc::now();
    }

    /// Update the message body
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.updated_at = Utc::now();
    }

    /// Replace (or clear) the photo
    pub fn set_photo(&mut self, photo: Option<AttachmentHandle>) {
        self.photo = photo;
        self.updated_at = Utc::now();
    }

    pub(crate) fn set_book(&mut self, book: Option<BookId>) {
        self.book = book;
    }

    pub(crate) fn take_book(&mut self) -> Option<BookId> {
        self.book.take()
    }
}

impl Entity for Note {
    type Id = NoteId;
    type SortKey = NoteSort;

    const KIND: EntityKind = EntityKind::Note;

    fn id(&self) -> NoteId {
        self.id
    }

    fn compare_by(&self, other: &Self, key: NoteSort) -> Ordering {
        match key {
            NoteSort::Title => compare_text(&self.title, &other.title),
        }
    }

    fn attachments(&self) -> Vec<AttachmentHandle> {
        self.photo.into_iter().collect()
    }

    fn copy_fields_from(&mut self, other: &Self) {
        self.title = other.title.clone();
        self.message = other.message.clone();
        self.photo = other.photo;
        self.updated_at = other.updated_at;
    }

    fn clear_relationships(&mut self) {
        self.book = None;
    }

    fn table(store: &EntityStore) -> &Table<Self> {
        store.notes()
    }

    fn table_mut(store: &mut EntityStore) -> &mut Table<Self> {
        store.notes_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_new() {
        let book = Book::new("Dune", "Frank Herbert", 1965);
        assert_eq!(book.title, "Dune");
        assert_eq!(book.author, "Frank Herbert");
        assert_eq!(book.published_year, 1965);
        assert!(book.cover.is_none());
        assert!(book.genres().is_empty());
        assert!(book.notes().is_empty());
    }

    #[test]
    fn test_book_with_id() {
        let id = BookId::new();
        let book = Book::with_id(id, "Dune", "Herbert", 1965);
        assert_eq!(book.id(), id);
    }

    #[test]
    fn test_book_set_title_bumps_updated_at() {
        let mut book = Book::new("Dune", "Herbert", 1965);
        let original_updated = book.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(10));
        book.set_title("Dune Messiah");
        assert_eq!(book.title, "Dune Messiah");
        assert!(book.updated_at > original_updated);
    }

    #[test]
    fn test_book_validate() {
        assert!(Book::new("Dune", "Herbert", 1965).validate().is_ok());

        let untitled = Book::new("  ", "Herbert", 1965);
        assert!(matches!(
            untitled.validate(),
            Err(ValidationError::MissingTitle { .. })
        ));

        let anonymous = Book::new("Dune", "", 1965);
        assert!(matches!(
            anonymous.validate(),
            Err(ValidationError::MissingAuthor { .. })
        ));
    }

    #[test]
    fn test_negative_year_is_accepted() {
        let book = Book::new("The Iliad", "Homer", -750);
        assert!(book.validate().is_ok());
    }

    #[test]
    fn test_copy_fields_keeps_relationships() {
        let mut stored = Book::new("Dune", "Herbert", 1965);
        stored.genres_mut().push(GenreId::new());

        let mut edited = stored.clone();
        edited.clear_relationships();
        edited.set_author("Frank Herbert");

        stored.copy_fields_from(&edited);
        assert_eq!(stored.author, "Frank Herbert");
        assert_eq!(stored.genres().len(), 1);
    }

    #[test]
    fn test_book_sort_is_case_insensitive() {
        let a = Book::new("apple", "x", 2000);
        let b = Book::new("Banana", "x", 2000);
        assert_eq!(a.compare_by(&b, BookSort::Title), Ordering::Less);
        assert_eq!(
            a.compare_by(&b, BookSort::PublishedYear),
            Ordering::Equal
        );
    }

    #[test]
    fn test_note_for_book() {
        let book = BookId::new();
        let note = Note::for_book(book, "n1", "first thoughts");
        assert_eq!(note.book(), Some(book));
        assert!(Note::new("n2", "").book().is_none());
    }

    #[test]
    fn test_attachments() {
        let mut book = Book::new("Dune", "Herbert", 1965);
        assert!(book.attachments().is_empty());
        let handle = AttachmentHandle::new();
        book.set_cover(Some(handle));
        assert_eq!(book.attachments(), vec![handle]);

        let mut note = Note::new("n", "m");
        note.set_photo(Some(handle));
        assert_eq!(note.attachments(), vec![handle]);
    }

    #[test]
    fn test_id_parse_and_display() {
        let id = GenreId::new();
        let parsed: GenreId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<NoteId>().is_err());
    }

    #[test]
    fn test_entity_kind_display() {
        assert_eq!(EntityKind::Book.to_string(), "Book");
        assert_eq!(EntityKind::Genre.to_string(), "Genre");
        assert_eq!(EntityKind::Note.to_string(), "Note");
    }

    #[test]
    fn test_book_serialization() {
        let mut book = Book::new("Dune", "Herbert", 1965);
        book.set_cover(Some(AttachmentHandle::new()));
        let json = serde_json::to_string(&book).unwrap();
        let deserialized: Book = serde_json::from_str(&json).unwrap();
        assert_eq!(book, deserialized);
    }
}
