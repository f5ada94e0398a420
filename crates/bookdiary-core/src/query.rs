//! Read-only queries over the working set
//!
//! Results reflect pending changes: records inserted since the last save are
//! visible and pending deletes are not. Every call recomputes its result from
//! the store; nothing is cached.

use crate::entity_store::EntityStore;
use crate::error::Result;
use crate::models::{Book, BookId, BookSort, Entity, Genre, GenreId, Note};

/// Query interface borrowed from an [`EntityStore`]
#[derive(Clone, Copy)]
pub struct QueryEngine<'a> {
    store: &'a EntityStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a EntityStore) -> Self {
        Self { store }
    }

    /// Every live record of a type, optionally sorted
    ///
    /// Without a key records come back in insertion order. Sorting is stable,
    /// so ties keep insertion order.
    pub fn all<E: Entity>(&self, sort: Option<E::SortKey>) -> Vec<&'a E> {
        let mut records = self.store.all::<E>();
        if let Some(key) = sort {
            records.sort_by(|a, b| a.compare_by(b, key));
        }
        records
    }

    /// Records matching `predicate`, in insertion order
    pub fn filter<E: Entity>(&self, predicate: impl Fn(&E) -> bool) -> Vec<&'a E> {
        self.store
            .all::<E>()
            .into_iter()
            .filter(|record| predicate(*record))
            .collect()
    }

    /// Records matching `predicate`, sorted by `key`
    pub fn filter_sorted<E: Entity>(
        &self,
        predicate: impl Fn(&E) -> bool,
        key: E::SortKey,
    ) -> Vec<&'a E> {
        let mut records = self.filter(predicate);
        records.sort_by(|a, b| a.compare_by(b, key));
        records
    }

    /// Point lookup
    pub fn by_id<E: Entity>(&self, id: E::Id) -> Option<&'a E> {
        self.store.get(id)
    }

    /// Point lookup reporting `NotFound`
    pub fn get<E: Entity>(&self, id: E::Id) -> Result<&'a E> {
        self.store.require(id)
    }

    pub fn count<E: Entity>(&self) -> usize {
        self.store.count::<E>()
    }

    /// Books whose title contains `needle`, ignoring case
    pub fn books_with_title_containing(&self, needle: &str) -> Vec<&'a Book> {
        let needle = needle.to_lowercase();
        self.filter_sorted::<Book>(
            |book| book.title.to_lowercase().contains(&needle),
            BookSort::Title,
        )
    }

    /// First genre (in insertion order) whose name matches, ignoring case
    pub fn genre_named(&self, name: &str) -> Option<&'a Genre> {
        let name = name.to_lowercase();
        self.store
            .all::<Genre>()
            .into_iter()
            .find(|genre| genre.name.to_lowercase() == name)
    }

    /// Books tagged with a genre, in the order they were tagged
    pub fn books_in_genre(&self, genre: GenreId) -> Result<Vec<&'a Book>> {
        let genre = self.get::<Genre>(genre)?;
        Ok(genre
            .books()
            .iter()
            .filter_map(|id| self.store.get::<Book>(*id))
            .collect())
    }

    /// Genres of a book, in assignment order
    pub fn genres_of_book(&self, book: BookId) -> Result<Vec<&'a Genre>> {
        let book = self.get::<Book>(book)?;
        Ok(book
            .genres()
            .iter()
            .filter_map(|id| self.store.get::<Genre>(*id))
            .collect())
    }

    /// Notes owned by a book, in the order they were attached
    pub fn notes_of_book(&self, book: BookId) -> Result<Vec<&'a Note>> {
        let book = self.get::<Book>(book)?;
        Ok(book
            .notes()
            .iter()
            .filter_map(|id| self.store.get::<Note>(*id))
            .collect())
    }
}
