//! Relationship maintenance
//!
//! The only code path that changes relationship collections. Every operation
//! updates both sides of an edge before returning, so the Book/Genre
//! association stays symmetric and no note ever points at a missing book.
//!
//! Changes are pending until the next [`EntityStore::save`].

use tracing::debug;

use crate::entity_store::EntityStore;
use crate::error::Result;
use crate::models::{Book, BookId, Genre, GenreId, Note, NoteId};

/// Applies cascade and nullify rules on top of an [`EntityStore`]
pub struct RelationshipManager<'a> {
    store: &'a mut EntityStore,
}

impl<'a> RelationshipManager<'a> {
    pub fn new(store: &'a mut EntityStore) -> Self {
        Self { store }
    }

    /// Delete a book, cascading to its notes and removing it from its genres
    pub fn delete_book(&mut self, id: BookId) -> Result<()> {
        let book = self.store.require::<Book>(id)?;
        let genres = book.genres().to_vec();
        let notes = book.notes().to_vec();

        for note in &notes {
            self.store.delete::<Note>(*note);
        }
        for genre in &genres {
            self.store
                .modify::<Genre, _>(*genre, |g| g.books_mut().retain(|b| *b != id));
        }
        self.store.delete::<Book>(id);

        debug!(
            "Deleted book {} with {} notes, removed from {} genres",
            id,
            notes.len(),
            genres.len()
        );
        Ok(())
    }

    /// Delete a genre, removing it from every book that carries it
    pub fn delete_genre(&mut self, id: GenreId) -> Result<()> {
        let books = self.store.require::<Genre>(id)?.books().to_vec();

        for book in &books {
            self.store
                .modify::<Book, _>(*book, |b| b.genres_mut().retain(|g| *g != id));
        }
        self.store.delete::<Genre>(id);

        debug!("Deleted genre {}, removed from {} books", id, books.len());
        Ok(())
    }

    /// Delete a note, removing it from its owning book
    pub fn delete_note(&mut self, id: NoteId) -> Result<()> {
        let owner = self.store.require::<Note>(id)?.book();

        if let Some(book) = owner {
            self.store
                .modify::<Book, _>(book, |b| b.notes_mut().retain(|n| *n != id));
        }
        self.store.delete::<Note>(id);

        debug!("Deleted note {}", id);
        Ok(())
    }

    /// Replace a book's genres
    ///
    /// Duplicates in `genres` are collapsed, keeping first occurrence. Every
    /// genre must exist. Calling this again with the same set changes nothing.
    pub fn set_genres(&mut self, book: BookId, genres: &[GenreId]) -> Result<()> {
        let current = self.store.require::<Book>(book)?.genres().to_vec();

        let mut wanted: Vec<GenreId> = Vec::with_capacity(genres.len());
        for genre in genres {
            self.store.require::<Genre>(*genre)?;
            if !wanted.contains(genre) {
                wanted.push(*genre);
            }
        }

        if wanted == current {
            return Ok(());
        }

        let removed: Vec<GenreId> = current
            .iter()
            .filter(|g| !wanted.contains(g))
            .copied()
            .collect();
        let added: Vec<GenreId> = wanted
            .iter()
            .filter(|g| !current.contains(g))
            .copied()
            .collect();

        for genre in &removed {
            self.store
                .modify::<Genre, _>(*genre, |g| g.books_mut().retain(|b| *b != book));
        }
        for genre in &added {
            self.store.modify::<Genre, _>(*genre, |g| {
                if !g.books().contains(&book) {
                    g.books_mut().push(book);
                }
            });
        }
        self.store
            .modify::<Book, _>(book, |b| *b.genres_mut() = wanted);

        debug!(
            "Set genres of book {}: {} added, {} removed",
            book,
            added.len(),
            removed.len()
        );
        Ok(())
    }

    /// Make `book` the owner of `note`, moving it from any previous owner
    pub fn attach_note(&mut self, note: NoteId, book: BookId) -> Result<()> {
        self.store.require::<Book>(book)?;
        let previous = self.store.require::<Note>(note)?.book();

        if previous == Some(book) {
            return Ok(());
        }
        if let Some(old) = previous {
            self.store
                .modify::<Book, _>(old, |b| b.notes_mut().retain(|n| *n != note));
        }
        self.store.modify::<Book, _>(book, |b| b.notes_mut().push(note));
        self.store
            .modify::<Note, _>(note, |n| n.set_book(Some(book)));

        debug!("Attached note {} to book {}", note, book);
        Ok(())
    }

    /// Clear a note's owner without deleting the note
    pub fn detach_note(&mut self, note: NoteId) -> Result<()> {
        let Some(owner) = self.store.require::<Note>(note)?.book() else {
            return Ok(());
        };

        self.store
            .modify::<Book, _>(owner, |b| b.notes_mut().retain(|n| *n != note));
        self.store.modify::<Note, _>(note, |n| n.set_book(None));

        debug!("Detached note {} from book {}", note, owner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_store::RecordState;
    use crate::storage::SqlitePersistence;

    fn memory_store() -> EntityStore {
        EntityStore::open(Box::new(SqlitePersistence::open_in_memory().unwrap())).unwrap()
    }

    fn book(store: &mut EntityStore, title: &str) -> BookId {
        store.insert(Book::new(title, "Author", 2000))
    }

    fn note_for(store: &mut EntityStore, owner: BookId, title: &str) -> NoteId {
        let id = store.insert(Note::new(title, ""));
        RelationshipManager::new(store).attach_note(id, owner).unwrap();
        id
    }

    #[test]
    fn test_delete_book_cascades_to_notes() {
        let mut store = memory_store();
        let a = book(&mut store, "A");
        let b = book(&mut store, "B");
        let n1 = note_for(&mut store, a, "n1");
        let n2 = note_for(&mut store, a, "n2");
        let kept = note_for(&mut store, b, "kept");
        store.save().unwrap();

        RelationshipManager::new(&mut store).delete_book(a).unwrap();

        assert!(store.get::<Book>(a).is_none());
        assert!(store.get::<Note>(n1).is_none());
        assert!(store.get::<Note>(n2).is_none());
        assert!(store
            .all::<Note>()
            .iter()
            .all(|n| n.book().map_or(true, |owner| store.contains::<Book>(owner))));
        assert_eq!(store.get::<Note>(kept).unwrap().book(), Some(b));

        store.save().unwrap();
        store.discard_changes().unwrap();
        assert_eq!(store.count::<Note>(), 1);
    }

    #[test]
    fn test_delete_book_removes_it_from_genres() {
        let mut store = memory_store();
        let a = book(&mut store, "A");
        let b = book(&mut store, "B");
        let genre = store.insert(Genre::new("Fantasy"));

        let mut manager = RelationshipManager::new(&mut store);
        manager.set_genres(a, &[genre]).unwrap();
        manager.set_genres(b, &[genre]).unwrap();
        manager.delete_book(a).unwrap();

        assert_eq!(store.get::<Genre>(genre).unwrap().books(), &[b]);
    }

    #[test]
    fn test_delete_genre_nullifies_books() {
        let mut store = memory_store();
        let a = book(&mut store, "A");
        let b = book(&mut store, "B");
        let fantasy = store.insert(Genre::new("Fantasy"));
        let poetry = store.insert(Genre::new("Poetry"));

        let mut manager = RelationshipManager::new(&mut store);
        manager.set_genres(a, &[fantasy, poetry]).unwrap();
        manager.set_genres(b, &[fantasy]).unwrap();
        manager.delete_genre(fantasy).unwrap();
        store.save().unwrap();

        assert!(store.get::<Genre>(fantasy).is_none());
        assert_eq!(store.get::<Book>(a).unwrap().genres(), &[poetry]);
        assert!(store.get::<Book>(b).unwrap().genres().is_empty());
        assert_eq!(store.count::<Book>(), 2);
    }

    #[test]
    fn test_delete_note_removes_it_from_owner() {
        let mut store = memory_store();
        let a = book(&mut store, "A");
        let n1 = note_for(&mut store, a, "n1");
        let n2 = note_for(&mut store, a, "n2");

        RelationshipManager::new(&mut store).delete_note(n1).unwrap();

        assert_eq!(store.get::<Book>(a).unwrap().notes(), &[n2]);
        assert!(store.get::<Note>(n1).is_none());
    }

    #[test]
    fn test_set_genres_is_symmetric() {
        let mut store = memory_store();
        let a = book(&mut store, "A");
        let g1 = store.insert(Genre::new("One"));
        let g2 = store.insert(Genre::new("Two"));
        let g3 = store.insert(Genre::new("Three"));

        let mut manager = RelationshipManager::new(&mut store);
        manager.set_genres(a, &[g1, g2]).unwrap();
        manager.set_genres(a, &[g2, g3]).unwrap();

        assert_eq!(store.get::<Book>(a).unwrap().genres(), &[g2, g3]);
        assert!(store.get::<Genre>(g1).unwrap().books().is_empty());
        assert_eq!(store.get::<Genre>(g2).unwrap().books(), &[a]);
        assert_eq!(store.get::<Genre>(g3).unwrap().books(), &[a]);
    }

    #[test]
    fn test_set_genres_is_idempotent() {
        let mut store = memory_store();
        let a = book(&mut store, "A");
        let genre = store.insert(Genre::new("Sci-Fi"));

        RelationshipManager::new(&mut store)
            .set_genres(a, &[genre, genre])
            .unwrap();
        store.save().unwrap();

        RelationshipManager::new(&mut store)
            .set_genres(a, &[genre])
            .unwrap();

        assert_eq!(store.get::<Book>(a).unwrap().genres(), &[genre]);
        assert_eq!(store.get::<Genre>(genre).unwrap().books(), &[a]);
        assert_eq!(store.state::<Book>(a), Some(RecordState::Clean));
        assert!(!store.has_changes());
    }

    #[test]
    fn test_set_genres_rejects_unknown_genre() {
        let mut store = memory_store();
        let a = book(&mut store, "A");
        let known = store.insert(Genre::new("Known"));

        let err = RelationshipManager::new(&mut store)
            .set_genres(a, &[known, GenreId::new()])
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(store.get::<Book>(a).unwrap().genres().is_empty());
        assert!(store.get::<Genre>(known).unwrap().books().is_empty());
    }

    #[test]
    fn test_attach_note_moves_between_books() {
        let mut store = memory_store();
        let a = book(&mut store, "A");
        let b = book(&mut store, "B");
        let note = note_for(&mut store, a, "n1");

        RelationshipManager::new(&mut store)
            .attach_note(note, b)
            .unwrap();

        assert!(store.get::<Book>(a).unwrap().notes().is_empty());
        assert_eq!(store.get::<Book>(b).unwrap().notes(), &[note]);
        assert_eq!(store.get::<Note>(note).unwrap().book(), Some(b));
    }

    #[test]
    fn test_detach_note_keeps_the_note() {
        let mut store = memory_store();
        let a = book(&mut store, "A");
        let note = note_for(&mut store, a, "n1");

        let mut manager = RelationshipManager::new(&mut store);
        manager.detach_note(note).unwrap();
        manager.detach_note(note).unwrap();

        assert!(store.get::<Book>(a).unwrap().notes().is_empty());
        assert_eq!(store.get::<Note>(note).unwrap().book(), None);

        RelationshipManager::new(&mut store).delete_book(a).unwrap();
        assert!(store.contains::<Note>(note));
    }

    #[test]
    fn test_missing_records_are_not_found() {
        let mut store = memory_store();
        let mut manager = RelationshipManager::new(&mut store);

        assert!(manager.delete_book(BookId::new()).unwrap_err().is_not_found());
        assert!(manager.delete_genre(GenreId::new()).unwrap_err().is_not_found());
        assert!(manager.delete_note(NoteId::new()).unwrap_err().is_not_found());
    }
}
