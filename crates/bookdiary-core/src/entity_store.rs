//! Entity store
//!
//! Holds the authoritative set of records in memory and commits pending
//! changes to a [`Persistence`] backend as one unit.
//!
//! ## Record states
//!
//! ```text
//! insert ──► New ──────────────┐
//!                              ├── save() ──► Clean
//! Clean ──► Modified ──────────┘
//! Clean/Modified ──► Deleted ──── save() ──► (gone)
//! New ──► delete ──► (gone, never written)
//! ```
//!
//! A failed `save()` changes nothing: records keep their pending state so the
//! caller can retry, or call `discard_changes()` to return to the last commit.
//!
//! Relationship collections are never touched here except through
//! `modify`, which only the relationship manager uses.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::error::{Error, Result, ValidationError};
use crate::models::{AttachmentHandle, Book, Entity, Genre, Note, RecordId};
use crate::storage::{ChangeSet, Pending, Persistence, Snapshot, Stored};

/// Lifecycle state of a record relative to durable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Inserted since the last commit
    New,
    /// Identical to the committed row
    Clean,
    /// Changed since the last commit
    Modified,
    /// Removed, pending commit
    Deleted,
}

#[derive(Debug, Clone)]
struct Entry<E> {
    record: E,
    seq: u64,
    state: RecordState,
}

impl<E> Entry<E> {
    fn touch(&mut self) {
        if self.state == RecordState::Clean {
            self.state = RecordState::Modified;
        }
    }

    fn is_live(&self) -> bool {
        self.state != RecordState::Deleted
    }

    fn is_dirty(&self) -> bool {
        self.state != RecordState::Clean
    }
}

/// All records of one type
#[derive(Debug)]
pub struct Table<E: Entity> {
    entries: HashMap<E::Id, Entry<E>>,
}

impl<E: Entity> Default for Table<E> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<E: Entity> Table<E> {
    fn from_stored(rows: Vec<Stored<E>>) -> Self {
        let entries = rows
            .into_iter()
            .map(|stored| {
                let entry = Entry {
                    record: stored.record,
                    seq: stored.seq,
                    state: RecordState::Clean,
                };
                (entry.record.id(), entry)
            })
            .collect();
        Self { entries }
    }

    fn live_entry_mut(&mut self, id: E::Id) -> Option<&mut Entry<E>> {
        self.entries.get_mut(&id).filter(|entry| entry.is_live())
    }

    pub(crate) fn get(&self, id: E::Id) -> Option<&E> {
        self.entries
            .get(&id)
            .filter(|entry| entry.is_live())
            .map(|entry| &entry.record)
    }

    /// Live records in insertion order
    pub(crate) fn ordered(&self) -> Vec<&E> {
        let mut live: Vec<&Entry<E>> = self.entries.values().filter(|e| e.is_live()).collect();
        live.sort_by_key(|entry| entry.seq);
        live.into_iter().map(|entry| &entry.record).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.values().filter(|e| e.is_live()).count()
    }

    fn max_seq(&self) -> u64 {
        self.entries.values().map(|e| e.seq).max().unwrap_or(0)
    }

    fn pending(&self) -> Vec<(&Entry<E>, E::Id)> {
        let mut pending: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry.state, RecordState::New | RecordState::Modified))
            .map(|(id, entry)| (entry, *id))
            .collect();
        pending.sort_by_key(|(entry, _)| entry.seq);
        pending
    }

    fn deleted(&self) -> Vec<E::Id> {
        let mut deleted: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.state == RecordState::Deleted)
            .map(|(id, entry)| (entry.seq, *id))
            .collect();
        deleted.sort_by_key(|(seq, _)| *seq);
        deleted.into_iter().map(|(_, id)| id).collect()
    }

    fn validate_pending(&self) -> std::result::Result<(), ValidationError> {
        for (entry, _) in self.pending() {
            entry.record.validate()?;
        }
        Ok(())
    }

    fn mark_committed(&mut self) {
        self.entries.retain(|_, entry| entry.is_live());
        for entry in self.entries.values_mut() {
            entry.state = RecordState::Clean;
        }
    }

    fn tally(&self, changes: &mut PendingChanges) {
        for entry in self.entries.values() {
            match entry.state {
                RecordState::New => changes.inserted += 1,
                RecordState::Modified => changes.modified += 1,
                RecordState::Deleted => changes.deleted += 1,
                RecordState::Clean => {}
            }
        }
    }
}

/// Counts of records awaiting commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingChanges {
    pub inserted: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.modified == 0 && self.deleted == 0
    }
}

/// In-memory record set with transactional commit
pub struct EntityStore {
    books: Table<Book>,
    genres: Table<Genre>,
    notes: Table<Note>,
    next_seq: u64,
    /// Attachments dropped by updates or deletes since the last commit
    released: Vec<AttachmentHandle>,
    backend: Box<dyn Persistence>,
}

impl EntityStore {
    /// Load the committed state from `backend`
    pub fn open(mut backend: Box<dyn Persistence>) -> Result<Self> {
        let snapshot = backend.load()?;
        let mut store = Self {
            books: Table::default(),
            genres: Table::default(),
            notes: Table::default(),
            next_seq: 1,
            released: Vec::new(),
            backend,
        };
        store.apply_snapshot(snapshot);
        info!(
            "Opened entity store: {} books, {} genres, {} notes",
            store.books.len(),
            store.genres.len(),
            store.notes.len()
        );
        Ok(store)
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.books = Table::from_stored(snapshot.books);
        self.genres = Table::from_stored(snapshot.genres);
        self.notes = Table::from_stored(snapshot.notes);

        let max_seq = self
            .books
            .max_seq()
            .max(self.genres.max_seq())
            .max(self.notes.max_seq());
        self.next_seq = self.next_seq.max(max_seq + 1);
        self.released.clear();
    }

    pub(crate) fn books(&self) -> &Table<Book> {
        &self.books
    }

    pub(crate) fn books_mut(&mut self) -> &mut Table<Book> {
        &mut self.books
    }

    pub(crate) fn genres(&self) -> &Table<Genre> {
        &self.genres
    }

    pub(crate) fn genres_mut(&mut self) -> &mut Table<Genre> {
        &mut self.genres
    }

    pub(crate) fn notes(&self) -> &Table<Note> {
        &self.notes
    }

    pub(crate) fn notes_mut(&mut self) -> &mut Table<Note> {
        &mut self.notes
    }

    // ==================== Mutation ====================

    /// Register a record and return its identity
    ///
    /// Relationship collections on the incoming record are ignored; edges
    /// are created through the relationship manager. Inserting an identity
    /// that is already live updates its fields instead.
    pub fn insert<E: Entity>(&mut self, mut record: E) -> E::Id {
        let id = record.id();

        if E::table(self).get(id).is_some() {
            self.write_fields(&record);
            return id;
        }

        record.clear_relationships();
        let seq = self.next_seq;
        let table = E::table_mut(self);
        let entry = match table.entries.remove(&id) {
            // Reviving a pending delete; its row still exists in storage
            Some(previous) => Entry {
                record,
                seq: previous.seq,
                state: RecordState::Modified,
            },
            None => Entry {
                record,
                seq,
                state: RecordState::New,
            },
        };
        let fresh = entry.state == RecordState::New;
        table.entries.insert(id, entry);

        if fresh {
            self.next_seq += 1;
        }
        debug!("Inserted {} {}", E::KIND, id);
        id
    }

    /// Write the caller-editable fields of `record` back to the store
    pub fn update<E: Entity>(&mut self, record: &E) -> Result<()> {
        let id = record.id();
        if E::table(self).get(id).is_none() {
            return Err(Error::not_found(E::KIND, id.uuid()));
        }
        self.write_fields(record);
        Ok(())
    }

    fn write_fields<E: Entity>(&mut self, record: &E) {
        let released = match E::table_mut(self).live_entry_mut(record.id()) {
            Some(entry) => {
                let before = entry.record.attachments();
                entry.record.copy_fields_from(record);
                entry.touch();
                let after = entry.record.attachments();
                before
                    .into_iter()
                    .filter(|handle| !after.contains(handle))
                    .collect::<Vec<_>>()
            }
            None => return,
        };
        self.released.extend(released);
    }

    /// Remove a record from the live set
    ///
    /// Relationship cleanup must already have happened; use the relationship
    /// manager rather than calling this directly. Returns `false` if no live
    /// record had this identity.
    pub(crate) fn delete<E: Entity>(&mut self, id: E::Id) -> bool {
        let table = E::table_mut(self);
        let Some(entry) = table.live_entry_mut(id) else {
            return false;
        };

        let handles = entry.record.attachments();
        if entry.state == RecordState::New {
            table.entries.remove(&id);
        } else {
            entry.state = RecordState::Deleted;
        }

        self.released.extend(handles);
        debug!("Deleted {} {}", E::KIND, id);
        true
    }

    /// Apply `f` to a live record and mark it modified
    pub(crate) fn modify<E: Entity, R>(
        &mut self,
        id: E::Id,
        f: impl FnOnce(&mut E) -> R,
    ) -> Option<R> {
        let entry = E::table_mut(self).live_entry_mut(id)?;
        let result = f(&mut entry.record);
        entry.touch();
        Some(result)
    }

    // ==================== Reads ====================

    /// Point lookup; `None` if the record is absent or pending delete
    pub fn get<E: Entity>(&self, id: E::Id) -> Option<&E> {
        E::table(self).get(id)
    }

    /// Like [`get`](Self::get) but reports a `NotFound` error
    pub fn require<E: Entity>(&self, id: E::Id) -> Result<&E> {
        self.get(id)
            .ok_or_else(|| Error::not_found(E::KIND, id.uuid()))
    }

    pub fn contains<E: Entity>(&self, id: E::Id) -> bool {
        self.get::<E>(id).is_some()
    }

    /// Every live record of a type, in insertion order
    pub fn all<E: Entity>(&self) -> Vec<&E> {
        E::table(self).ordered()
    }

    /// Number of live records of a type
    pub fn count<E: Entity>(&self) -> usize {
        E::table(self).len()
    }

    /// Lifecycle state of a record, including pending deletes
    pub fn state<E: Entity>(&self, id: E::Id) -> Option<RecordState> {
        E::table(self).entries.get(&id).map(|entry| entry.state)
    }

    /// Whether any record is awaiting commit
    pub fn has_changes(&self) -> bool {
        self.books.entries.values().any(Entry::is_dirty)
            || self.genres.entries.values().any(Entry::is_dirty)
            || self.notes.entries.values().any(Entry::is_dirty)
    }

    /// Counts of records awaiting commit
    pub fn pending_changes(&self) -> PendingChanges {
        let mut changes = PendingChanges::default();
        self.books.tally(&mut changes);
        self.genres.tally(&mut changes);
        self.notes.tally(&mut changes);
        changes
    }

    /// Attachment handles referenced by any record, committed or pending
    pub fn referenced_attachments(&self) -> HashSet<AttachmentHandle> {
        let books = self.books.entries.values().flat_map(|e| e.record.attachments());
        let notes = self.notes.entries.values().flat_map(|e| e.record.attachments());
        books
            .chain(notes)
            .chain(self.released.iter().copied())
            .collect()
    }

    // ==================== Commit ====================

    /// Commit every pending change as one unit
    ///
    /// On success all records become `Clean` and the attachments released
    /// since the last commit are returned for reclamation. On failure the
    /// store is left exactly as it was.
    pub fn save(&mut self) -> Result<Vec<AttachmentHandle>> {
        if !self.has_changes() {
            return Ok(std::mem::take(&mut self.released));
        }

        self.books.validate_pending()?;
        self.genres.validate_pending()?;
        self.notes.validate_pending()?;

        let count = {
            let changes = build_change_set(&self.books, &self.genres, &self.notes);
            let count = changes.len();
            if let Err(e) = self.backend.commit(&changes) {
                warn!("Commit of {} changes failed: {}", count, e);
                return Err(e.into());
            }
            count
        };

        self.books.mark_committed();
        self.genres.mark_committed();
        self.notes.mark_committed();
        info!("Committed {} changes", count);

        Ok(std::mem::take(&mut self.released))
    }

    /// Drop every pending change and reload the committed state
    pub fn discard_changes(&mut self) -> Result<()> {
        let pending = self.pending_changes();
        let snapshot = self.backend.load()?;
        self.apply_snapshot(snapshot);
        info!(
            "Discarded pending changes: {} inserted, {} modified, {} deleted",
            pending.inserted, pending.modified, pending.deleted
        );
        Ok(())
    }
}

fn build_change_set<'a>(
    books: &'a Table<Book>,
    genres: &'a Table<Genre>,
    notes: &'a Table<Note>,
) -> ChangeSet<'a> {
    fn rows<E: Entity>(table: &Table<E>) -> Vec<Pending<'_, E>> {
        table
            .pending()
            .into_iter()
            .map(|(entry, _)| Pending {
                seq: entry.seq,
                record: &entry.record,
                position: None,
            })
            .collect()
    }

    let mut note_rows = rows(notes);
    for pending in &mut note_rows {
        pending.position = pending.record.book().and_then(|owner| {
            books
                .get(owner)
                .and_then(|book| book.notes().iter().position(|id| *id == pending.record.id()))
        });
    }

    ChangeSet {
        books: rows(books),
        genres: rows(genres),
        notes: note_rows,
        deleted_books: books.deleted(),
        deleted_genres: genres.deleted(),
        deleted_notes: notes.deleted(),
    }
}
