//! Note command handlers
//!
//! Notes may belong to a book; deleting the book deletes its notes.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};

use bookdiary_core::{Book, Note, NoteId, NoteSort, Store};

use crate::commands::book::resolve_book;
use crate::commands::resolve_id;
use crate::editor::{confirm, edit_text, strip_comments};
use crate::output::{short_id, Output};

/// Resolve a note ID given as a full UUID or prefix
pub fn resolve_note(store: &Store, input: &str) -> Result<NoteId> {
    resolve_id::<Note>(store, input, |n| n.title.clone())
}

/// Add a note, optionally to a book
pub fn add(
    store: &mut Store,
    title: String,
    message: Option<String>,
    book: Option<String>,
    photo: Option<PathBuf>,
    output: &Output,
) -> Result<()> {
    let title = title.trim().to_string();
    if title.is_empty() {
        bail!("Note title cannot be empty");
    }

    let owner = match book {
        Some(ref b) => Some(resolve_book(store, b)?),
        None => None,
    };

    let message = match message {
        Some(m) => m,
        None => {
            let context = match owner.and_then(|id| store.by_id::<Book>(id)) {
                Some(book) => format!("# Note for: {} by {}\n", book.title, book.author),
                None => String::new(),
            };
            let initial = format!("{}# Lines starting with '#' are ignored\n\n", context);
            strip_comments(&edit_text(&initial).context("Failed to edit note")?)
        }
    };

    let mut note = match owner {
        Some(book) => Note::for_book(book, title, message),
        None => Note::new(title, message),
    };
    if let Some(path) = photo {
        let handle = store
            .import_attachment(&path)
            .with_context(|| format!("Failed to import photo: {:?}", path))?;
        note.set_photo(Some(handle));
    }

    let id = store.insert_note(note)?;
    store.save().context("Failed to save note")?;

    output.success(&format!("Added note: {}", short_id(id)));
    Ok(())
}

/// List notes, optionally only those of one book
pub fn list(
    store: &Store,
    book: Option<String>,
    search: Option<String>,
    output: &Output,
) -> Result<()> {
    let query = store.query();

    let mut notes = match book {
        Some(ref b) => query.notes_of_book(resolve_book(store, b)?)?,
        None => query.all::<Note>(Some(NoteSort::Title)),
    };

    if let Some(needle) = search {
        let needle = needle.to_lowercase();
        notes.retain(|n| {
            n.title.to_lowercase().contains(&needle) || n.message.to_lowercase().contains(&needle)
        });
    }

    output.print_notes(&notes);
    Ok(())
}

/// Show a note, or export its photo
pub fn show(
    store: &Store,
    id: String,
    export_photo: Option<PathBuf>,
    output: &Output,
) -> Result<()> {
    let id = resolve_note(store, &id)?;
    let note = store.query().get::<Note>(id)?;

    if let Some(path) = export_photo {
        let handle = note
            .photo
            .ok_or_else(|| anyhow!("Note '{}' has no photo", note.title))?;
        let bytes = store.attachment(handle)?;
        fs::write(&path, &bytes).with_context(|| format!("Failed to write {:?}", path))?;
        output.success(&format!("Exported photo to {}", path.display()));
        return Ok(());
    }

    let owner = note.book().and_then(|b| store.by_id::<Book>(b));
    output.print_note(note, owner);
    Ok(())
}

/// Delete a note
pub fn delete(store: &mut Store, id: String, yes: bool, output: &Output) -> Result<()> {
    let id = resolve_note(store, &id)?;
    let title = store.query().get::<Note>(id)?.title.clone();

    if output.should_prompt() && !yes {
        println!("Delete note: {} - {}", short_id(id), title);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.delete_note(id)?;
    store.save().context("Failed to delete note")?;

    output.success(&format!("Deleted note: {}", title));
    Ok(())
}

/// Attach a note to a book, moving it from any previous book
pub fn attach(store: &mut Store, note: String, book: String, output: &Output) -> Result<()> {
    let note = resolve_note(store, &note)?;
    let book = resolve_book(store, &book)?;

    store.attach_note(note, book)?;
    store.save().context("Failed to attach note")?;

    output.success(&format!(
        "Attached note {} to book {}",
        short_id(note),
        short_id(book)
    ));
    Ok(())
}

/// Detach a note from its book, keeping the note
pub fn detach(store: &mut Store, note: String, output: &Output) -> Result<()> {
    let note = resolve_note(store, &note)?;

    store.detach_note(note)?;
    store.save().context("Failed to detach note")?;

    output.success(&format!("Detached note {}", short_id(note)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use bookdiary_core::Config;
    use tempfile::TempDir;

    fn open(temp_dir: &TempDir) -> Store {
        Store::open_with_config(Config {
            data_dir: temp_dir.path().join("data"),
            log_file: None,
        })
        .unwrap()
    }

    fn quiet() -> Output {
        Output::new(OutputFormat::Quiet)
    }

    #[test]
    fn test_add_to_book_then_delete_book() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let book = store.insert_book(Book::new("A", "Author", 2000));
        store.save().unwrap();

        add(
            &mut store,
            "n1".to_string(),
            Some("first".to_string()),
            Some(book.to_string()),
            None,
            &quiet(),
        )
        .unwrap();
        assert_eq!(store.by_id::<Book>(book).unwrap().notes().len(), 1);

        crate::commands::book::delete(&mut store, book.to_string(), true, &quiet()).unwrap();
        assert_eq!(store.note_count(), 0);
    }

    #[test]
    fn test_attach_and_detach() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let book = store.insert_book(Book::new("A", "Author", 2000));
        let note = store.insert_note(Note::new("loose", "")).unwrap();
        store.save().unwrap();

        attach(&mut store, note.to_string(), book.to_string(), &quiet()).unwrap();
        assert_eq!(store.by_id::<Note>(note).unwrap().book(), Some(book));

        detach(&mut store, note.to_string(), &quiet()).unwrap();
        assert_eq!(store.by_id::<Note>(note).unwrap().book(), None);
        assert!(store.by_id::<Book>(book).unwrap().notes().is_empty());
        assert!(!store.has_changes());
    }

    #[test]
    fn test_export_photo() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        let photo = temp_dir.path().join("page.jpg");
        fs::write(&photo, b"photo bytes").unwrap();
        add(
            &mut store,
            "page".to_string(),
            Some(String::new()),
            None,
            Some(photo),
            &quiet(),
        )
        .unwrap();

        let id = store.all::<Note>()[0].id();
        let out = temp_dir.path().join("out.jpg");
        show(&store, id.to_string(), Some(out.clone()), &quiet()).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"photo bytes");
    }
}
