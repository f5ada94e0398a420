//! Book command handlers

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;

use bookdiary_core::{Book, BookId, BookSort, Entity, GenreId, Store};

use crate::commands::genre::resolve_genre;
use crate::commands::resolve_id;
use crate::editor::{confirm, prompt_with_default};
use crate::output::{short_id, Output};

/// Sort order for `book list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortBy {
    Title,
    Author,
    Year,
}

impl From<SortBy> for BookSort {
    fn from(sort: SortBy) -> Self {
        match sort {
            SortBy::Title => BookSort::Title,
            SortBy::Author => BookSort::Author,
            SortBy::Year => BookSort::PublishedYear,
        }
    }
}

/// Resolve a book ID given as a full UUID or prefix
pub fn resolve_book(store: &Store, input: &str) -> Result<BookId> {
    resolve_id::<Book>(store, input, |b| format!("{} ({})", b.title, b.author))
}

fn require_text(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        bail!("Book {} cannot be empty", field);
    }
    Ok(value.to_string())
}

fn resolve_genres(store: &Store, genres: &[String]) -> Result<Vec<GenreId>> {
    genres.iter().map(|g| resolve_genre(store, g)).collect()
}

/// Add a book
pub fn add(
    store: &mut Store,
    title: String,
    author: String,
    year: i32,
    genres: Vec<String>,
    cover: Option<PathBuf>,
    output: &Output,
) -> Result<()> {
    let title = require_text("title", &title)?;
    let author = require_text("author", &author)?;
    let genre_ids = resolve_genres(store, &genres)?;

    let mut book = Book::new(title, author, year);
    if let Some(path) = cover {
        let handle = store
            .import_attachment(&path)
            .with_context(|| format!("Failed to import cover: {:?}", path))?;
        book.set_cover(Some(handle));
    }

    let id = store.insert_book(book);
    store.set_genres(id, &genre_ids)?;
    store.save().context("Failed to save book")?;

    output.success(&format!("Added book: {}", short_id(id)));
    print_book(store, id, output)
}

/// List books, optionally filtered by genre or title and sorted
pub fn list(
    store: &Store,
    genre: Option<String>,
    search: Option<String>,
    sort: Option<SortBy>,
    output: &Output,
) -> Result<()> {
    let query = store.query();

    let mut books = match genre {
        Some(ref g) => query.books_in_genre(resolve_genre(store, g)?)?,
        None => query.all::<Book>(None),
    };

    if let Some(needle) = search {
        let needle = needle.to_lowercase();
        books.retain(|b| b.title.to_lowercase().contains(&needle));
    }

    if let Some(sort) = sort {
        let key = BookSort::from(sort);
        books.sort_by(|a, b| a.compare_by(b, key));
    }

    output.print_books(&books);
    Ok(())
}

/// Show a book with its genres and notes
pub fn show(store: &Store, id: String, output: &Output) -> Result<()> {
    let id = resolve_book(store, &id)?;
    print_book(store, id, output)
}

fn print_book(store: &Store, id: BookId, output: &Output) -> Result<()> {
    let query = store.query();
    let book = query.get::<Book>(id)?;
    let genres = query.genres_of_book(id)?;
    let notes = query.notes_of_book(id)?;

    output.print_book(book, &genres, &notes);
    Ok(())
}

/// Edit a book's fields
///
/// With no field flags given, prompts for each field interactively.
pub fn edit(
    store: &mut Store,
    id: String,
    title: Option<String>,
    author: Option<String>,
    year: Option<i32>,
    output: &Output,
) -> Result<()> {
    let id = resolve_book(store, &id)?;
    let mut book = store.query().get::<Book>(id)?.clone();

    if title.is_none() && author.is_none() && year.is_none() {
        println!("Editing book: {}", book.id());
        println!("Press Enter to keep current value, or type new value.\n");

        if let Some(new_title) = prompt_with_default("Title", &book.title)? {
            book.set_title(new_title);
        }
        if let Some(new_author) = prompt_with_default("Author", &book.author)? {
            book.set_author(new_author);
        }
        let current_year = book.published_year.to_string();
        if let Some(new_year) = prompt_with_default("Published year", &current_year)? {
            book.set_published_year(parse_year(&new_year)?);
        }
    } else {
        if let Some(title) = title {
            book.set_title(require_text("title", &title)?);
        }
        if let Some(author) = author {
            book.set_author(require_text("author", &author)?);
        }
        if let Some(year) = year {
            book.set_published_year(year);
        }
    }

    store.update(&book)?;
    store.save().context("Failed to update book")?;

    output.success("Book updated");
    print_book(store, id, output)
}

fn parse_year(input: &str) -> Result<i32> {
    input
        .trim()
        .parse()
        .with_context(|| format!("Invalid year: '{}'", input.trim()))
}

/// Delete a book and its notes
pub fn delete(store: &mut Store, id: String, yes: bool, output: &Output) -> Result<()> {
    let id = resolve_book(store, &id)?;
    let (title, note_count) = {
        let book = store.query().get::<Book>(id)?;
        (book.title.clone(), book.notes().len())
    };

    if output.should_prompt() && !yes {
        println!("Delete book: {} - {}", short_id(id), title);
        if note_count > 0 {
            println!("This also deletes {} note(s).", note_count);
        }
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.delete_book(id)?;
    store.save().context("Failed to delete book")?;

    output.success(&format!("Deleted book: {}", title));
    Ok(())
}

/// Replace a book's genres (no genres clears them)
pub fn set_genres(store: &mut Store, id: String, genres: Vec<String>, output: &Output) -> Result<()> {
    let id = resolve_book(store, &id)?;
    let genre_ids = resolve_genres(store, &genres)?;

    store.set_genres(id, &genre_ids)?;
    store.save().context("Failed to save genres")?;

    let names: Vec<String> = store
        .query()
        .genres_of_book(id)?
        .iter()
        .map(|g| g.name.clone())
        .collect();
    if names.is_empty() {
        output.success("Cleared genres");
    } else {
        output.success(&format!("Genres: {}", names.join(", ")));
    }
    Ok(())
}

/// Set, clear, or export a book's cover image
pub fn cover(
    store: &mut Store,
    id: String,
    file: Option<PathBuf>,
    clear: bool,
    export: Option<PathBuf>,
    output: &Output,
) -> Result<()> {
    let id = resolve_book(store, &id)?;
    let mut book = store.query().get::<Book>(id)?.clone();

    if let Some(path) = export {
        let handle = book
            .cover
            .ok_or_else(|| anyhow!("Book '{}' has no cover", book.title))?;
        let bytes = store.attachment(handle)?;
        fs::write(&path, &bytes).with_context(|| format!("Failed to write {:?}", path))?;
        output.success(&format!("Exported cover to {}", path.display()));
        return Ok(());
    }

    if clear {
        if book.cover.is_none() {
            output.message("Book has no cover.");
            return Ok(());
        }
        book.set_cover(None);
    } else if let Some(path) = file {
        let handle = store
            .import_attachment(&path)
            .with_context(|| format!("Failed to import cover: {:?}", path))?;
        book.set_cover(Some(handle));
    } else {
        bail!("Provide a cover file, --clear, or --export <PATH>");
    }

    store.update(&book)?;
    store.save().context("Failed to save cover")?;

    output.success(if clear { "Cover removed" } else { "Cover updated" });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use bookdiary_core::{Config, Genre};
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
    fn test_add_with_genres_and_cover() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let scifi = store.insert_genre(Genre::new("Sci-Fi"));
        store.save().unwrap();

        let cover = temp_dir.path().join("dune.jpg");
        fs::write(&cover, b"jpeg").unwrap();

        add(
            &mut store,
            " Dune ".to_string(),
            "Herbert".to_string(),
            1965,
            vec!["sci-fi".to_string()],
            Some(cover),
            &quiet(),
        )
        .unwrap();

        assert!(!store.has_changes());
        let book = store.all::<Book>()[0].clone();
        assert_eq!(book.title, "Dune");
        assert_eq!(book.genres(), &[scifi]);
        assert_eq!(store.attachment(book.cover.unwrap()).unwrap(), b"jpeg");
    }

    #[test]
    fn test_add_rejects_blank_author() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        let result = add(
            &mut store,
            "Dune".to_string(),
            "  ".to_string(),
            1965,
            Vec::new(),
            None,
            &quiet(),
        );
        assert!(result.is_err());
        assert!(store.is_new());
    }

    #[test]
    fn test_edit_with_flags() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let id = store.insert_book(Book::new("Dune", "Herbert", 1965));
        store.save().unwrap();

        edit(
            &mut store,
            id.to_string(),
            None,
            Some("Frank Herbert".to_string()),
            Some(1966),
            &quiet(),
        )
        .unwrap();

        let book = store.by_id::<Book>(id).unwrap();
        assert_eq!(book.title, "Dune");
        assert_eq!(book.author, "Frank Herbert");
        assert_eq!(book.published_year, 1966);
    }

    #[test]
    fn test_cover_export_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let id = store.insert_book(Book::new("Dune", "Herbert", 1965));
        store.save().unwrap();

        let source = temp_dir.path().join("cover.png");
        fs::write(&source, b"png").unwrap();
        cover(&mut store, id.to_string(), Some(source), false, None, &quiet()).unwrap();

        let exported = temp_dir.path().join("out.png");
        cover(&mut store, id.to_string(), None, false, Some(exported.clone()), &quiet()).unwrap();
        assert_eq!(fs::read(&exported).unwrap(), b"png");

        let handle = store.by_id::<Book>(id).unwrap().cover.unwrap();
        cover(&mut store, id.to_string(), None, true, None, &quiet()).unwrap();
        assert!(store.by_id::<Book>(id).unwrap().cover.is_none());
        assert!(store.attachment(handle).is_err());
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year(" 1965 ").unwrap(), 1965);
        assert_eq!(parse_year("-750").unwrap(), -750);
        assert!(parse_year("soon").is_err());
    }

    #[test]
    fn test_sort_mapping() {
        assert_eq!(BookSort::from(SortBy::Year), BookSort::PublishedYear);
        assert_eq!(BookSort::from(SortBy::Title), BookSort::Title);
    }
}
