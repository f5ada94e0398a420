//! Genre command handlers

use anyhow::{Context, Result};

use bookdiary_core::{Genre, GenreId, GenreSort, Store};

use crate::commands::resolve_id;
use crate::editor::confirm;
use crate::output::{short_id, Output};

/// Resolve a genre by name (case-insensitive) or by ID prefix
pub fn resolve_genre(store: &Store, input: &str) -> Result<GenreId> {
    if let Some(genre) = store.query().genre_named(input.trim()) {
        return Ok(genre.id());
    }
    resolve_id::<Genre>(store, input, |g| g.name.clone())
}

/// Create a genre
pub fn add(store: &mut Store, name: String, output: &Output) -> Result<()> {
    let name = name.trim().to_string();
    if name.is_empty() {
        anyhow::bail!("Genre name cannot be empty");
    }

    if let Some(existing) = store.query().genre_named(&name) {
        output.message(&format!(
            "Note: a genre named '{}' already exists ({})",
            existing.name,
            short_id(existing.id())
        ));
    }

    let id = store.insert_genre(Genre::new(name.clone()));
    store.save().context("Failed to save genre")?;

    output.success(&format!("Added genre {}: {}", short_id(id), name));
    Ok(())
}

/// List genres sorted by name
pub fn list(store: &Store, output: &Output) -> Result<()> {
    let genres = store.query().all::<Genre>(Some(GenreSort::Name));
    output.print_genres(&genres);
    Ok(())
}

/// Show a genre and its books
pub fn show(store: &Store, genre: String, output: &Output) -> Result<()> {
    let id = resolve_genre(store, &genre)?;
    let query = store.query();

    let genre = query.get::<Genre>(id)?;
    let books = query.books_in_genre(id)?;
    output.print_genre(genre, &books);
    Ok(())
}

/// Delete a genre; its books are kept
pub fn delete(store: &mut Store, genre: String, yes: bool, output: &Output) -> Result<()> {
    let id = resolve_genre(store, &genre)?;
    let (name, tagged) = {
        let genre = store.query().get::<Genre>(id)?;
        (genre.name.clone(), genre.books().len())
    };

    if output.should_prompt() && !yes {
        println!("Delete genre: {} - {}", short_id(id), name);
        if tagged > 0 {
            println!("It will be removed from {} book(s).", tagged);
        }
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.delete_genre(id)?;
    store.save().context("Failed to delete genre")?;

    output.success(&format!("Deleted genre: {}", name));
    Ok(())
}
