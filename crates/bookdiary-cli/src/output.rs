//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use std::fmt::Display;

use serde::Serialize;

use bookdiary_core::{Book, Genre, Note};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a book with its genres and notes
    pub fn print_book(&self, book: &Book, genres: &[&Genre], notes: &[&Note]) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:        {}", book.id());
                println!("Title:     {}", book.title);
                println!("Author:    {}", book.author);
                println!("Published: {}", book.published_year);
                if let Some(cover) = book.cover {
                    println!("Cover:     {}", short_id(cover));
                }
                if !genres.is_empty() {
                    let names: Vec<&str> = genres.iter().map(|g| g.name.as_str()).collect();
                    println!("Genres:    {}", names.join(", "));
                }
                println!("Created:   {}", book.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated:   {}", book.updated_at.format("%Y-%m-%d %H:%M"));

                if !notes.is_empty() {
                    println!();
                    println!("── Notes ({}) ──", notes.len());
                    for note in notes {
                        println!(
                            "[{}] {} - {}",
                            short_id(note.id()),
                            note.title,
                            truncate_line(&note.message, 50)
                        );
                    }
                }
            }
            OutputFormat::Json => print_json(&serde_json::json!({
                "book": book,
                "genres": genres,
                "notes": notes,
            })),
            OutputFormat::Quiet => println!("{}", book.id()),
        }
    }

    /// Print a list of books
    pub fn print_books(&self, books: &[&Book]) {
        match self.format {
            OutputFormat::Human => {
                if books.is_empty() {
                    println!("No books found.");
                    return;
                }
                for book in books {
                    let notes_indicator = if book.notes().is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", book.notes().len())
                    };
                    println!(
                        "{} | {}{} | {} | {}",
                        short_id(book.id()),
                        truncate(&book.title, 35),
                        notes_indicator,
                        truncate(&book.author, 25),
                        book.published_year
                    );
                }
                println!("\n{} book(s)", books.len());
            }
            OutputFormat::Json => print_json(books),
            OutputFormat::Quiet => {
                for book in books {
                    println!("{}", book.id());
                }
            }
        }
    }

    /// Print a genre with the books tagged with it
    pub fn print_genre(&self, genre: &Genre, books: &[&Book]) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:      {}", genre.id());
                println!("Name:    {}", genre.name);
                println!("Created: {}", genre.created_at.format("%Y-%m-%d %H:%M"));
                println!();
                if books.is_empty() {
                    println!("No books in this genre.");
                    return;
                }
                println!("── Books ({}) ──", books.len());
                for book in books {
                    println!(
                        "{} | {} | {}",
                        short_id(book.id()),
                        truncate(&book.title, 40),
                        book.author
                    );
                }
            }
            OutputFormat::Json => print_json(&serde_json::json!({
                "genre": genre,
                "books": books,
            })),
            OutputFormat::Quiet => println!("{}", genre.id()),
        }
    }

    /// Print a list of genres with book counts
    pub fn print_genres(&self, genres: &[&Genre]) {
        match self.format {
            OutputFormat::Human => {
                if genres.is_empty() {
                    println!("No genres found.");
                    return;
                }
                for genre in genres {
                    println!(
                        "{} | {} ({})",
                        short_id(genre.id()),
                        genre.name,
                        genre.books().len()
                    );
                }
                println!("\n{} genre(s)", genres.len());
            }
            OutputFormat::Json => print_json(genres),
            OutputFormat::Quiet => {
                for genre in genres {
                    println!("{}", genre.id());
                }
            }
        }
    }

    /// Print a single note
    pub fn print_note(&self, note: &Note, owner: Option<&Book>) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:      {}", note.id());
                println!("Title:   {}", note.title);
                match owner {
                    Some(book) => println!("Book:    {} - {}", short_id(book.id()), book.title),
                    None => println!("Book:    (none)"),
                }
                if let Some(photo) = note.photo {
                    println!("Photo:   {}", short_id(photo));
                }
                println!("Created: {}", note.created_at.format("%Y-%m-%d %H:%M"));
                println!();
                println!("{}", note.message);
            }
            OutputFormat::Json => print_json(note),
            OutputFormat::Quiet => println!("{}", note.id()),
        }
    }

    /// Print a list of notes
    pub fn print_notes(&self, notes: &[&Note]) {
        match self.format {
            OutputFormat::Human => {
                if notes.is_empty() {
                    println!("No notes found.");
                    return;
                }
                for note in notes {
                    println!(
                        "{} | {} | {}",
                        short_id(note.id()),
                        truncate(&note.title, 30),
                        truncate_line(&note.message, 45)
                    );
                }
                println!("\n{} note(s)", notes.len());
            }
            OutputFormat::Json => print_json(notes),
            OutputFormat::Quiet => {
                for note in notes {
                    println!("{}", note.id());
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

/// First eight characters of an identity, enough to pass back as a prefix
pub fn short_id(id: impl Display) -> String {
    id.to_string().chars().take(8).collect()
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookdiary_core::BookId;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_mode_checks() {
        let quiet = Output::new(OutputFormat::from_flags(true, true));
        assert!(quiet.is_quiet());
        assert!(!quiet.is_json());

        let json = Output::new(OutputFormat::Json);
        assert!(json.is_json());
        assert!(!json.is_quiet());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("Łódźkowski", 8), "Łódźk...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("single line", 20), "single line");
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
        assert_eq!(
            truncate_line("very long single line here", 10),
            "very lo..."
        );
        assert_eq!(truncate_line("", 10), "");
    }

    #[test]
    fn test_short_id() {
        let id = BookId::new();
        let short = short_id(id);
        assert_eq!(short.len(), 8);
        assert!(id.to_string().starts_with(&short));
    }
}
