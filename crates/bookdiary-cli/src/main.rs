//! BookDiary CLI
//!
//! Command-line interface for BookDiary - books, genres and reading notes.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bookdiary_core::{Config, Error as CoreError, StorageError, Store};

mod commands;
mod editor;
mod output;

use commands::book::SortBy;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "bookdiary")]
#[command(about = "BookDiary - keep track of the books you read")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage books
    Book {
        #[command(subcommand)]
        command: BookCommands,
    },
    /// Manage genres
    Genre {
        #[command(subcommand)]
        command: GenreCommands,
    },
    /// Manage notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },
    /// Show storage location, size and record counts
    Status,
    /// Remove attachment files no record refers to
    Clean,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum BookCommands {
    /// Add a book
    #[command(alias = "create")]
    Add {
        /// Book title
        title: String,
        /// Author name
        author: String,
        /// Year of publication
        #[arg(allow_negative_numbers = true)]
        year: i32,
        /// Genre name or ID (repeatable)
        #[arg(short, long)]
        genre: Vec<String>,
        /// Cover image file
        #[arg(short, long)]
        cover: Option<PathBuf>,
    },
    /// List books
    #[command(alias = "ls")]
    List {
        /// Only books in this genre (name or ID)
        #[arg(short, long)]
        genre: Option<String>,
        /// Only books whose title contains this text
        #[arg(short, long)]
        search: Option<String>,
        /// Sort order (defaults to insertion order)
        #[arg(long, value_enum)]
        sort: Option<SortBy>,
    },
    /// Show book details (including genres and notes)
    Show {
        /// Book ID (full UUID or prefix)
        id: String,
    },
    /// Edit a book (prompts when no field is given)
    Edit {
        /// Book ID (full UUID or prefix)
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        year: Option<i32>,
    },
    /// Delete a book and its notes
    #[command(alias = "rm")]
    Delete {
        /// Book ID (full UUID or prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Replace a book's genres (none clears them)
    Genres {
        /// Book ID (full UUID or prefix)
        id: String,
        /// Genre names or IDs
        genres: Vec<String>,
    },
    /// Set, clear or export a book's cover
    Cover {
        /// Book ID (full UUID or prefix)
        id: String,
        /// New cover image file
        #[arg(conflicts_with_all = ["clear", "export"])]
        file: Option<PathBuf>,
        /// Remove the cover
        #[arg(long, conflicts_with = "export")]
        clear: bool,
        /// Write the cover to this file
        #[arg(long, value_name = "PATH")]
        export: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum GenreCommands {
    /// Add a genre
    #[command(alias = "create")]
    Add {
        /// Genre name
        name: String,
    },
    /// List genres
    #[command(alias = "ls")]
    List,
    /// Show a genre and its books
    Show {
        /// Genre name or ID
        genre: String,
    },
    /// Delete a genre (its books are kept)
    #[command(alias = "rm")]
    Delete {
        /// Genre name or ID
        genre: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Add a note
    #[command(alias = "create")]
    Add {
        /// Note title
        title: String,
        /// Note text (opens editor if not provided)
        #[arg(short, long)]
        message: Option<String>,
        /// Book the note belongs to (ID or prefix)
        #[arg(short, long)]
        book: Option<String>,
        /// Photo file
        #[arg(short, long)]
        photo: Option<PathBuf>,
    },
    /// List notes
    #[command(alias = "ls")]
    List {
        /// Only notes of this book (ID or prefix)
        #[arg(short, long)]
        book: Option<String>,
        /// Only notes whose title or text contains this
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show a note
    Show {
        /// Note ID (full UUID or prefix)
        id: String,
        /// Write the note's photo to this file
        #[arg(long, value_name = "PATH")]
        export_photo: Option<PathBuf>,
    },
    /// Delete a note
    #[command(alias = "rm")]
    Delete {
        /// Note ID (full UUID or prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Attach a note to a book
    Attach {
        /// Note ID (full UUID or prefix)
        note: String,
        /// Book ID (full UUID or prefix)
        book: String,
    },
    /// Detach a note from its book
    Detach {
        /// Note ID (full UUID or prefix)
        note: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let result = run(cli, &output);
    if let Err(ref e) = result {
        report_storage_hint(e, &output);
    }
    result
}

fn run(cli: Cli, output: &Output) -> Result<()> {
    let config_path = cli.config.as_deref();

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return match command {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key.clone(), value.clone(), config_path, output)
            }
        };
    }

    let config = commands::config::load(config_path)?;
    init_logging(&config);
    let mut store = Store::open_with_config(config)?;

    match cli.command {
        Commands::Book { command } => handle_book_command(command, &mut store, output),
        Commands::Genre { command } => handle_genre_command(command, &mut store, output),
        Commands::Note { command } => handle_note_command(command, &mut store, output),
        Commands::Status => commands::status::show(&store, output),
        Commands::Clean => commands::status::clean(&store, output),
        Commands::Config { .. } => Ok(()),
    }
}

fn handle_book_command(command: BookCommands, store: &mut Store, output: &Output) -> Result<()> {
    use commands::book;

    match command {
        BookCommands::Add {
            title,
            author,
            year,
            genre,
            cover,
        } => book::add(store, title, author, year, genre, cover, output),
        BookCommands::List {
            genre,
            search,
            sort,
        } => book::list(store, genre, search, sort, output),
        BookCommands::Show { id } => book::show(store, id, output),
        BookCommands::Edit {
            id,
            title,
            author,
            year,
        } => book::edit(store, id, title, author, year, output),
        BookCommands::Delete { id, yes } => book::delete(store, id, yes, output),
        BookCommands::Genres { id, genres } => book::set_genres(store, id, genres, output),
        BookCommands::Cover {
            id,
            file,
            clear,
            export,
        } => book::cover(store, id, file, clear, export, output),
    }
}

fn handle_genre_command(command: GenreCommands, store: &mut Store, output: &Output) -> Result<()> {
    use commands::genre;

    match command {
        GenreCommands::Add { name } => genre::add(store, name, output),
        GenreCommands::List => genre::list(store, output),
        GenreCommands::Show { genre: g } => genre::show(store, g, output),
        GenreCommands::Delete { genre: g, yes } => genre::delete(store, g, yes, output),
    }
}

fn handle_note_command(command: NoteCommands, store: &mut Store, output: &Output) -> Result<()> {
    use commands::note;

    match command {
        NoteCommands::Add {
            title,
            message,
            book,
            photo,
        } => note::add(store, title, message, book, photo, output),
        NoteCommands::List { book, search } => note::list(store, book, search, output),
        NoteCommands::Show { id, export_photo } => note::show(store, id, export_photo, output),
        NoteCommands::Delete { id, yes } => note::delete(store, id, yes, output),
        NoteCommands::Attach { note: n, book } => note::attach(store, n, book, output),
        NoteCommands::Detach { note: n } => note::detach(store, n, output),
    }
}

/// Tell the user how to recover from a storage failure
///
/// Nothing is printed in quiet mode or for errors that did not come from storage.
fn report_storage_hint(err: &anyhow::Error, output: &Output) {
    if output.is_quiet() {
        return;
    }
    let Some(hint) = storage_hint(err) else {
        return;
    };

    if output.is_json() {
        eprintln!("{}", serde_json::json!({"status": "error", "hint": hint}));
    } else {
        eprintln!("Hint: {}", hint);
    }
}

fn storage_hint(err: &anyhow::Error) -> Option<String> {
    for cause in err.chain() {
        if let Some(core) = cause.downcast_ref::<CoreError>() {
            return match core {
                CoreError::Persistence(storage) => {
                    describe_storage_failure(storage, core.is_retryable())
                }
                _ => None,
            };
        }
        if let Some(storage) = cause.downcast_ref::<StorageError>() {
            return describe_storage_failure(storage, storage.is_recoverable());
        }
    }
    None
}

fn describe_storage_failure(err: &StorageError, retryable: bool) -> Option<String> {
    let retry =
        retryable.then_some("Nothing was saved; run the command again once the problem is fixed.");
    match (err.recovery_suggestion(), retry) {
        (Some(suggestion), Some(retry)) => Some(format!("{} {}", suggestion, retry)),
        (suggestion, retry) => suggestion.or(retry).map(str::to_string),
    }
}

/// Initialize file logging
///
/// Only initializes if BOOKDIARY_LOG is set (e.g. `debug`).
/// Logs to config.log_file or {data_dir}/debug.log.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("BOOKDIARY_LOG") else {
        return;
    };

    let log_path = config.log_path();
    let log_file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
            return;
        }
    };

    let env_filter = EnvFilter::new(format!(
        "bookdiary_core={},bookdiary={}",
        log_level, log_level
    ));

    // Ignore the error if a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();

    info!("Logging initialized to {:?}", log_path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_negative_year() {
        let cli = Cli::try_parse_from(["bookdiary", "book", "add", "The Iliad", "Homer", "-750"])
            .unwrap();
        match cli.command {
            Commands::Book {
                command: BookCommands::Add { year, .. },
            } => assert_eq!(year, -750),
            _ => panic!("expected book add"),
        }
    }

    fn disk_full() -> StorageError {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "No space left on device");
        StorageError::from_io(io_err, PathBuf::from("/data/bookdiary.db"))
    }

    #[test]
    fn test_storage_hint_for_failed_save() {
        let err = anyhow::Error::new(CoreError::Persistence(disk_full()))
            .context("Failed to save book");

        let hint = storage_hint(&err).unwrap();
        assert!(hint.contains("Free up disk space"));
        assert!(hint.contains("run the command again"));
    }

    #[test]
    fn test_storage_hint_for_failed_open() {
        let err = anyhow::Error::new(disk_full()).context("Failed to open SQLite database");
        assert!(storage_hint(&err).unwrap().contains("Free up disk space"));
    }

    #[test]
    fn test_no_storage_hint_for_other_errors() {
        let err = anyhow::anyhow!("Book title cannot be empty");
        assert!(storage_hint(&err).is_none());

        let not_found = anyhow::Error::new(CoreError::AttachmentNotFound(
            bookdiary_core::AttachmentHandle::new(),
        ))
        .context("Failed to read cover");
        assert!(storage_hint(&not_found).is_none());

        let unreadable = anyhow::Error::new(CoreError::Persistence(StorageError::WriteError {
            path: PathBuf::from("/data/x"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "device went away"),
        }));
        assert!(storage_hint(&unreadable).is_none());
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["bookdiary", "genre", "list", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Genre {
                command: GenreCommands::List
            }
        ));
    }
}
