//! Status command handler

use anyhow::Result;

use bookdiary_core::Store;

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(store: &Store, output: &Output) -> Result<()> {
    let stats = store.storage_stats();
    let config = store.config();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "storage": {
                        "database_exists": stats.database_exists,
                        "database_size": stats.database_size,
                        "attachment_count": stats.attachment_count,
                        "attachment_size": stats.attachment_size,
                        "total_size": stats.total_size()
                    },
                    "counts": {
                        "books": store.book_count(),
                        "genres": store.genre_count(),
                        "notes": store.note_count()
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            println!("BookDiary Status");
            println!("================");
            println!();
            println!("Storage:");
            println!("  Location:    {}", config.data_dir.display());
            println!("  Attachments: {}", stats.attachment_count);
            println!("  Size:        {}", stats.total_size_human());
            println!();
            println!("Contents:");
            println!("  Books:  {}", store.book_count());
            println!("  Genres: {}", store.genre_count());
            println!("  Notes:  {}", store.note_count());
        }
    }

    Ok(())
}

/// Remove attachment files no record refers to
pub fn clean(store: &Store, output: &Output) -> Result<()> {
    let removed = store.reclaim_orphaned_attachments()?;
    output.success(&format!("Removed {} unused attachment(s)", removed));
    Ok(())
}
