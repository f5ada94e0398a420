//! Storage layer
//!
//! - **SQLite**: durable home of books, genres, notes and their links
//! - **Attachments**: cover images and photos as files beside the database
//!
//! The entity store talks to SQLite through the [`Persistence`] trait and
//! never sees SQL directly.

pub mod attachments;
pub mod error;
pub mod persistence;
pub mod schema;

pub use attachments::AttachmentStore;
pub use error::{StorageError, StorageResult};
pub use persistence::{ChangeSet, Pending, Persistence, Snapshot, SqlitePersistence, Stored};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};

/// On-disk footprint of a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub database_exists: bool,
    pub database_size: u64,
    pub attachment_count: usize,
    pub attachment_size: u64,
}

impl StorageStats {
    /// Total bytes on disk
    pub fn total_size(&self) -> u64 {
        self.database_size + self.attachment_size
    }

    /// Total size formatted for display
    pub fn total_size_human(&self) -> String {
        format_bytes(self.total_size())
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_total_size() {
        let stats = StorageStats {
            database_exists: true,
            database_size: 1000,
            attachment_count: 2,
            attachment_size: 24,
        };
        assert_eq!(stats.total_size(), 1024);
        assert_eq!(stats.total_size_human(), "1.0 KB");
    }
}
