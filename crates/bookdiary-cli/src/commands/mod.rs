//! Command handlers
//!
//! Every handler that changes data calls `Store::save()` once, after the
//! whole logical action.

pub mod book;
pub mod config;
pub mod genre;
pub mod note;
pub mod status;

use anyhow::{anyhow, bail, Result};
use uuid::Uuid;

use bookdiary_core::{Entity, RecordId, Store};

/// Resolve a record ID given as a full UUID or a unique prefix
///
/// `label` describes a record when listing ambiguous matches.
pub fn resolve_id<E: Entity>(
    store: &Store,
    input: &str,
    label: impl Fn(&E) -> String,
) -> Result<E::Id> {
    let input = input.trim().to_lowercase();
    let kind = E::KIND.to_string().to_lowercase();
    if input.is_empty() {
        bail!("Missing {} ID", kind);
    }

    let records = store.all::<E>();

    if let Ok(uuid) = Uuid::parse_str(&input) {
        return records
            .iter()
            .map(|record| record.id())
            .find(|id| id.uuid() == uuid)
            .ok_or_else(|| anyhow!("{} not found: {}", E::KIND, uuid));
    }

    let matches: Vec<&E> = records
        .into_iter()
        .filter(|record| record.id().to_string().starts_with(&input))
        .collect();

    match matches.as_slice() {
        [] => bail!("No {} found matching: {}", kind, input),
        [only] => Ok(only.id()),
        _ => {
            eprintln!("Multiple {}s match '{}':", kind, input);
            for record in &matches {
                eprintln!("  {} - {}", record.id(), label(*record));
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}
