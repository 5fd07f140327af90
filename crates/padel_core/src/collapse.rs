//! # Event Collapser
//!
//! Annotation tools export one row per tag, so a single shot usually spans
//! several rows that share `(row name, clip start, clip end)`. Collapsing
//! groups those rows by key equality and keeps, per column, the first
//! non-null value of the group.
//!
//! Output rows follow the first appearance of each key. Collapsing a table
//! that already has one row per key returns it unchanged.

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{PadelError, Result};
use crate::table::{Cell, Table};

/// Candidate identity keys, tried in order: raw export headers, then
/// reconciled snake_case headers.
pub const KEY_CANDIDATES: [[&str; 3]; 2] = [
    ["Row Name", "Clip Start", "Clip End"],
    ["row_name", "clip_start", "clip_end"],
];

/// First candidate key set fully present in `table`, as column indices.
pub fn resolve_keys(table: &Table, candidates: &[[&str; 3]]) -> Result<Vec<usize>> {
    candidates
        .iter()
        .find_map(|keys| {
            keys.iter()
                .map(|k| table.column_index(k))
                .collect::<Option<Vec<usize>>>()
        })
        .ok_or_else(|| PadelError::MissingKeyColumns {
            tried: candidates
                .iter()
                .map(|keys| keys.iter().map(|k| k.to_string()).collect())
                .collect(),
        })
}

/// Collapse rows sharing an identity key.
///
/// `keys` names the key columns explicitly; `None` auto-detects them from
/// [`KEY_CANDIDATES`].
pub fn collapse_events(table: &Table, keys: Option<&[&str]>) -> Result<Table> {
    let key_idx = match keys {
        Some(keys) => keys
            .iter()
            .map(|k| table.column_index(k))
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| PadelError::MissingKeyColumns {
                tried: vec![keys.iter().map(|k| k.to_string()).collect()],
            })?,
        None => resolve_keys(table, &KEY_CANDIDATES)?,
    };

    let mut group_of: FxHashMap<Vec<Option<&str>>, usize> = FxHashMap::default();
    let mut merged: Vec<Vec<Cell>> = Vec::new();
    let mut null_keys = 0usize;

    for row in table.rows() {
        let key: Vec<Option<&str>> = key_idx.iter().map(|&i| row[i].as_deref()).collect();
        if key.iter().any(Option::is_none) {
            null_keys += 1;
        }
        match group_of.get(&key) {
            Some(&g) => {
                let target = &mut merged[g];
                for (cell, value) in target.iter_mut().zip(row) {
                    if cell.is_none() {
                        cell.clone_from(value);
                    }
                }
            }
            None => {
                group_of.insert(key, merged.len());
                merged.push(row.clone());
            }
        }
    }

    if null_keys > 0 {
        warn!(rows = null_keys, "rows with a null identity key cell were grouped as-is");
    }
    debug!(
        input_rows = table.len(),
        events = merged.len(),
        "collapsed annotation rows into events"
    );

    Ok(Table::from_parts(table.columns().to_vec(), merged))
}
