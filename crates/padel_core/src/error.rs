use thiserror::Error;

/// Stage failures surfaced to the caller.
///
/// Only schema-level problems end up here. Value-level malformation (an
/// unparseable score cell, an unknown server name) degrades to
/// carry-forward or `None` inside the stage and is logged instead.
#[derive(Error, Debug)]
pub enum PadelError {
    #[error("identity key columns not found, tried: {}", format_key_sets(.tried))]
    MissingKeyColumns { tried: Vec<Vec<String>> },

    #[error("{stage}: missing required columns: {}", .columns.join(", "))]
    MissingColumns {
        stage: &'static str,
        columns: Vec<String>,
    },

    #[error("expected two distinct pairs in column '{column}', found {found}")]
    PairsNotFound { column: String, found: usize },

    #[error(
        "events out of time order at index {index}: clip start {current} after {previous}"
    )]
    OutOfOrder {
        index: usize,
        previous: String,
        current: String,
    },

    #[error("row {row} has {found} cells, table has {expected} columns")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PadelError {
    /// Whether the caller can reasonably retry with different input options
    /// (e.g. explicit key columns) rather than fixing the data itself.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            PadelError::MissingKeyColumns { .. }
                | PadelError::MissingColumns { .. }
                | PadelError::PairsNotFound { .. }
        )
    }
}

fn format_key_sets(sets: &[Vec<String>]) -> String {
    sets.iter()
        .map(|keys| keys.join(", "))
        .collect::<Vec<_>>()
        .join(" | ")
}

pub type Result<T> = std::result::Result<T, PadelError>;
