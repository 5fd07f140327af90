//! Quality report for an event table: required columns, null fractions and
//! numeric sanity checks.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PadelError, Result};
use crate::table::{parse_number, Table};

fn default_required() -> Vec<String> {
    ["row_name", "punto_p1", "punto_p2"].iter().map(|s| s.to_string()).collect()
}

fn default_max_null_frac() -> f64 {
    0.4
}

/// Columns a table is checked against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySchema {
    /// Missing any of these is fatal.
    #[serde(default = "default_required")]
    pub required: Vec<String>,
    #[serde(default)]
    pub warn_if_missing: Vec<String>,
    #[serde(default)]
    pub numeric: Vec<String>,
    #[serde(default = "default_max_null_frac")]
    pub max_null_frac: f64,
}

impl Default for QualitySchema {
    fn default() -> Self {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            required: default_required(),
            warn_if_missing: names(&[
                "set_p1", "set_p2", "juego_p1", "juego_p2", "servicio", "jugador", "pareja", "error",
            ]),
            numeric: names(&["juego_p1", "juego_p2", "set_p1", "set_p2"]),
            max_null_frac: default_max_null_frac(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullFraction {
    pub column: String,
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub rows: usize,
    pub missing_optional: Vec<String>,
    pub null_fraction: Vec<NullFraction>,
    pub high_nulls: Vec<String>,
    pub type_warnings: Vec<String>,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.missing_optional.is_empty() && self.high_nulls.is_empty() && self.type_warnings.is_empty()
    }
}

/// Check `table` against `schema`. Missing required columns fail; the rest
/// is reported.
pub fn validate_table(table: &Table, schema: &QualitySchema) -> Result<QualityReport> {
    let missing: Vec<String> = schema
        .required
        .iter()
        .filter(|c| !table.has_column(c))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(PadelError::MissingColumns {
            stage: "quality",
            columns: missing,
        });
    }

    let missing_optional: Vec<String> = schema
        .warn_if_missing
        .iter()
        .filter(|c| !table.has_column(c))
        .cloned()
        .collect();

    let null_fraction: Vec<NullFraction> = table
        .null_fractions()
        .into_iter()
        .map(|(column, fraction)| NullFraction { column, fraction })
        .collect();
    let high_nulls: Vec<String> = null_fraction
        .iter()
        .filter(|n| n.fraction > schema.max_null_frac)
        .map(|n| n.column.clone())
        .collect();

    let mut type_warnings = Vec::new();
    for name in &schema.numeric {
        let Some(cells) = table.column(name) else {
            continue;
        };
        let bad: Vec<&str> = cells
            .into_iter()
            .flatten()
            .filter(|v| parse_number(v).is_none())
            .collect();
        if let Some(first) = bad.first() {
            type_warnings.push(format!(
                "expected numeric values in '{}', found {} non-numeric (e.g. '{}')",
                name,
                bad.len(),
                first
            ));
        }
    }

    for w in &type_warnings {
        warn!("{}", w);
    }
    if !missing_optional.is_empty() {
        warn!(columns = ?missing_optional, "optional columns missing");
    }

    Ok(QualityReport {
        rows: table.len(),
        missing_optional,
        null_fraction,
        high_nulls,
        type_warnings,
    })
}
