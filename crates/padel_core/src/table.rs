//! # Event Table
//!
//! The in-memory table every pipeline stage consumes and produces.
//!
//! Cells are `Option<String>`: raw annotation exports mix numbers, labels and
//! free text in the same column, so values stay textual and each stage parses
//! what it needs. Column names may repeat until the column reconciler has run.

use serde::{Deserialize, Serialize};

use crate::error::{PadelError, Result};

/// A nullable table cell.
pub type Cell = Option<String>;

/// Textual spellings of "no value" produced by spreadsheet and dataframe exports.
pub const NULL_TOKENS: [&str; 8] = ["", "nan", "NaN", "None", "NA", "<NA>", "null", "NULL"];

/// Trim a raw cell and map null spellings to `None`.
pub fn normalize_cell(raw: &str) -> Cell {
    let trimmed = raw.trim();
    if NULL_TOKENS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a numeric cell, accepting a decimal comma (`"12,5"`).
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a clip timestamp: plain seconds (`"83.4"`) or `[hh:]mm:ss[.fff]`.
pub fn parse_time(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if !raw.contains(':') {
        return parse_number(raw);
    }
    let mut seconds = 0.0;
    for part in raw.split(':') {
        seconds = seconds * 60.0 + parse_number(part)?;
    }
    Some(seconds)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Empty table with the given header.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table, checking that every row matches the header width.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Assemble a table whose rows are already known to match the header.
    pub(crate) fn from_parts(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { columns, rows }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(PadelError::RowWidth {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Cell>>) {
        (self.columns, self.rows)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Index of the first column with this exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Non-null value of `column` in `row`.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// Cells of one column, `None` if the column is absent.
    pub fn column(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx].as_deref()).collect())
    }

    /// Append a column, or overwrite it if the name already exists.
    ///
    /// `values` shorter than the table are padded with nulls.
    pub fn with_column(mut self, name: &str, mut values: Vec<Cell>) -> Self {
        values.resize(self.rows.len(), None);
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        self
    }

    /// New table holding the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Drop columns that are null in every row.
    pub fn drop_empty_columns(self) -> Table {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&c| self.rows.iter().any(|r| r[c].is_some()))
            .collect();
        Table {
            columns: keep.iter().map(|&c| self.columns[c].clone()).collect(),
            rows: self
                .rows
                .into_iter()
                .map(|r| keep.iter().map(|&c| r[c].clone()).collect())
                .collect(),
        }
    }

    /// Fraction of null cells per column, in column order.
    pub fn null_fractions(&self) -> Vec<(String, f64)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(c, name)| {
                let frac = if self.rows.is_empty() {
                    0.0
                } else {
                    let nulls = self.rows.iter().filter(|r| r[c].is_none()).count();
                    nulls as f64 / self.rows.len() as f64
                };
                (name.clone(), frac)
            })
            .collect()
    }

    /// Stable sort by clip start time; rows without a parseable time go last.
    pub fn sort_by_time(&self, column: &str) -> Table {
        let Some(idx) = self.column_index(column) else {
            return self.clone();
        };
        let mut order: Vec<(usize, Option<f64>)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| (i, r[idx].as_deref().and_then(parse_time)))
            .collect();
        order.sort_by(|(_, a), (_, b)| match (a, b) {
            (Some(a), Some(b)) => a.total_cmp(b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        let indices: Vec<usize> = order.into_iter().map(|(i, _)| i).collect();
        self.select_rows(&indices)
    }
}

/// Shorthand used throughout the tests: `row(&["a", "", "c"])`.
#[cfg(test)]
pub(crate) fn row(values: &[&str]) -> Vec<Cell> {
    values.iter().map(|v| normalize_cell(v)).collect()
}

#[cfg(test)]
pub(crate) fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
    Table::from_rows(
        columns.iter().map(|c| c.to_string()).collect(),
        rows.iter().map(|r| row(r)).collect(),
    )
    .expect("test table rows match header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_cell_null_tokens() {
        assert_eq!(normalize_cell("  15 "), Some("15".to_string()));
        assert_eq!(normalize_cell("nan"), None);
        assert_eq!(normalize_cell("<NA>"), None);
        assert_eq!(normalize_cell("   "), None);
        assert_eq!(normalize_cell("0"), Some("0".to_string()));
    }

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(parse_time("83.5"), Some(83.5));
        assert_eq!(parse_time("83,5"), Some(83.5));
        assert_eq!(parse_time("01:23.5"), Some(83.5));
        assert_eq!(parse_time("1:01:00"), Some(3660.0));
        assert_eq!(parse_time("abc"), None);
    }

    #[test]
    fn test_push_row_rejects_wrong_width() {
        let mut t = Table::new(vec!["a".into(), "b".into()]);
        let err = t.push_row(row(&["1"])).unwrap_err();
        assert!(matches!(
            err,
            PadelError::RowWidth {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_with_column_appends_and_overwrites() {
        let t = table(&["a"], &[&["1"], &["2"]]);
        let t = t.with_column("b", vec![Some("x".into())]);
        assert_eq!(t.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(t.get(0, "b"), Some("x"));
        assert_eq!(t.get(1, "b"), None);

        let t = t.with_column("a", vec![Some("9".into()), None]);
        assert_eq!(t.get(0, "a"), Some("9"));
        assert_eq!(t.get(1, "a"), None);
        assert_eq!(t.width(), 2);
    }

    #[test]
    fn test_sort_by_time_is_stable_and_puts_missing_last() {
        let t = table(
            &["clip_start", "id"],
            &[&["10", "a"], &["", "b"], &["5", "c"], &["10", "d"]],
        );
        let sorted = t.sort_by_time("clip_start");
        let ids: Vec<_> = (0..4).map(|i| sorted.get(i, "id").unwrap()).collect();
        assert_eq!(ids, vec!["c", "a", "d", "b"]);
    }

    #[test]
    fn test_drop_empty_columns_and_null_fractions() {
        let t = table(&["a", "b", "c"], &[&["1", "", "x"], &["", "", "y"]]);
        let fracs = t.null_fractions();
        assert_eq!(fracs[0], ("a".to_string(), 0.5));
        assert_eq!(fracs[1], ("b".to_string(), 1.0));

        let dropped = t.drop_empty_columns();
        assert_eq!(dropped.columns(), &["a".to_string(), "c".to_string()]);
        assert_eq!(dropped.get(1, "c"), Some("y"));
    }
}
