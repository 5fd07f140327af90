//! Padel CLI Library
//!
//! Annotation CSV exports → merged table → match report files
//! (events, sets, serve statistics, category tables, quality report) plus a
//! run manifest with SHA256 checksums of every output.

pub mod config;

use anyhow::{Context, Result};
use padel_core::pipeline::MatchReport;
use padel_core::{normalize_cell, AliasTable, Cell, QualityReport, Table};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use config::{Encoding, IngestConfig};

/// Column added by the merge when `add_source_column` is on.
pub const SOURCE_COLUMN: &str = "__source_file";

/// Read one CSV file into a [`Table`].
///
/// Short rows are padded with nulls and long rows truncated to the header
/// width. Null spellings (`nan`, `NA`, ...) become null cells.
pub fn read_csv(path: &Path, delimiter: u8, encoding: Encoding) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let headers: Vec<String> = reader
        .byte_headers()
        .with_context(|| format!("Failed to read CSV header: {}", path.display()))?
        .iter()
        .map(|h| encoding.decode(h))
        .collect::<Result<_>>()
        .with_context(|| format!("Failed to decode CSV header: {}", path.display()))?;

    let width = headers.len();
    let mut table = Table::new(headers);
    for (line, record) in reader.byte_records().enumerate() {
        let record =
            record.with_context(|| format!("Failed to read row {} of {}", line + 1, path.display()))?;
        let mut row: Vec<Cell> = record
            .iter()
            .take(width)
            .map(|field| encoding.decode(field).map(|s| normalize_cell(&s)))
            .collect::<Result<_>>()
            .with_context(|| format!("Failed to decode row {} of {}", line + 1, path.display()))?;
        row.resize(width, None);
        table.push_row(row)?;
    }

    debug!(file = %path.display(), rows = table.len(), columns = width, "read CSV");
    Ok(table)
}

/// Concatenate tables with the union of their columns (first-seen order).
/// Cells of columns a table lacks are null.
pub fn merge_tables(parts: Vec<(String, Table)>, add_source: bool) -> Result<Table> {
    let mut columns: Vec<String> = Vec::new();
    let mut index: FxHashMap<String, usize> = FxHashMap::default();
    for (_, table) in &parts {
        for name in table.columns() {
            if !index.contains_key(name) {
                index.insert(name.clone(), columns.len());
                columns.push(name.clone());
            }
        }
    }
    if add_source && !index.contains_key(SOURCE_COLUMN) {
        index.insert(SOURCE_COLUMN.to_string(), columns.len());
        columns.push(SOURCE_COLUMN.to_string());
    }

    let mut rows_out: Vec<Vec<Cell>> = Vec::new();
    for (source, table) in parts {
        let targets: Vec<usize> = table.columns().iter().map(|c| index[c]).collect();
        let (_, rows) = table.into_parts();
        for row in rows {
            let mut out: Vec<Cell> = vec![None; columns.len()];
            for (value, &target) in row.into_iter().zip(&targets) {
                // duplicate headers inside one file: keep the first non-null
                if out[target].is_none() {
                    out[target] = value;
                }
            }
            if add_source {
                out[index[SOURCE_COLUMN]] = Some(source.clone());
            }
            rows_out.push(out);
        }
    }
    Ok(Table::from_rows(columns, rows_out)?)
}

/// Read and merge every input file.
pub fn read_inputs(files: &[PathBuf], config: &IngestConfig) -> Result<Table> {
    if files.is_empty() {
        anyhow::bail!("No input CSV files given");
    }
    let delimiter = config.delimiter_byte()?;
    let mut parts = Vec::with_capacity(files.len());
    for path in files {
        info!(file = %path.display(), "reading input");
        let table = read_csv(path, delimiter, config.encoding)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        parts.push((name, table));
    }
    let merged = merge_tables(parts, config.add_source_column)?;
    info!(rows = merged.len(), columns = merged.width(), "inputs merged");
    Ok(merged)
}

/// Load an alias table override, or the built-in one.
pub fn load_aliases(path: Option<&Path>) -> Result<AliasTable> {
    match path {
        Some(path) => {
            let yaml = fs::read_to_string(path)
                .with_context(|| format!("Failed to read alias file: {}", path.display()))?;
            AliasTable::from_yaml_str(&yaml)
                .with_context(|| format!("Invalid alias file: {}", path.display()))
        }
        None => Ok(AliasTable::builtin().clone()),
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Write a table as CSV; null cells are empty fields.
pub fn write_csv(table: &Table, path: &Path, delimiter: u8) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
    Ok(())
}

pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write JSON file: {}", path.display()))
}

/// SHA256 of a file as a hex string.
pub fn sha256_file(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// One written output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFile {
    /// File name relative to the output directory
    pub name: String,
    /// SHA256 checksum (hex string)
    pub checksum: String,
    /// Size in bytes
    pub size: u64,
    /// Data rows, for tabular outputs
    pub rows: Option<usize>,
}

/// Run manifest written as `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Creation time (RFC3339)
    pub created_at: String,
    pub tool_version: String,
    pub inputs: Vec<String>,
    pub events: usize,
    pub scoreline: String,
    /// Scoreline at the game limit, when one was applied
    pub cut_scoreline: Option<String>,
    pub outputs: Vec<OutputFile>,
}

impl RunManifest {
    /// Recompute every output checksum and list the files that no longer match.
    pub fn verify(&self, out_dir: &Path) -> Result<Vec<String>> {
        let mut mismatched = Vec::new();
        for output in &self.outputs {
            if sha256_file(&out_dir.join(&output.name))? != output.checksum {
                mismatched.push(output.name.clone());
            }
        }
        Ok(mismatched)
    }
}

fn record_output(out_dir: &Path, name: &str, rows: Option<usize>) -> Result<OutputFile> {
    let path = out_dir.join(name);
    let size = fs::metadata(&path)
        .with_context(|| format!("Failed to stat output: {}", path.display()))?
        .len();
    Ok(OutputFile {
        name: name.to_string(),
        checksum: sha256_file(&path)?,
        size,
        rows,
    })
}

/// Write every report table into `out_dir` and return the manifest, which
/// is itself written as `manifest.json`.
pub fn write_match_outputs(
    report: &MatchReport,
    quality: &QualityReport,
    out_dir: &Path,
    inputs: &[PathBuf],
    delimiter: u8,
) -> Result<RunManifest> {
    // 1. Tabular outputs
    let tables: [(&str, Table); 6] = [
        ("events.csv", report.event_table()),
        ("sets.csv", report.sets_table()),
        ("serve_stats.csv", report.serve_stats_table()),
        ("categories.csv", report.category_table().to_table(&[])),
        ("categories_by_set.csv", report.categories_by_set_table()),
        ("top_shots.csv", report.top_shots_table()),
    ];

    let mut outputs = Vec::with_capacity(tables.len() + 1);
    for (name, table) in &tables {
        write_csv(table, &out_dir.join(name), delimiter)?;
        outputs.push(record_output(out_dir, name, Some(table.len()))?);
    }

    // 2. Quality report
    write_json(quality, &out_dir.join("quality_report.json"))?;
    outputs.push(record_output(out_dir, "quality_report.json", None)?);

    // 3. Manifest
    let manifest = RunManifest {
        created_at: chrono::Utc::now().to_rfc3339(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        inputs: inputs.iter().map(|p| p.display().to_string()).collect(),
        events: report.events.len(),
        scoreline: report.timeline.scoreline(),
        cut_scoreline: report.cut.as_ref().map(|c| c.scoreline.clone()),
        outputs,
    };
    write_json(&manifest, &out_dir.join("manifest.json"))?;
    info!(dir = %out_dir.display(), files = manifest.outputs.len() + 1, "outputs written");
    Ok(manifest)
}
