//! Batch run configuration (YAML).
//!
//! ```yaml
//! raw_dir: data/raw
//! file_extension: csv
//! delimiter: ";"
//! encoding: latin-1
//! add_source_column: true
//! out_dir: out/final
//! aliases: config/column_aliases.yaml
//! pipeline:
//!   game_limit: 12
//! ```

use anyhow::{Context, Result};
use padel_core::{PipelineOptions, QualitySchema};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Text encoding of the input CSV files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl Encoding {
    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_string)
                .context("invalid UTF-8 (set encoding: latin-1 for Latin-1 exports)"),
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

fn default_extension() -> String {
    "csv".to_string()
}

fn default_delimiter() -> String {
    ",".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Explicit input files
    #[serde(default)]
    pub inputs: Vec<PathBuf>,
    /// Directory scanned for files with `file_extension`
    #[serde(default)]
    pub raw_dir: Option<PathBuf>,
    #[serde(default = "default_extension")]
    pub file_extension: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default)]
    pub add_source_column: bool,
    /// Drop all-null columns from the collapsed export
    #[serde(default)]
    pub drop_empty_columns: bool,
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
    /// Alias table overriding the built-in one
    #[serde(default)]
    pub aliases: Option<PathBuf>,
    #[serde(default)]
    pub pipeline: PipelineOptions,
    #[serde(default)]
    pub quality: QualitySchema,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            raw_dir: None,
            file_extension: default_extension(),
            delimiter: default_delimiter(),
            encoding: Encoding::default(),
            add_source_column: false,
            drop_empty_columns: false,
            out_dir: None,
            aliases: None,
            pipeline: PipelineOptions::default(),
            quality: QualitySchema::default(),
        }
    }
}

impl IngestConfig {
    /// Load from YAML. Relative paths are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: IngestConfig = serde_yaml::from_str(&yaml)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        Ok(config)
    }

    fn resolve_relative(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.inputs.iter_mut().for_each(fix);
        self.raw_dir.iter_mut().for_each(fix);
        self.out_dir.iter_mut().for_each(fix);
        self.aliases.iter_mut().for_each(fix);
    }

    /// Field delimiter as a byte; accepts a single ASCII character or `tab`.
    pub fn delimiter_byte(&self) -> Result<u8> {
        match self.delimiter.as_str() {
            "tab" | "\\t" | "\t" => Ok(b'\t'),
            d if d.len() == 1 && d.is_ascii() => Ok(d.as_bytes()[0]),
            other => anyhow::bail!("delimiter must be a single ASCII character, got {:?}", other),
        }
    }

    /// Explicit inputs followed by the sorted contents of `raw_dir`.
    pub fn input_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = self.inputs.clone();
        if let Some(dir) = &self.raw_dir {
            let mut found: Vec<PathBuf> = fs::read_dir(dir)
                .with_context(|| format!("Failed to list input directory: {}", dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .is_some_and(|e| e.eq_ignore_ascii_case(self.file_extension.as_str()))
                })
                .collect();
            found.sort();
            files.extend(found);
        }
        if files.is_empty() {
            anyhow::bail!("No input files: set `inputs` or `raw_dir`");
        }
        Ok(files)
    }
}
