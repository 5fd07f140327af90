//! # Column Reconciler
//!
//! Maps raw, aliased and misspelled headers onto canonical snake_case names
//! and merges every group of equivalent columns into one.
//!
//! ## Algorithm
//! 1. Snake-case every header (`"Inicio Gople: X"` → `inicio_gople_x`)
//! 2. Look the name up in the [`AliasTable`]; unknown names map to themselves
//! 3. Group source columns by target name, ordered canonical-first, then alias
//!    order, then original position
//! 4. Each output cell is the first non-null cell of its group
//!
//! The output column sits where the first member of its group appeared.
//! The alias table is YAML data; a default is compiled in from
//! `data/column_aliases.yaml` and callers may load their own.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PadelError, Result};
use crate::table::{Cell, Table};
use crate::text::snake_case;

/// Built-in alias table (compile-time embedded).
pub const BUILTIN_ALIASES_YAML: &str = include_str!("../data/column_aliases.yaml");

static BUILTIN_ALIASES: OnceLock<AliasTable> = OnceLock::new();

/// One canonical column and the raw spellings folded into it, highest priority first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub canonical: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AliasFile {
    columns: Vec<AliasEntry>,
}

/// Declarative alias table keyed by canonical name.
#[derive(Debug, Clone)]
pub struct AliasTable {
    entries: Vec<AliasEntry>,
    /// snake_case name -> (entry index, priority within entry)
    lookup: FxHashMap<String, (usize, usize)>,
}

impl AliasTable {
    /// Build from entries. Names are snake-cased; a name claimed by two
    /// canonical columns is rejected.
    pub fn from_entries(entries: Vec<AliasEntry>) -> Result<Self> {
        let mut normalized = Vec::with_capacity(entries.len());
        let mut lookup: FxHashMap<String, (usize, usize)> = FxHashMap::default();

        for (idx, entry) in entries.into_iter().enumerate() {
            let canonical = snake_case(&entry.canonical);
            if canonical.is_empty() {
                return Err(PadelError::Config(format!(
                    "alias entry {} has an empty canonical name",
                    idx
                )));
            }

            let mut aliases = Vec::with_capacity(entry.aliases.len());
            for name in std::iter::once(&canonical)
                .cloned()
                .chain(entry.aliases.iter().map(|a| snake_case(a)))
            {
                if let Some(&(other, _)) = lookup.get(&name) {
                    if other == idx {
                        continue;
                    }
                    return Err(PadelError::Config(format!(
                        "column name '{}' is claimed by both '{}' and '{}'",
                        name, normalized_canonical(&normalized, other), canonical
                    )));
                }
                let priority = aliases.len();
                lookup.insert(name.clone(), (idx, priority));
                aliases.push(name);
            }
            // aliases[0] is the canonical name itself
            aliases.remove(0);
            normalized.push(AliasEntry { canonical, aliases });
        }

        Ok(Self {
            entries: normalized,
            lookup,
        })
    }

    /// Parse the YAML format of `data/column_aliases.yaml`.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: AliasFile = serde_yaml::from_str(yaml)?;
        Self::from_entries(file.columns)
    }

    /// The compiled-in alias table.
    ///
    /// # Panics
    ///
    /// Panics if the embedded YAML is invalid, which the test suite rules out.
    pub fn builtin() -> &'static AliasTable {
        BUILTIN_ALIASES.get_or_init(|| {
            AliasTable::from_yaml_str(BUILTIN_ALIASES_YAML)
                .expect("embedded column_aliases.yaml is invalid")
        })
    }

    /// Canonical name and priority for a snake_case header, if known.
    pub fn resolve(&self, name: &str) -> Option<(&str, usize)> {
        self.lookup
            .get(name)
            .map(|&(idx, priority)| (self.entries[idx].canonical.as_str(), priority))
    }

    pub fn entries(&self) -> &[AliasEntry] {
        &self.entries
    }
}

fn normalized_canonical(entries: &[AliasEntry], idx: usize) -> &str {
    entries.get(idx).map(|e| e.canonical.as_str()).unwrap_or("?")
}

/// Rename and merge columns of `table` according to `aliases`.
pub fn reconcile_columns(table: &Table, aliases: &AliasTable) -> Table {
    let targets: Vec<(String, usize)> = table
        .columns()
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let name = snake_case(header);
            let name = if name.is_empty() {
                format!("column_{}", i)
            } else {
                name
            };
            match aliases.resolve(&name) {
                Some((canonical, priority)) => (canonical.to_string(), priority),
                None => (name, 0),
            }
        })
        .collect();

    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    let mut group_of: FxHashMap<&str, usize> = FxHashMap::default();
    for (i, (target, _)) in targets.iter().enumerate() {
        match group_of.get(target.as_str()) {
            Some(&g) => groups[g].1.push(i),
            None => {
                group_of.insert(target.as_str(), groups.len());
                groups.push((target.clone(), vec![i]));
            }
        }
    }
    for (name, members) in groups.iter_mut() {
        // stable: equal priorities keep original column order
        members.sort_by_key(|&i| targets[i].1);
        if members.len() > 1 {
            let sources: Vec<&str> = members.iter().map(|&i| table.columns()[i].as_str()).collect();
            debug!(column = %name, ?sources, "merging equivalent columns");
        }
    }

    let rows: Vec<Vec<Cell>> = table
        .rows()
        .iter()
        .map(|row| {
            groups
                .iter()
                .map(|(_, members)| members.iter().find_map(|&i| row[i].clone()))
                .collect()
        })
        .collect();

    let columns: Vec<String> = groups.into_iter().map(|(name, _)| name).collect();
    Table::from_parts(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::table;

    fn coords() -> AliasTable {
        AliasTable::from_entries(vec![AliasEntry {
            canonical: "inicio_golpe_x".into(),
            aliases: vec!["inicio_gople_x".into(), "start_x".into()],
        }])
        .unwrap()
    }

    #[test]
    fn test_builtin_aliases_parse() {
        let aliases = AliasTable::builtin();
        assert_eq!(aliases.resolve("inicio_gople_x"), Some(("inicio_golpe_x", 1)));
        assert_eq!(aliases.resolve("player"), Some(("jugador", 1)));
        assert_eq!(aliases.resolve("set_p1"), Some(("set_p1", 0)));
        assert_eq!(aliases.resolve("nonexistent"), None);
    }

    #[test]
    fn test_coordinate_aliases_merge_first_non_null() {
        let raw = table(
            &["Start X", "inicio_gople:_x", "Inicio Golpe: X"],
            &[&["1", "2", ""], &["", "2", ""], &["", "", "3"], &["", "", ""]],
        );
        let out = reconcile_columns(&raw, &coords());

        assert_eq!(out.columns(), &["inicio_golpe_x".to_string()]);
        // canonical column wins over aliases, then alias order
        assert_eq!(out.get(0, "inicio_golpe_x"), Some("2"));
        assert_eq!(out.get(1, "inicio_golpe_x"), Some("2"));
        assert_eq!(out.get(2, "inicio_golpe_x"), Some("3"));
        assert_eq!(out.get(3, "inicio_golpe_x"), None);
    }

    #[test]
    fn test_existing_canonical_value_wins() {
        let raw = table(&["inicio_golpe_x", "start_x"], &[&["10", "99"]]);
        let out = reconcile_columns(&raw, &coords());
        assert_eq!(out.get(0, "inicio_golpe_x"), Some("10"));
    }

    #[test]
    fn test_precedence_independent_of_column_order() {
        let a = table(&["start_x", "inicio_gople_x"], &[&["1", "2"]]);
        let b = table(&["inicio_gople_x", "start_x"], &[&["2", "1"]]);
        let out_a = reconcile_columns(&a, &coords());
        let out_b = reconcile_columns(&b, &coords());
        assert_eq!(out_a.get(0, "inicio_golpe_x"), Some("2"));
        assert_eq!(out_b.get(0, "inicio_golpe_x"), Some("2"));
    }

    #[test]
    fn test_unknown_columns_pass_through() {
        let raw = table(&["Row Name", "Mystery Col", "start_x"], &[&["r1", "m", "5"]]);
        let out = reconcile_columns(&raw, &coords());
        assert_eq!(
            out.columns(),
            &[
                "row_name".to_string(),
                "mystery_col".to_string(),
                "inicio_golpe_x".to_string()
            ]
        );
        assert_eq!(out.get(0, "mystery_col"), Some("m"));
    }

    #[test]
    fn test_duplicate_headers_collapse() {
        let raw = table(&["Jugador", "jugador"], &[&["", "Galán"], &["Tapia", "Coello"]]);
        let out = reconcile_columns(&raw, AliasTable::builtin());
        assert_eq!(out.width(), 1);
        assert_eq!(out.get(0, "jugador"), Some("Galán"));
        assert_eq!(out.get(1, "jugador"), Some("Tapia"));
    }

    #[test]
    fn test_conflicting_aliases_rejected() {
        let yaml = r#"
columns:
  - canonical: jugador
    aliases: [player]
  - canonical: rival
    aliases: [Player]
"#;
        let err = AliasTable::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, PadelError::Config(_)));
        assert!(err.to_string().contains("player"));
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        assert!(matches!(
            AliasTable::from_yaml_str("columns: 7"),
            Err(PadelError::Yaml(_))
        ));
    }
}
