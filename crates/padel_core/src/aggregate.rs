//! # Aggregator
//!
//! Classifies events into winner / forced error / unforced error / ball in
//! play and rolls them up into per-player tables with `SUMA`, `MEDIA` and
//! `STD` summary rows.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::table::{Cell, Table};
use crate::text::fold;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Winner,
    ForcedError,
    UnforcedError,
    BallInPlay,
}

impl EventCategory {
    pub const ALL: [EventCategory; 4] = [
        EventCategory::Winner,
        EventCategory::ForcedError,
        EventCategory::UnforcedError,
        EventCategory::BallInPlay,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventCategory::Winner => "winner",
            EventCategory::ForcedError => "error forzado",
            EventCategory::UnforcedError => "error no forzado",
            EventCategory::BallInPlay => "bola dentro",
        }
    }

    fn index(self) -> usize {
        match self {
            EventCategory::Winner => 0,
            EventCategory::ForcedError => 1,
            EventCategory::UnforcedError => 2,
            EventCategory::BallInPlay => 3,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const FALSY: [&str; 6] = ["0", "0.0", "false", "no", "n", "f"];

/// A tag cell counts when it holds anything but an explicit false flag.
fn is_tagged(cell: Option<&str>) -> bool {
    cell.map(|v| fold(v.trim()))
        .is_some_and(|v| !v.is_empty() && !FALSY.contains(&v.as_str()))
}

fn names_forced_error(text: &str) -> bool {
    let t = fold(text);
    (t.contains("forzado") && !t.contains("no forzado")) || (t.contains("forced") && !t.contains("unforced"))
}

/// Category of one event from its `winner`, `error` and `fuerza_error` cells.
///
/// Precedence: winner tag, forced-error tag (or error text naming a forced
/// error), any other error text, ball in play.
pub fn classify_event(winner: Option<&str>, error: Option<&str>, forced: Option<&str>) -> EventCategory {
    if is_tagged(winner) {
        EventCategory::Winner
    } else if is_tagged(forced) || error.is_some_and(names_forced_error) {
        EventCategory::ForcedError
    } else if is_tagged(error) {
        EventCategory::UnforcedError
    } else {
        EventCategory::BallInPlay
    }
}

/// The slice of an event the aggregator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategorizedEvent<'a> {
    pub player: Option<&'a str>,
    pub category: EventCategory,
    pub set_number: u16,
    pub shot: Option<&'a str>,
}

/// One row of a category table; `None` renders as an empty cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub player: String,
    pub values: Vec<Option<f64>>,
}

/// Per-player counts and percentages with summary rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<SummaryRow>,
}

pub const SUM_ROW: &str = "SUMA";
pub const MEAN_ROW: &str = "MEDIA";
pub const STD_ROW: &str = "STD";

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Render a number without a trailing `.0` for whole values.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{}", round2(v))
    }
}

impl CategoryTable {
    fn header() -> Vec<String> {
        let mut columns: Vec<String> = EventCategory::ALL.iter().map(|c| c.as_str().to_string()).collect();
        columns.push("total".to_string());
        columns.extend(EventCategory::ALL.iter().map(|c| format!("{}_%", c.as_str())));
        columns
    }

    /// Player rows sorted by name, then `SUMA`, `MEDIA` and `STD`.
    pub fn build<'a>(events: impl IntoIterator<Item = &'a CategorizedEvent<'a>>) -> CategoryTable {
        let mut counts: FxHashMap<&str, [u32; 4]> = FxHashMap::default();
        for e in events {
            if let Some(player) = e.player {
                counts.entry(player).or_default()[e.category.index()] += 1;
            }
        }
        let mut players: Vec<(&str, [u32; 4])> = counts.into_iter().collect();
        players.sort_by(|a, b| a.0.cmp(b.0));

        let player_rows: Vec<SummaryRow> = players
            .into_iter()
            .map(|(player, c)| {
                let total: u32 = c.iter().sum();
                let mut values: Vec<Option<f64>> = c.iter().map(|&n| Some(n as f64)).collect();
                values.push(Some(total as f64));
                values.extend(c.iter().map(|&n| {
                    (total > 0).then(|| round2(n as f64 / total as f64 * 100.0))
                }));
                SummaryRow {
                    player: player.to_string(),
                    values,
                }
            })
            .collect();

        let width = Self::header().len();
        let column = |i: usize| -> Vec<f64> { player_rows.iter().filter_map(|r| r.values[i]).collect() };
        let mut sum = Vec::with_capacity(width);
        let mut mean = Vec::with_capacity(width);
        let mut stdev = Vec::with_capacity(width);
        for i in 0..width {
            let xs = column(i);
            let n = xs.len() as f64;
            let total: f64 = xs.iter().sum();
            sum.push(Some(round2(total)));
            let m = (!xs.is_empty()).then(|| total / n);
            mean.push(m.map(round2));
            stdev.push(m.filter(|_| xs.len() >= 2).map(|m| {
                let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1.0);
                round2(var.sqrt())
            }));
        }

        let mut rows = player_rows;
        for (label, values) in [(SUM_ROW, sum), (MEAN_ROW, mean), (STD_ROW, stdev)] {
            rows.push(SummaryRow {
                player: label.to_string(),
                values,
            });
        }
        CategoryTable {
            columns: Self::header(),
            rows,
        }
    }

    pub fn row(&self, player: &str) -> Option<&SummaryRow> {
        self.rows.iter().find(|r| r.player == player)
    }

    pub fn value(&self, player: &str, column: &str) -> Option<f64> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.row(player)?.values[idx]
    }

    /// Flatten into an exportable [`Table`]; `extra` columns are prepended.
    pub fn to_table(&self, extra: &[(&str, &str)]) -> Table {
        let mut columns: Vec<String> = extra.iter().map(|(k, _)| k.to_string()).collect();
        columns.push("jugador".to_string());
        columns.extend(self.columns.iter().cloned());
        let rows: Vec<Vec<Cell>> = self
            .rows
            .iter()
            .map(|r| {
                let mut row: Vec<Cell> = extra.iter().map(|(_, v)| Some(v.to_string())).collect();
                row.push(Some(r.player.clone()));
                row.extend(r.values.iter().map(|v| v.map(format_number)));
                row
            })
            .collect();
        Table::from_parts(columns, rows)
    }
}

/// One [`CategoryTable`] per set number, ascending.
pub fn category_tables_by_set(events: &[CategorizedEvent<'_>]) -> Vec<(u16, CategoryTable)> {
    let mut sets: Vec<u16> = events.iter().map(|e| e.set_number).collect();
    sets.sort_unstable();
    sets.dedup();
    sets.into_iter()
        .map(|s| (s, CategoryTable::build(events.iter().filter(|e| e.set_number == s))))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotCount {
    pub player: String,
    pub shot: String,
    pub count: u32,
}

fn is_serve_shot(shot: &str) -> bool {
    let s = fold(shot);
    ["saque", "servicio", "service", "serve"].iter().any(|k| s.contains(k))
}

/// Most frequent shot types per player, serves excluded. Players sorted by
/// name; shots by count descending, then name.
pub fn top_shots(events: &[CategorizedEvent<'_>], n: usize) -> Vec<ShotCount> {
    let mut counts: FxHashMap<(&str, &str), u32> = FxHashMap::default();
    for e in events {
        if let (Some(player), Some(shot)) = (e.player, e.shot) {
            if !is_serve_shot(shot) {
                *counts.entry((player, shot)).or_default() += 1;
            }
        }
    }
    let mut all: Vec<ShotCount> = counts
        .into_iter()
        .map(|((player, shot), count)| ShotCount {
            player: player.to_string(),
            shot: shot.to_string(),
            count,
        })
        .collect();
    all.sort_by(|a, b| {
        a.player
            .cmp(&b.player)
            .then(b.count.cmp(&a.count))
            .then(a.shot.cmp(&b.shot))
    });

    let mut out = Vec::new();
    let mut taken: FxHashMap<String, usize> = FxHashMap::default();
    for shot in all {
        let seen = taken.entry(shot.player.clone()).or_default();
        if *seen < n {
            *seen += 1;
            out.push(shot);
        }
    }
    out
}
