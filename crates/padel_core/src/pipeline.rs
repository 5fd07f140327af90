//! # Match pipeline
//!
//! Wires the stages in order:
//!
//! ```text
//! raw rows → reconcile columns → collapse events → sort by clip start
//!          → track score → infer roster → attribute serves → classify
//! ```
//!
//! Every stage is a pure function of its input; [`MatchReport`] keeps the
//! intermediate results so callers can export whichever tables they need.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregate::{
    category_tables_by_set, classify_event, format_number, top_shots, CategorizedEvent, CategoryTable,
    EventCategory, ShotCount,
};
use crate::collapse::collapse_events;
use crate::columns::{reconcile_columns, AliasTable};
use crate::error::{PadelError, Result};
use crate::score::{track_scores, GameCut, Pairwise, RawScore, ScoreTimeline, Side};
use crate::serve::{
    attribute_serves, serve_stats, ChainResolver, GameOutcome, NameResolver, Roster, ServeAttribution,
    ServeStats, DEFAULT_NAME_OFFSET,
};
use crate::table::{parse_time, Cell, Table};

/// Raw scoreboard columns, side A then side B per field.
pub const SCORE_COLUMNS: [&str; 6] = ["set_p1", "set_p2", "juego_p1", "juego_p2", "punto_p1", "punto_p2"];

/// Columns appended to every event by [`MatchReport::event_table`].
pub const DERIVED_COLUMNS: [&str; 23] = [
    "sets_a",
    "sets_b",
    "games_a",
    "games_b",
    "points_a",
    "points_b",
    "marcador",
    "set_changed",
    "game_changed",
    "point_changed",
    "set_inferred",
    "set_number",
    "game_number",
    "point_number",
    "server",
    "server_pair",
    "game_server",
    "point_winner",
    "point_server_pair",
    "gana_punto_sacador",
    "game_outcome",
    "is_break",
    "categoria",
];

fn default_time_column() -> String {
    "clip_start".to_string()
}

fn default_name_offset() -> usize {
    DEFAULT_NAME_OFFSET
}

fn default_top_shots() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Explicit identity key; auto-detected when unset.
    #[serde(default)]
    pub key_columns: Option<Vec<String>>,
    #[serde(default = "default_time_column")]
    pub time_column: String,
    /// Leading announcement tokens before the server name.
    #[serde(default = "default_name_offset")]
    pub name_offset: usize,
    #[serde(default = "default_top_shots")]
    pub top_shots: usize,
    /// Analyze only up to the event where cumulative games reach this many.
    #[serde(default)]
    pub game_limit: Option<u32>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            key_columns: None,
            time_column: default_time_column(),
            name_offset: default_name_offset(),
            top_shots: default_top_shots(),
            game_limit: None,
        }
    }
}

pub struct MatchPipeline {
    aliases: AliasTable,
    resolver: Box<dyn NameResolver + Send + Sync>,
    options: PipelineOptions,
}

impl Default for MatchPipeline {
    fn default() -> Self {
        Self::new(AliasTable::builtin().clone())
    }
}

impl MatchPipeline {
    pub fn new(aliases: AliasTable) -> Self {
        Self {
            aliases,
            resolver: Box::new(ChainResolver::default()),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn NameResolver + Send + Sync>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Reconcile, collapse and time-sort a raw table.
    pub fn prepare(&self, raw: &Table) -> Result<Table> {
        let reconciled = reconcile_columns(raw, &self.aliases);
        let keys: Option<Vec<&str>> = self
            .options
            .key_columns
            .as_ref()
            .map(|k| k.iter().map(String::as_str).collect());
        let collapsed = collapse_events(&reconciled, keys.as_deref())?;
        Ok(collapsed.sort_by_time(&self.options.time_column))
    }

    /// Run every stage over a raw table.
    pub fn run(&self, raw: &Table) -> Result<MatchReport> {
        let mut events = self.prepare(raw)?;
        let mut raws = extract_raw_scores(&events, &self.options.time_column)?;
        let mut timeline = track_scores(&raws)?;

        let mut cut = None;
        if let Some(limit) = self.options.game_limit {
            match timeline.cut_at_games(limit) {
                Some(c) => {
                    info!(limit, event = c.event_index, scoreline = %c.scoreline, "cutting match at game limit");
                    let keep: Vec<usize> = (0..=c.event_index).collect();
                    events = events.select_rows(&keep);
                    raws.truncate(c.event_index + 1);
                    timeline = track_scores(&raws)?;
                    cut = Some(c);
                }
                None => info!(limit, "game limit not reached, analyzing the whole match"),
            }
        }

        let roster = Roster::infer(
            &column_or_nulls(&events, "pareja"),
            &column_or_nulls(&events, "jugador"),
        )?;
        let attribution = attribute_serves(
            &timeline,
            &column_or_nulls(&events, "servicio"),
            &roster,
            self.resolver.as_ref(),
            self.options.name_offset,
        );
        let stats = serve_stats(&attribution, &roster);

        let winners = column_or_nulls(&events, "winner");
        let errors = column_or_nulls(&events, "error");
        let forced = column_or_nulls(&events, "fuerza_error");
        let categories: Vec<EventCategory> = (0..events.len())
            .map(|i| classify_event(winners[i], errors[i], forced[i]))
            .collect();

        info!(
            events = events.len(),
            sets = timeline.sets.len(),
            games = attribution.games.len(),
            scoreline = %timeline.scoreline(),
            "match processed"
        );

        Ok(MatchReport {
            events,
            timeline,
            roster,
            attribution,
            serve_stats: stats,
            categories,
            cut,
            top_shots: self.options.top_shots,
        })
    }
}

fn column_or_nulls<'t>(table: &'t Table, name: &str) -> Vec<Option<&'t str>> {
    table.column(name).unwrap_or_else(|| {
        debug!(column = name, "column absent, treating as empty");
        vec![None; table.len()]
    })
}

/// Pull the six score columns (and clip start) out of a prepared table.
pub fn extract_raw_scores(table: &Table, time_column: &str) -> Result<Vec<RawScore>> {
    let missing: Vec<String> = SCORE_COLUMNS
        .iter()
        .filter(|c| !table.has_column(c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PadelError::MissingColumns {
            stage: "score",
            columns: missing,
        });
    }

    let cell = |row: usize, col: &str| table.get(row, col).map(str::to_string);
    Ok((0..table.len())
        .map(|i| RawScore {
            clip_start: table.get(i, time_column).and_then(parse_time),
            sets: Pairwise::new(cell(i, "set_p1"), cell(i, "set_p2")),
            games: Pairwise::new(cell(i, "juego_p1"), cell(i, "juego_p2")),
            points: Pairwise::new(cell(i, "punto_p1"), cell(i, "punto_p2")),
        })
        .collect())
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct MatchReport {
    /// Reconciled, collapsed, time-ordered events.
    pub events: Table,
    pub timeline: ScoreTimeline,
    pub roster: Roster,
    pub attribution: ServeAttribution,
    pub serve_stats: Vec<ServeStats>,
    pub categories: Vec<EventCategory>,
    pub cut: Option<GameCut>,
    top_shots: usize,
}

fn text<T: ToString>(v: T) -> Cell {
    Some(v.to_string())
}

fn pair_id(side: Option<Side>) -> Cell {
    side.map(|s| s.pair_id().to_string())
}

impl MatchReport {
    /// Input columns plus the derived columns in [`DERIVED_COLUMNS`] order.
    pub fn event_table(&self) -> Table {
        let mut derived: Vec<Vec<Cell>> = vec![Vec::with_capacity(self.events.len()); DERIVED_COLUMNS.len()];
        for (i, tracked) in self.timeline.events.iter().enumerate() {
            let snap = &tracked.snapshot;
            let serve = &self.attribution.events[i];
            let game = self.attribution.game(tracked.game_number);
            let cells: [Cell; 23] = [
                text(snap.sets.a),
                text(snap.sets.b),
                text(snap.games.a),
                text(snap.games.b),
                text(snap.points.a),
                text(snap.points.b),
                text(snap),
                text(tracked.markers.set_changed),
                text(tracked.markers.game_changed),
                text(tracked.markers.point_changed),
                text(tracked.set_inferred),
                text(tracked.set_number),
                text(tracked.game_number),
                text(tracked.point_number),
                serve.server.clone(),
                pair_id(serve.server_side),
                game.and_then(|g| g.server.clone()),
                pair_id(serve.point_winner),
                pair_id(serve.point_server_side),
                serve.server_won_point.map(|b| b.to_string()),
                game.map(|g| g.outcome.to_string()),
                text(game.is_some_and(|g| g.outcome == GameOutcome::Broken)),
                text(self.categories[i]),
            ];
            for (col, value) in derived.iter_mut().zip(cells) {
                col.push(value);
            }
        }
        DERIVED_COLUMNS
            .iter()
            .zip(derived)
            .fold(self.events.clone(), |t, (name, values)| t.with_column(name, values))
    }

    pub fn sets_table(&self) -> Table {
        let columns = [
            "set",
            "games_a",
            "games_b",
            "score",
            "winner_pair",
            "sets_a",
            "sets_b",
            "clip_start",
            "at_end_of_stream",
        ];
        let rows = self
            .timeline
            .sets
            .iter()
            .map(|s| {
                vec![
                    text(s.number),
                    text(s.games.a),
                    text(s.games.b),
                    text(s.games),
                    text(s.winner.pair_id()),
                    text(s.sets_after.a),
                    text(s.sets_after.b),
                    s.clip_start.map(format_number),
                    text(s.at_end_of_stream),
                ]
            })
            .collect();
        Table::from_parts(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    pub fn serve_stats_table(&self) -> Table {
        let columns = [
            "player",
            "pair_id",
            "serve_points_won",
            "serve_points_total",
            "serve_win_pct",
            "games_held",
            "games_broken",
            "games_served_total",
        ];
        let rows = self
            .serve_stats
            .iter()
            .map(|s| {
                vec![
                    text(&s.player),
                    text(s.pair_id),
                    text(s.serve_points_won),
                    text(s.serve_points_total),
                    text(format_number(s.serve_win_pct)),
                    text(s.games_held),
                    text(s.games_broken),
                    text(s.games_served_total),
                ]
            })
            .collect();
        Table::from_parts(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    /// Per-event view for the aggregator.
    pub fn categorized_events(&self) -> Vec<CategorizedEvent<'_>> {
        let players = column_or_nulls(&self.events, "jugador");
        let shots = column_or_nulls(&self.events, "golpe_q");
        self.timeline
            .events
            .iter()
            .enumerate()
            .map(|(i, tracked)| CategorizedEvent {
                player: players[i],
                category: self.categories[i],
                set_number: tracked.set_number,
                shot: shots[i],
            })
            .collect()
    }

    pub fn category_table(&self) -> CategoryTable {
        CategoryTable::build(&self.categorized_events())
    }

    /// Category tables per set, stacked with a leading `set` column.
    pub fn categories_by_set_table(&self) -> Table {
        let events = self.categorized_events();
        let mut stacked: Option<Table> = None;
        for (set, table) in category_tables_by_set(&events) {
            let label = set.to_string();
            let part = table.to_table(&[("set", label.as_str())]);
            stacked = Some(match stacked {
                None => part,
                Some(acc) => {
                    let (columns, mut rows) = acc.into_parts();
                    rows.extend(part.into_parts().1);
                    Table::from_parts(columns, rows)
                }
            });
        }
        stacked.unwrap_or_else(|| {
            CategoryTable::build(&Vec::<CategorizedEvent>::new())
                .to_table(&[("set", "")])
                .select_rows(&[])
        })
    }

    pub fn top_shots(&self) -> Vec<ShotCount> {
        top_shots(&self.categorized_events(), self.top_shots)
    }

    pub fn top_shots_table(&self) -> Table {
        let rows = self
            .top_shots()
            .into_iter()
            .map(|s| vec![Some(s.player), Some(s.shot), text(s.count)])
            .collect();
        Table::from_parts(vec!["jugador".into(), "golpe_q".into(), "conteo".into()], rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::table;

    const HEADER: [&str; 13] = [
        "Row Name", "Clip Start", "Clip End", "Set P1", "Set P2", "Juego P1", "Juego P2", "Punto P1",
        "Punto P2", "Servicio", "Jugador", "Pareja", "Error",
    ];

    fn match_rows() -> Table {
        table(
            &HEADER,
            &[
                &["Golpe", "0", "1", "0", "0", "0", "0", "0", "0", "1º Servicio Galán", "Galán", "Galán-Chingotto", ""],
                // annotation duplicate of the first event
                &["Golpe", "0", "1", "", "", "", "", "", "", "", "", "", ""],
                &["Golpe", "2", "3", "0", "0", "0", "0", "15", "0", "", "Tapia", "Coello-Tapia", "error no forzado"],
                &["Golpe", "4", "5", "0", "0", "0", "0", "15", "0", "", "Coello", "Coello-Tapia", ""],
            ],
        )
    }

    #[test]
    fn test_run_end_to_end() {
        let report = MatchPipeline::default().run(&match_rows()).unwrap();
        assert_eq!(report.events.len(), 3);

        let events = report.event_table();
        assert_eq!(events.get(1, "point_winner"), Some("1"));
        assert_eq!(events.get(1, "gana_punto_sacador"), Some("true"));
        assert_eq!(events.get(2, "point_winner"), None);
        assert_eq!(events.get(2, "gana_punto_sacador"), None);
        assert_eq!(events.get(0, "server"), Some("Galán"));
        assert_eq!(events.get(2, "game_server"), Some("Galán"));
        assert_eq!(events.get(1, "marcador"), Some("0-0 | 0-0 | 15-0"));
        assert_eq!(events.get(1, "categoria"), Some("error no forzado"));
        assert_eq!(events.get(0, "game_outcome"), Some("held"));
        assert_eq!(events.get(0, "is_break"), Some("false"));
        for name in DERIVED_COLUMNS {
            assert!(events.has_column(name), "missing {name}");
        }

        let stats = report.serve_stats_table();
        assert_eq!(stats.get(0, "player"), Some("Galán"));
        assert_eq!(stats.get(0, "serve_win_pct"), Some("100"));
    }

    #[test]
    fn test_missing_score_columns_named() {
        let t = table(
            &["Row Name", "Clip Start", "Clip End", "Punto P1", "Punto P2"],
            &[&["Golpe", "0", "1", "0", "0"]],
        );
        let err = MatchPipeline::default().run(&t).unwrap_err();
        match err {
            PadelError::MissingColumns { stage, columns } => {
                assert_eq!(stage, "score");
                assert_eq!(columns, vec!["set_p1", "set_p2", "juego_p1", "juego_p2"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_events_sorted_before_tracking() {
        let t = table(
            &["row_name", "clip_start", "clip_end", "set_p1", "set_p2", "juego_p1", "juego_p2", "punto_p1", "punto_p2", "pareja"],
            &[
                &["g", "10", "11", "0", "0", "0", "0", "15", "0", "A-B"],
                &["g", "1", "2", "0", "0", "0", "0", "0", "0", "C-D"],
            ],
        );
        let report = MatchPipeline::default().run(&t).unwrap();
        assert_eq!(report.events.get(0, "clip_start"), Some("1"));
        assert_eq!(report.roster.pair(Side::A).label, "C-D");
    }

    #[test]
    fn test_game_limit_cuts_events() {
        let rows: Vec<[&str; 10]> = vec![
            ["g", "1", "2", "0", "0", "0", "0", "0", "0", "A-B"],
            ["g", "2", "3", "0", "0", "1", "0", "0", "0", "C-D"],
            ["g", "3", "4", "0", "0", "1", "1", "0", "0", "A-B"],
            ["g", "4", "5", "0", "0", "2", "1", "0", "0", "C-D"],
        ];
        let refs: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        let t = table(
            &["row_name", "clip_start", "clip_end", "set_p1", "set_p2", "juego_p1", "juego_p2", "punto_p1", "punto_p2", "pareja"],
            &refs,
        );
        let options = PipelineOptions {
            game_limit: Some(2),
            ..PipelineOptions::default()
        };
        let report = MatchPipeline::default().with_options(options).run(&t).unwrap();
        assert_eq!(report.events.len(), 3);
        assert_eq!(report.cut.as_ref().map(|c| c.scoreline.as_str()), Some("1-1"));
    }

    #[test]
    fn test_category_tables() {
        let report = MatchPipeline::default().run(&match_rows()).unwrap();
        let cats = report.category_table();
        assert_eq!(cats.value("Tapia", "error no forzado"), Some(1.0));
        let by_set = report.categories_by_set_table();
        assert_eq!(by_set.get(0, "set"), Some("1"));
        assert_eq!(by_set.columns()[1], "jugador");
    }
}
