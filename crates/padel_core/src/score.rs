//! # Score Tracker
//!
//! Rebuilds a consistent set/game/point timeline from the scoreboard columns
//! annotated on each event. Raw counters are frequently missing, lag behind
//! the play, or only update one side, so the tracker is a forward fold over
//! the time-ordered events threading a [`TrackerState`] accumulator.
//!
//! ## Algorithm (per event)
//! 1. Parse set/game counters; missing or malformed values carry forward
//! 2. Parse point labels (0/15/30/40/adv); same carry-forward, `0` at start
//! 3. One-sided set counters in {0, 1} infer the other side as the complement
//! 4. Set boundary: explicit set-pair change, or games reset to 0-0 from a
//!    non-zero score; the closed set is inferred from the previous games
//! 5. Game boundary: game counters differ, or a set boundary happened
//! 6. Point boundary: either point label differs
//!
//! A trailing set still open at the end of the stream is inferred from the
//! last games score. Malformed values never fail the fold; they are logged.

use std::cmp::max;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PadelError, Result};
use crate::table::parse_number;

/// Score side. Side A is pair 1 (`*_p1` columns), side B is pair 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    /// Stable pair id (1 or 2).
    pub fn pair_id(self) -> u8 {
        match self {
            Side::A => 1,
            Side::B => 2,
        }
    }

    pub fn from_pair_id(id: u8) -> Option<Side> {
        match id {
            1 => Some(Side::A),
            2 => Some(Side::B),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pair_id())
    }
}

/// A value per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Pairwise<T> {
    pub a: T,
    pub b: T,
}

impl<T> Pairwise<T> {
    pub fn new(a: T, b: T) -> Self {
        Self { a, b }
    }

    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Pairwise<U> {
        Pairwise {
            a: f(self.a),
            b: f(self.b),
        }
    }

    pub fn as_ref(&self) -> Pairwise<&T> {
        Pairwise {
            a: &self.a,
            b: &self.b,
        }
    }
}

impl Pairwise<u8> {
    pub const ZERO: Pairwise<u8> = Pairwise { a: 0, b: 0 };

    pub fn total(&self) -> u32 {
        self.a as u32 + self.b as u32
    }

    /// The side strictly ahead, if any.
    pub fn leader(&self) -> Option<Side> {
        match self.a.cmp(&self.b) {
            std::cmp::Ordering::Greater => Some(Side::A),
            std::cmp::Ordering::Less => Some(Side::B),
            std::cmp::Ordering::Equal => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Pairwise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.a, self.b)
    }
}

/// Games per side in one set.
pub type GameScore = Pairwise<u8>;

/// Point label within a game, ordered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum PointLabel {
    #[default]
    Love,
    Fifteen,
    Thirty,
    Forty,
    Advantage,
}

impl PointLabel {
    /// Parse a raw point cell. Accepts numeric spellings (`"15"`, `"15.0"`)
    /// and the usual advantage markers (`"Adv"`, `"AD"`, `"A"`, `"ventaja"`).
    pub fn parse(raw: &str) -> Option<PointLabel> {
        let raw = raw.trim();
        if let Some(n) = parse_number(raw) {
            return match n {
                n if n == 0.0 => Some(PointLabel::Love),
                n if n == 15.0 => Some(PointLabel::Fifteen),
                n if n == 30.0 => Some(PointLabel::Thirty),
                n if n == 40.0 => Some(PointLabel::Forty),
                _ => None,
            };
        }
        match raw.to_lowercase().as_str() {
            "love" => Some(PointLabel::Love),
            "adv" | "ad" | "a" | "advantage" | "ventaja" | "v" => Some(PointLabel::Advantage),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PointLabel::Love => "0",
            PointLabel::Fifteen => "15",
            PointLabel::Thirty => "30",
            PointLabel::Forty => "40",
            PointLabel::Advantage => "adv",
        }
    }
}

impl fmt::Display for PointLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconstructed scoreboard at one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub sets: Pairwise<u8>,
    pub games: GameScore,
    pub points: Pairwise<PointLabel>,
}

impl fmt::Display for ScoreSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} | {}", self.sets, self.games, self.points)
    }
}

/// Raw scoreboard cells of one event, before reconstruction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawScore {
    /// Clip start in seconds, used to validate ordering.
    pub clip_start: Option<f64>,
    pub sets: Pairwise<Option<String>>,
    pub games: Pairwise<Option<String>>,
    pub points: Pairwise<Option<String>>,
}

/// Derived boundary flags versus the previous event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundaryMarkers {
    pub set_changed: bool,
    pub game_changed: bool,
    pub point_changed: bool,
}

/// A set inferred as closed, with its final games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedSet {
    pub games: GameScore,
    pub winner: Side,
}

/// Tracker output for one event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedScore {
    pub clip_start: Option<f64>,
    pub snapshot: ScoreSnapshot,
    pub markers: BoundaryMarkers,
    /// Set counters completed by the two-set heuristic.
    pub set_inferred: bool,
    /// Set closed at this event (from the previous event's games).
    pub closed_set: Option<ClosedSet>,
    /// 1-based set this event belongs to.
    pub set_number: u16,
    /// 1-based running game id across the match.
    pub game_number: u32,
    /// 1-based running point id across the match.
    pub point_number: u32,
    /// Games of closed sets plus games of the current set.
    pub games_total: u32,
}

/// Summary row of a closed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetSummary {
    pub number: u16,
    pub games: GameScore,
    pub winner: Side,
    /// Running set tally after this set.
    pub sets_after: Pairwise<u8>,
    pub event_index: usize,
    pub clip_start: Option<f64>,
    /// Inferred from the final event rather than a boundary.
    pub at_end_of_stream: bool,
}

/// Truncation point returned by [`ScoreTimeline::cut_at_games`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameCut {
    pub event_index: usize,
    pub scoreline: String,
}

/// Full tracker result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreTimeline {
    pub events: Vec<TrackedScore>,
    pub sets: Vec<SetSummary>,
}

impl ScoreTimeline {
    /// Closed set scores separated by spaces, e.g. `"6-4 3-6 6-2"`.
    pub fn scoreline(&self) -> String {
        self.sets
            .iter()
            .map(|s| s.games.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// First event where the cumulative games reach `limit`, with the
    /// scoreline at that point (closed sets, then the current set's games).
    pub fn cut_at_games(&self, limit: u32) -> Option<GameCut> {
        let idx = self.events.iter().position(|e| e.games_total >= limit)?;
        let event = &self.events[idx];
        let mut parts: Vec<String> = self
            .sets
            .iter()
            .filter(|s| s.event_index <= idx && !s.at_end_of_stream)
            .map(|s| s.games.to_string())
            .collect();
        parts.push(event.snapshot.games.to_string());
        Some(GameCut {
            event_index: idx,
            scoreline: parts.join(" "),
        })
    }
}

/// Standard set-win margin: two clear games, or a 7-5 / 7-6 finish.
fn has_win_margin(winner: u8, loser: u8) -> bool {
    (winner > loser && winner - loser >= 2) || (winner == 7 && (loser == 5 || loser == 6))
}

/// Infer the final score of a set that closed right after `games`.
///
/// The observed lead must already satisfy the win margin. A winner below six
/// games is completed to `max(6, loser + 1)`. Returns `None` when the score
/// cannot be a finished set.
pub fn infer_closed_set(games: GameScore) -> Option<ClosedSet> {
    let winner = games.leader()?;
    let (w, l) = (*games.get(winner), *games.get(winner.other()));
    if !has_win_margin(w, l) {
        return None;
    }
    let final_w = if w >= 6 { w } else { max(6, l + 1) };
    if final_w < 6 || !has_win_margin(final_w, l) {
        return None;
    }
    let mut final_games = games;
    *final_games.get_mut(winner) = final_w;
    Some(ClosedSet {
        games: final_games,
        winner,
    })
}

fn parse_counter(raw: Option<&str>, field: &'static str, index: usize) -> Option<u8> {
    let raw = raw?;
    let parsed = parse_number(raw)
        .filter(|v| *v >= 0.0 && v.fract() == 0.0 && *v <= u8::MAX as f64)
        .map(|v| v as u8);
    if parsed.is_none() {
        warn!(event = index, field, value = raw, "unparseable score counter, carrying forward");
    }
    parsed
}

fn parse_point(raw: Option<&str>, field: &'static str, index: usize) -> Option<PointLabel> {
    let raw = raw?;
    let parsed = PointLabel::parse(raw);
    if parsed.is_none() {
        warn!(event = index, field, value = raw, "unparseable point label, carrying forward");
    }
    parsed
}

/// Accumulator threaded through the fold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerState {
    prev: Option<ScoreSnapshot>,
    set_number: u16,
    game_number: u32,
    point_number: u32,
    games_base: u32,
    /// Games the last set was closed from, until play resumes in the new set.
    recent_close: Option<GameScore>,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            prev: None,
            set_number: 1,
            game_number: 1,
            point_number: 1,
            games_base: 0,
            recent_close: None,
        }
    }
}

impl TrackerState {
    /// Snapshot of the last event folded in.
    pub fn last_snapshot(&self) -> Option<ScoreSnapshot> {
        self.prev
    }

    /// Fold one event into the state.
    pub fn advance(&self, raw: &RawScore, index: usize) -> (TrackerState, TrackedScore) {
        let started = self.prev.is_some();
        let prev = self.prev.unwrap_or_default();

        let raw_sets = Pairwise::new(
            parse_counter(raw.sets.a.as_deref(), "set_p1", index),
            parse_counter(raw.sets.b.as_deref(), "set_p2", index),
        );
        let raw_games = Pairwise::new(
            parse_counter(raw.games.a.as_deref(), "juego_p1", index),
            parse_counter(raw.games.b.as_deref(), "juego_p2", index),
        );
        let raw_points = Pairwise::new(
            parse_point(raw.points.a.as_deref(), "punto_p1", index),
            parse_point(raw.points.b.as_deref(), "punto_p2", index),
        );

        let (sets, set_inferred) = resolve_sets(raw_sets, prev.sets);

        let mut games = Pairwise::new(
            raw_games.a.unwrap_or(prev.games.a),
            raw_games.b.unwrap_or(prev.games.b),
        );

        // set_number of the first event follows its own set counters
        let set_number = if started {
            self.set_number
        } else {
            sets.total() as u16 + 1
        };

        let explicit = started && sets != prev.sets;
        let implicit = started && games == GameScore::ZERO && prev.games != GameScore::ZERO;
        // a lagging set counter catching up with a close already counted
        let confirms = explicit && sets.total() < u32::from(set_number);
        if confirms {
            debug!(event = index, sets = %sets, set_number, "set counter caught up with an earlier close");
        }
        let explicit = explicit && !confirms;

        let mut closed_set = None;
        let mut set_changed = false;
        if explicit || implicit {
            if self.recent_close.is_some() {
                debug!(event = index, "set boundary already counted, no play since");
            } else {
                closed_set = infer_closed_set(prev.games);
                if closed_set.is_none() {
                    debug!(event = index, games = %prev.games, "no valid closed set from previous games");
                }
                set_changed = explicit || closed_set.is_some();
            }
        }

        if set_changed {
            if raw_games.a.is_none() {
                games.a = 0;
            }
            if raw_games.b.is_none() {
                games.b = 0;
            }
            if closed_set.is_some() && games == prev.games {
                // stale counters from the set that just closed
                games = GameScore::ZERO;
            }
        } else if started && (games.a < prev.games.a || games.b < prev.games.b) {
            warn!(event = index, from = %prev.games, to = %games, "game counter went backwards");
        }
        if started && (sets.a < prev.sets.a || sets.b < prev.sets.b) {
            warn!(event = index, from = %prev.sets, to = %sets, "set counter went backwards");
        }

        let game_changed = started && (set_changed || games != prev.games);

        let mut points = Pairwise::new(
            raw_points.a.unwrap_or(prev.points.a),
            raw_points.b.unwrap_or(prev.points.b),
        );
        if game_changed {
            if raw_points.a.is_none() {
                points.a = PointLabel::Love;
            }
            if raw_points.b.is_none() {
                points.b = PointLabel::Love;
            }
        }
        let point_changed = started && points != prev.points;

        let games_base = if set_changed {
            self.games_base
                + closed_set
                    .map(|c| c.games.total())
                    .unwrap_or_else(|| prev.games.total())
        } else {
            self.games_base
        };

        let recent_close = if set_changed {
            Some(prev.games)
        } else {
            match self.recent_close {
                Some(from) if games != from && games != GameScore::ZERO => None,
                other => other,
            }
        };

        let snapshot = ScoreSnapshot {
            sets,
            games,
            points,
        };
        let next = TrackerState {
            prev: Some(snapshot),
            set_number: set_number.saturating_add(set_changed as u16),
            game_number: self.game_number + game_changed as u32,
            point_number: self.point_number + (point_changed || game_changed) as u32,
            games_base,
            recent_close,
        };
        let tracked = TrackedScore {
            clip_start: raw.clip_start,
            snapshot,
            markers: BoundaryMarkers {
                set_changed,
                game_changed,
                point_changed,
            },
            set_inferred,
            closed_set,
            set_number: next.set_number,
            game_number: next.game_number,
            point_number: next.point_number,
            games_total: games_base + games.total(),
        };
        (next, tracked)
    }
}

/// Complete one-sided set counters (two-set heuristic) or carry forward.
fn resolve_sets(raw: Pairwise<Option<u8>>, prev: Pairwise<u8>) -> (Pairwise<u8>, bool) {
    match (raw.a, raw.b) {
        (Some(a), Some(b)) => (Pairwise::new(a, b), false),
        (None, None) => (prev, false),
        (Some(a), None) if a <= 1 => (Pairwise::new(a, 1 - a), true),
        (Some(a), None) => (Pairwise::new(a, prev.b), false),
        (None, Some(b)) if b <= 1 => (Pairwise::new(1 - b, b), true),
        (None, Some(b)) => (Pairwise::new(prev.a, b), false),
    }
}

/// Reject streams that are not ordered by clip start. Missing times may
/// only appear at the tail.
pub fn validate_time_order(raws: &[RawScore]) -> Result<()> {
    let mut last: Option<f64> = None;
    let mut seen_missing = false;
    for (index, raw) in raws.iter().enumerate() {
        match raw.clip_start {
            Some(t) => {
                let out_of_order = seen_missing || last.is_some_and(|prev| t < prev);
                if out_of_order {
                    return Err(PadelError::OutOfOrder {
                        index,
                        previous: last.map_or_else(|| "missing".to_string(), |p| format!("{p:.3}")),
                        current: format!("{t:.3}"),
                    });
                }
                last = Some(t);
            }
            None => seen_missing = true,
        }
    }
    Ok(())
}

/// Run the tracker over a time-ordered event stream.
pub fn track_scores(raws: &[RawScore]) -> Result<ScoreTimeline> {
    validate_time_order(raws)?;

    let mut state = TrackerState::default();
    let mut timeline = ScoreTimeline::default();
    let mut tally = Pairwise::<u8>::ZERO;

    for (index, raw) in raws.iter().enumerate() {
        let (next, tracked) = state.advance(raw, index);
        if let Some(closed) = tracked.closed_set {
            let won = tally.get_mut(closed.winner);
            *won = won.saturating_add(1);
            timeline.sets.push(SetSummary {
                number: (timeline.sets.len() as u16).saturating_add(1),
                games: closed.games,
                winner: closed.winner,
                sets_after: tally,
                event_index: index,
                clip_start: tracked.clip_start,
                at_end_of_stream: false,
            });
        }
        timeline.events.push(tracked);
        state = next;
    }

    if let (Some(last), None) = (timeline.events.last(), state.recent_close) {
        if let Some(closed) = infer_closed_set(last.snapshot.games) {
            let won = tally.get_mut(closed.winner);
            *won = won.saturating_add(1);
            timeline.sets.push(SetSummary {
                number: (timeline.sets.len() as u16).saturating_add(1),
                games: closed.games,
                winner: closed.winner,
                sets_after: tally,
                event_index: timeline.events.len() - 1,
                clip_start: last.clip_start,
                at_end_of_stream: true,
            });
        }
    }

    debug!(
        events = timeline.events.len(),
        sets = timeline.sets.len(),
        scoreline = %timeline.scoreline(),
        "score timeline reconstructed"
    );
    Ok(timeline)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cell(v: &str) -> Option<String> {
        if v.is_empty() {
            None
        } else {
            Some(v.to_string())
        }
    }

    /// `raw("1-0", "3-2", "15-0")`; empty halves are missing cells.
    pub(crate) fn raw(sets: &str, games: &str, points: &str) -> RawScore {
        let split = |s: &str| -> Pairwise<Option<String>> {
            let (a, b) = s.split_once('-').unwrap_or((s, ""));
            Pairwise::new(cell(a), cell(b))
        };
        RawScore {
            clip_start: None,
            sets: split(sets),
            games: split(games),
            points: split(points),
        }
    }

    pub(crate) fn timed(mut raws: Vec<RawScore>) -> Vec<RawScore> {
        for (i, r) in raws.iter_mut().enumerate() {
            r.clip_start = Some(i as f64);
        }
        raws
    }

    fn sets_of(t: &ScoreTimeline) -> Vec<String> {
        t.events.iter().map(|e| e.snapshot.sets.to_string()).collect()
    }

    #[test]
    fn test_point_label_parse() {
        assert_eq!(PointLabel::parse("15"), Some(PointLabel::Fifteen));
        assert_eq!(PointLabel::parse("40.0"), Some(PointLabel::Forty));
        assert_eq!(PointLabel::parse("Adv"), Some(PointLabel::Advantage));
        assert_eq!(PointLabel::parse("AD"), Some(PointLabel::Advantage));
        assert_eq!(PointLabel::parse("20"), None);
        assert_eq!(PointLabel::parse("x"), None);
        assert!(PointLabel::Advantage > PointLabel::Forty);
    }

    #[test]
    fn test_snapshot_display() {
        let snap = ScoreSnapshot {
            sets: Pairwise::new(1, 0),
            games: Pairwise::new(3, 2),
            points: Pairwise::new(PointLabel::Fifteen, PointLabel::Advantage),
        };
        insta::assert_snapshot!(snap.to_string(), @"1-0 | 3-2 | 15-adv");
    }

    #[test]
    fn test_set_carry_forward() {
        let t = track_scores(&timed(vec![
            raw("1-0", "0-0", "0-0"),
            raw("-", "0-0", "0-0"),
            raw("2-0", "0-0", "0-0"),
        ]))
        .unwrap();
        assert_eq!(sets_of(&t), vec!["1-0", "1-0", "2-0"]);
    }

    #[test]
    fn test_two_set_heuristic() {
        let t = track_scores(&timed(vec![raw("0-0", "1-1", "0-0"), raw("1-", "1-1", "0-0")]))
            .unwrap();
        assert_eq!(t.events[1].snapshot.sets, Pairwise::new(1, 0));
        assert!(t.events[1].set_inferred);

        let t = track_scores(&timed(vec![raw("-0", "1-1", "0-0")])).unwrap();
        assert_eq!(t.events[0].snapshot.sets, Pairwise::new(1, 0));

        // outside {0, 1}: carry the missing side instead of inferring -2
        let t = track_scores(&timed(vec![raw("2-1", "1-1", "0-0"), raw("3-", "1-1", "0-0")]))
            .unwrap();
        assert_eq!(t.events[1].snapshot.sets, Pairwise::new(3, 1));
        assert!(!t.events[1].set_inferred);
    }

    #[test]
    fn test_closed_set_validity() {
        assert_eq!(
            infer_closed_set(Pairwise::new(6, 2)).map(|c| c.games),
            Some(Pairwise::new(6, 2))
        );
        assert_eq!(infer_closed_set(Pairwise::new(5, 4)), None);
        assert_eq!(
            infer_closed_set(Pairwise::new(2, 4)),
            Some(ClosedSet {
                games: Pairwise::new(2, 6),
                winner: Side::B
            })
        );
        assert_eq!(
            infer_closed_set(Pairwise::new(7, 6)).map(|c| c.games),
            Some(Pairwise::new(7, 6))
        );
        assert_eq!(infer_closed_set(Pairwise::new(6, 5)), None);
        assert_eq!(infer_closed_set(Pairwise::new(6, 6)), None);
        assert_eq!(infer_closed_set(GameScore::ZERO), None);
    }

    #[test]
    fn test_implicit_set_close_from_games_reset() {
        let t = track_scores(&timed(vec![
            raw("0-0", "5-2", "40-0"),
            raw("0-0", "6-2", "0-0"),
            raw("0-0", "0-0", "0-0"),
            raw("0-0", "1-0", "0-0"),
        ]))
        .unwrap();
        assert!(t.events[2].markers.set_changed);
        assert!(t.events[2].markers.game_changed);
        assert_eq!(t.events[2].closed_set.map(|c| c.games), Some(Pairwise::new(6, 2)));
        assert_eq!(t.events[2].set_number, 2);
        assert_eq!(t.sets.len(), 1);
        assert_eq!(t.sets[0].sets_after, Pairwise::new(1, 0));
        assert_eq!(t.scoreline(), "6-2");
    }

    #[test]
    fn test_invalid_margin_discards_set() {
        let t = track_scores(&timed(vec![
            raw("0-0", "5-4", "15-0"),
            raw("0-0", "0-0", "0-0"),
        ]))
        .unwrap();
        assert!(!t.events[1].markers.set_changed);
        assert!(t.events[1].markers.game_changed);
        assert_eq!(t.events[1].closed_set, None);
        assert!(t.sets.is_empty());
    }

    #[test]
    fn test_explicit_then_reset_counts_one_set() {
        let t = track_scores(&timed(vec![
            raw("0-0", "5-3", "40-15"),
            raw("1-0", "5-3", "40-15"),
            raw("1-0", "0-0", "0-0"),
            raw("1-0", "1-0", "0-0"),
        ]))
        .unwrap();
        assert!(t.events[1].markers.set_changed);
        assert_eq!(t.events[1].snapshot.games, GameScore::ZERO);
        assert!(!t.events[2].markers.set_changed);
        assert_eq!(t.sets.len(), 1);
        assert_eq!(t.sets[0].games, Pairwise::new(6, 3));
        assert_eq!(t.events[3].set_number, 2);
    }

    #[test]
    fn test_reset_then_explicit_counts_one_set() {
        let t = track_scores(&timed(vec![
            raw("0-0", "5-3", "40-15"),
            raw("0-0", "0-0", "0-0"),
            raw("1-0", "0-0", "0-0"),
        ]))
        .unwrap();
        assert!(t.events[1].markers.set_changed);
        assert!(!t.events[2].markers.set_changed);
        assert_eq!(t.events[2].set_number, 2);
        assert_eq!(t.sets.len(), 1);
    }

    #[test]
    fn test_lagging_set_counter_confirms_earlier_close() {
        let t = track_scores(&timed(vec![
            raw("0-0", "5-3", "40-15"),
            raw("0-0", "0-0", "0-0"),
            raw("0-0", "1-0", "0-0"),
            raw("1-0", "1-0", "15-0"),
            raw("1-0", "2-0", "0-0"),
        ]))
        .unwrap();
        assert!(t.events[1].markers.set_changed);
        let late = &t.events[3];
        assert!(!late.markers.set_changed);
        assert!(!late.markers.game_changed);
        assert_eq!(late.closed_set, None);
        assert_eq!(late.snapshot.games, Pairwise::new(1, 0));
        assert_eq!(late.set_number, 2);
        assert_eq!(late.games_total, 9);
        assert_eq!(t.events[4].set_number, 2);
        assert_eq!(t.sets.len(), 1);
        assert_eq!(t.scoreline(), "6-3");
    }

    #[test]
    fn test_set_number_follows_first_event() {
        let t = track_scores(&timed(vec![
            raw("1-1", "2-1", "0-0"),
            raw("1-1", "2-2", "0-0"),
        ]))
        .unwrap();
        assert_eq!(t.events[0].set_number, 3);
        assert_eq!(t.events[1].set_number, 3);
    }

    #[test]
    fn test_extreme_counters_do_not_overflow() {
        let t = track_scores(&timed(vec![
            raw("0-0", "255-254", "0-0"),
            raw("0-0", "0-0", "0-0"),
        ]))
        .unwrap();
        assert!(!t.events[1].markers.set_changed);
        assert!(t.sets.is_empty());

        let t = track_scores(&timed(vec![
            raw("0-0", "255-253", "0-0"),
            raw("0-0", "0-0", "0-0"),
        ]))
        .unwrap();
        assert_eq!(t.sets[0].games, Pairwise::new(255, 253));
        assert_eq!(t.events[1].games_total, 508);
        assert!(!has_win_margin(0, 255));
    }

    #[test]
    fn test_missing_games_reset_at_set_boundary() {
        let t = track_scores(&timed(vec![
            raw("0-0", "6-4", "0-0"),
            raw("1-0", "-", "-"),
        ]))
        .unwrap();
        assert_eq!(t.events[1].snapshot.games, GameScore::ZERO);
        assert_eq!(t.events[1].games_total, 10);
    }

    #[test]
    fn test_points_carry_and_reset_on_new_game() {
        let t = track_scores(&timed(vec![
            raw("0-0", "0-0", "15-0"),
            raw("0-0", "0-0", "-"),
            raw("0-0", "0-0", "zz-30"),
            raw("0-0", "1-0", "-"),
        ]))
        .unwrap();
        let points: Vec<String> = t.events.iter().map(|e| e.snapshot.points.to_string()).collect();
        assert_eq!(points, vec!["15-0", "15-0", "15-30", "0-0"]);
        assert!(!t.events[1].markers.point_changed);
        assert!(t.events[2].markers.point_changed);
        assert_eq!(t.events[3].point_number, 3);
    }

    #[test]
    fn test_start_of_stream_defaults() {
        let t = track_scores(&[raw("-", "-", "-")]).unwrap();
        assert_eq!(t.events[0].snapshot, ScoreSnapshot::default());
        assert_eq!(t.events[0].markers, BoundaryMarkers::default());
        assert_eq!(t.events[0].game_number, 1);
    }

    #[test]
    fn test_trailing_set_inferred_at_end() {
        let t = track_scores(&timed(vec![
            raw("1-0", "3-1", "0-0"),
            raw("1-0", "4-1", "30-0"),
        ]))
        .unwrap();
        assert_eq!(t.sets.len(), 1);
        assert!(t.sets[0].at_end_of_stream);
        assert_eq!(t.sets[0].games, Pairwise::new(6, 1));

        let level = track_scores(&timed(vec![raw("1-0", "3-3", "0-0")])).unwrap();
        assert!(level.sets.is_empty());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut raws = timed(vec![raw("0-0", "0-0", "0-0"); 3]);
        raws[2].clip_start = Some(0.5);
        let err = track_scores(&raws).unwrap_err();
        assert!(matches!(err, PadelError::OutOfOrder { index: 2, .. }));

        let mut raws = timed(vec![raw("0-0", "0-0", "0-0"); 3]);
        raws[1].clip_start = None;
        assert!(track_scores(&raws).is_err());

        raws[2].clip_start = None;
        assert!(track_scores(&raws).is_ok());
    }

    #[test]
    fn test_cut_at_games() {
        let t = track_scores(&timed(vec![
            raw("0-0", "5-1", "0-0"),
            raw("1-0", "0-0", "0-0"),
            raw("1-0", "1-0", "0-0"),
            raw("1-0", "1-1", "0-0"),
        ]))
        .unwrap();
        assert_eq!(
            t.events.iter().map(|e| e.games_total).collect::<Vec<_>>(),
            vec![6, 7, 8, 9]
        );
        let cut = t.cut_at_games(9).unwrap();
        assert_eq!(cut.event_index, 3);
        assert_eq!(cut.scoreline, "6-1 1-1");
        assert!(t.cut_at_games(30).is_none());
    }

    // --- property tests over simulated matches ---

    #[derive(Clone, Copy)]
    struct Board {
        sets: Pairwise<u8>,
        games: GameScore,
        points: Pairwise<PointLabel>,
    }

    fn next_label(l: PointLabel) -> PointLabel {
        match l {
            PointLabel::Love => PointLabel::Fifteen,
            PointLabel::Fifteen => PointLabel::Thirty,
            _ => PointLabel::Forty,
        }
    }

    /// Scoreboard before every point of a best-of-three match (tiebreak
    /// collapsed into a single point), plus the final board. With
    /// `show_set_end` the finished games of each set are shown once before
    /// the reset.
    fn simulate(winners: &[bool], show_set_end: bool) -> Vec<Board> {
        let mut b = Board {
            sets: GameScore::ZERO,
            games: GameScore::ZERO,
            points: Pairwise::new(PointLabel::Love, PointLabel::Love),
        };
        let mut boards = Vec::new();
        for &a_wins in winners {
            if b.sets.a == 2 || b.sets.b == 2 {
                break;
            }
            boards.push(b);
            let s = if a_wins { Side::A } else { Side::B };
            let (me, opp) = (*b.points.get(s), *b.points.get(s.other()));
            let won_game = b.games == Pairwise::new(6, 6)
                || me == PointLabel::Advantage
                || (me == PointLabel::Forty && opp < PointLabel::Forty);
            if won_game {
                *b.games.get_mut(s) += 1;
                b.points = Pairwise::new(PointLabel::Love, PointLabel::Love);
                let (g, o) = (*b.games.get(s), *b.games.get(s.other()));
                if (g >= 6 && g >= o + 2) || g == 7 {
                    if show_set_end {
                        boards.push(b);
                    }
                    *b.sets.get_mut(s) += 1;
                    b.games = GameScore::ZERO;
                }
            } else if opp == PointLabel::Advantage {
                *b.points.get_mut(s.other()) = PointLabel::Forty;
            } else if me == PointLabel::Forty {
                *b.points.get_mut(s) = PointLabel::Advantage;
            } else {
                *b.points.get_mut(s) = next_label(me);
            }
        }
        boards.push(b);
        boards
    }

    proptest! {
        #[test]
        fn prop_valid_match_is_monotonic(
            winners in prop::collection::vec(any::<bool>(), 1..400),
            noise in prop::collection::vec((1usize..3, any::<[bool; 4]>()), 400),
        ) {
            let boards = simulate(&winners, false);
            let mut raws = Vec::new();
            for (board, (repeat, blank)) in boards.iter().zip(noise.iter().cycle()) {
                for _ in 0..*repeat {
                    let opt = |hide: bool, v: String| if hide { None } else { Some(v) };
                    raws.push(RawScore {
                        clip_start: Some(raws.len() as f64),
                        sets: Pairwise::new(Some(board.sets.a.to_string()), Some(board.sets.b.to_string())),
                        games: Pairwise::new(
                            opt(blank[0], board.games.a.to_string()),
                            opt(blank[1], board.games.b.to_string()),
                        ),
                        points: Pairwise::new(
                            opt(blank[2], board.points.a.to_string()),
                            opt(blank[3], board.points.b.to_string()),
                        ),
                    });
                }
            }

            let t = track_scores(&raws).unwrap();
            prop_assert_eq!(t.events.len(), raws.len());
            for pair in t.events.windows(2) {
                let (p, c) = (&pair[0], &pair[1]);
                prop_assert!(c.snapshot.sets.total() >= p.snapshot.sets.total());
                prop_assert!(c.games_total >= p.games_total);
                prop_assert!(c.game_number >= p.game_number);
            }
            for e in &t.events {
                prop_assert_eq!(e.set_number as u32, e.snapshot.sets.total() + 1);
            }
        }

        #[test]
        fn prop_late_or_blank_set_counters_count_each_set_once(
            winners in prop::collection::vec(any::<bool>(), 1..400),
            lag in 0usize..4,
            noise in prop::collection::vec((1usize..3, 0u8..3, any::<bool>(), any::<[bool; 2]>()), 400),
        ) {
            let boards = simulate(&winners, true);
            let mut raws = Vec::new();
            let cells = |sets: Pairwise<u8>| Pairwise::new(Some(sets.a.to_string()), Some(sets.b.to_string()));
            for (i, (board, (repeat, set_noise, side, blank))) in
                boards.iter().zip(noise.iter().cycle()).enumerate()
            {
                let shown = boards[i.saturating_sub(lag)].sets;
                let sets = match *set_noise {
                    1 => Pairwise::new(None, None),
                    // a lone 0 or 1 is completed by the two-set heuristic
                    2 if shown.total() == 1 => {
                        let mut s = cells(shown);
                        *s.get_mut(if *side { Side::A } else { Side::B }) = None;
                        s
                    }
                    _ => cells(shown),
                };
                for _ in 0..*repeat {
                    let opt = |hide: bool, v: String| if hide { None } else { Some(v) };
                    raws.push(RawScore {
                        clip_start: Some(raws.len() as f64),
                        sets: sets.clone(),
                        games: Pairwise::new(
                            Some(board.games.a.to_string()),
                            Some(board.games.b.to_string()),
                        ),
                        points: Pairwise::new(
                            opt(blank[0], board.points.a.to_string()),
                            opt(blank[1], board.points.b.to_string()),
                        ),
                    });
                }
            }
            let last = boards[boards.len() - 1];
            raws.push(RawScore {
                clip_start: Some(raws.len() as f64),
                sets: cells(last.sets),
                games: Pairwise::new(Some(last.games.a.to_string()), Some(last.games.b.to_string())),
                points: Pairwise::new(Some("0".to_string()), Some("0".to_string())),
            });

            let t = track_scores(&raws).unwrap();
            for pair in t.events.windows(2) {
                let (p, c) = (&pair[0], &pair[1]);
                prop_assert!(c.snapshot.sets.total() >= p.snapshot.sets.total());
                prop_assert!(c.games_total >= p.games_total);
                prop_assert!(c.set_number >= p.set_number);
            }
            for e in &t.events {
                prop_assert!(e.set_number as u32 >= e.snapshot.sets.total() + 1);
            }
            let end = &t.events[t.events.len() - 1];
            prop_assert_eq!(end.snapshot.sets, last.sets);
            prop_assert_eq!(end.set_number as u32, last.sets.total() + 1);
            let counted = t.sets.iter().filter(|s| !s.at_end_of_stream).count();
            prop_assert_eq!(counted as u32, last.sets.total());
        }
    }
}
