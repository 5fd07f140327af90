//! # Serve/Point Attribution Engine
//!
//! Works on the tracked score stream to decide, per point, who won it and who
//! served it, then rolls points up into held/broken games and per-player
//! serve statistics.
//!
//! - Server names come from free-text announcements (`"1º Servicio Galán"`)
//!   and are resolved against the [`Roster`] through a [`NameResolver`].
//! - The server of a game is its first resolved announcement.
//! - The point that ends at event *i* belongs to the game of event *i − 1*.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PadelError, Result};
use crate::score::{PointLabel, ScoreTimeline, Side, TrackedScore};
use crate::text::name_key;

/// Default number of leading announcement tokens before the server name.
pub const DEFAULT_NAME_OFFSET: usize = 2;

// ============================================================================
// Roster
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub side: Side,
    pub label: String,
    pub members: Vec<String>,
}

impl Pair {
    pub fn new(side: Side, label: impl Into<String>) -> Self {
        Self {
            side,
            label: label.into(),
            members: Vec::new(),
        }
    }

    /// Add a member; a name whose tokens end another member's tokens is the
    /// same player, and the longer spelling is kept.
    pub fn add_member(&mut self, name: &str) {
        let name = name.trim();
        let key = name_key(name);
        if key.is_empty() {
            return;
        }
        let tokens: Vec<&str> = key.split(' ').collect();
        for existing in self.members.iter_mut() {
            let existing_key = name_key(existing);
            let other: Vec<&str> = existing_key.split(' ').collect();
            if other.ends_with(&tokens) {
                return;
            }
            if tokens.ends_with(&other) {
                *existing = name.to_string();
                return;
            }
        }
        self.members.push(name.to_string());
    }
}

/// The two pairs of a match. Pair 1 is score side A.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pairs: [Pair; 2],
}

impl Roster {
    pub fn new(a: Pair, b: Pair) -> Self {
        Self { pairs: [a, b] }
    }

    /// Infer pairs from the `pareja` column (first two distinct labels) and
    /// their members from the label itself and the `jugador` column.
    pub fn infer(pairs: &[Option<&str>], players: &[Option<&str>]) -> Result<Roster> {
        let mut labels: Vec<&str> = Vec::new();
        for label in pairs.iter().flatten().copied() {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        if labels.len() < 2 {
            return Err(PadelError::PairsNotFound {
                column: "pareja".to_string(),
                found: labels.len(),
            });
        }
        if labels.len() > 2 {
            warn!(extra = ?&labels[2..], "more than two pair labels, ignoring the rest");
        }

        let mut roster = Roster::new(Pair::new(Side::A, labels[0]), Pair::new(Side::B, labels[1]));
        for pair in roster.pairs.iter_mut() {
            for part in pair.label.clone().split(['-', '/']) {
                pair.add_member(part);
            }
        }
        for (label, player) in pairs.iter().zip(players) {
            let (Some(label), Some(player)) = (label, player) else {
                continue;
            };
            if let Some(pair) = roster.pairs.iter_mut().find(|p| p.label == *label) {
                pair.add_member(player);
            }
        }
        debug!(pair1 = ?roster.pairs[0].members, pair2 = ?roster.pairs[1].members, "roster inferred");
        Ok(roster)
    }

    pub fn pair(&self, side: Side) -> &Pair {
        match side {
            Side::A => &self.pairs[0],
            Side::B => &self.pairs[1],
        }
    }

    pub fn pairs(&self) -> &[Pair; 2] {
        &self.pairs
    }

    /// Every player with their side, pair 1 first.
    pub fn players(&self) -> impl Iterator<Item = (&str, Side)> + '_ {
        self.pairs
            .iter()
            .flat_map(|p| p.members.iter().map(move |m| (m.as_str(), p.side)))
    }

    pub fn side_of(&self, player: &str) -> Option<Side> {
        self.players().find(|(p, _)| *p == player).map(|(_, s)| s)
    }
}

// ============================================================================
// Name resolution
// ============================================================================

/// Strategy mapping a displayed server name onto a roster player.
pub trait NameResolver {
    fn resolve<'r>(&self, name: &str, roster: &'r Roster) -> Option<&'r str>;
}

/// Folded full-name equality.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactResolver;

impl NameResolver for ExactResolver {
    fn resolve<'r>(&self, name: &str, roster: &'r Roster) -> Option<&'r str> {
        let key = name_key(name);
        roster
            .players()
            .find(|(p, _)| name_key(p) == key)
            .map(|(p, _)| p)
    }
}

/// Trailing-token match, optionally narrowed by a leading initial
/// (`"F. Chingotto"`). More than one candidate fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurnameResolver;

impl NameResolver for SurnameResolver {
    fn resolve<'r>(&self, name: &str, roster: &'r Roster) -> Option<&'r str> {
        let key = name_key(name);
        let tokens: Vec<&str> = key.split(' ').collect();
        let surname = *tokens.last()?;
        if surname.is_empty() {
            return None;
        }
        let initial = (tokens.len() > 1).then(|| tokens[0].chars().next()).flatten();

        let candidates: Vec<&str> = roster
            .players()
            .map(|(p, _)| p)
            .filter(|p| name_key(p).rsplit(' ').next() == Some(surname))
            .filter(|p| match initial {
                Some(c) => {
                    let pk = name_key(p);
                    // single-token roster names carry no initial to check
                    !pk.contains(' ') || pk.starts_with(c)
                }
                None => true,
            })
            .collect();

        match candidates.as_slice() {
            [only] => Some(*only),
            [] => None,
            many => {
                debug!(name, candidates = ?many, "ambiguous surname match");
                None
            }
        }
    }
}

/// Tries each resolver in order.
pub struct ChainResolver {
    resolvers: Vec<Box<dyn NameResolver + Send + Sync>>,
}

impl ChainResolver {
    pub fn new(resolvers: Vec<Box<dyn NameResolver + Send + Sync>>) -> Self {
        Self { resolvers }
    }
}

impl Default for ChainResolver {
    /// exact → surname → fail
    fn default() -> Self {
        Self::new(vec![Box::new(ExactResolver), Box::new(SurnameResolver)])
    }
}

impl NameResolver for ChainResolver {
    fn resolve<'r>(&self, name: &str, roster: &'r Roster) -> Option<&'r str> {
        self.resolvers.iter().find_map(|r| r.resolve(name, roster))
    }
}

// ============================================================================
// Announcements
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServeAttempt {
    First,
    Second,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeAnnouncement {
    pub attempt: Option<ServeAttempt>,
    pub name: String,
}

/// Split an announcement into serve attempt and displayed name. The name is
/// every token from `offset` on; fewer tokens yield `None`.
pub fn parse_announcement(text: &str, offset: usize) -> Option<ServeAnnouncement> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() <= offset {
        return None;
    }
    let lead = tokens[0].to_lowercase();
    let attempt = if lead.starts_with('1') || lead.starts_with("primer") {
        Some(ServeAttempt::First)
    } else if lead.starts_with('2') || lead.starts_with("segund") {
        Some(ServeAttempt::Second)
    } else {
        None
    };
    Some(ServeAnnouncement {
        attempt,
        name: tokens[offset..].join(" "),
    })
}

// ============================================================================
// Point winner
// ============================================================================

fn risen(prev: u8, cur: u8) -> bool {
    cur > prev
}

/// Side that won the point ending at `cur`, judged against `prev`.
pub fn point_winner(prev: &TrackedScore, cur: &TrackedScore) -> Option<Side> {
    let (p, c) = (&prev.snapshot, &cur.snapshot);
    if cur.markers.set_changed {
        return match (risen(p.sets.a, c.sets.a), risen(p.sets.b, c.sets.b)) {
            (true, false) => Some(Side::A),
            (false, true) => Some(Side::B),
            _ => cur.closed_set.map(|s| s.winner),
        };
    }
    if cur.markers.game_changed {
        return match (risen(p.games.a, c.games.a), risen(p.games.b, c.games.b)) {
            (true, false) => Some(Side::A),
            (false, true) => Some(Side::B),
            _ => None,
        };
    }
    let lost_advantage = |before: PointLabel, after: PointLabel| {
        before == PointLabel::Advantage && after == PointLabel::Forty
    };
    let (pa, pb, ca, cb) = (p.points.a, p.points.b, c.points.a, c.points.b);
    if pb == cb {
        if ca > pa {
            return Some(Side::A);
        }
        if lost_advantage(pa, ca) {
            return Some(Side::B);
        }
    }
    if pa == ca {
        if cb > pb {
            return Some(Side::B);
        }
        if lost_advantage(pb, cb) {
            return Some(Side::A);
        }
    }
    None
}

// ============================================================================
// Attribution
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameOutcome {
    Held,
    Broken,
    Unknown,
}

impl fmt::Display for GameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GameOutcome::Held => "held",
            GameOutcome::Broken => "break",
            GameOutcome::Unknown => "unknown",
        })
    }
}

/// Attribution of one event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventServe {
    /// Player named by this event's announcement, when resolved.
    pub server: Option<String>,
    pub server_side: Option<Side>,
    pub attempt: Option<ServeAttempt>,
    /// Winner of the point ending at this event.
    pub point_winner: Option<Side>,
    /// Serving side credited with the point ending at this event.
    pub point_server_side: Option<Side>,
    pub server_won_point: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameSummary {
    pub number: u32,
    pub set_number: u16,
    pub server: Option<String>,
    pub server_side: Option<Side>,
    pub points_attributed: u32,
    pub server_points_won: u32,
    pub outcome: GameOutcome,
    /// Side whose game counter rose when the game closed.
    pub scoreboard_winner: Option<Side>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServeAttribution {
    pub events: Vec<EventServe>,
    pub games: Vec<GameSummary>,
}

impl ServeAttribution {
    pub fn game(&self, number: u32) -> Option<&GameSummary> {
        self.games.iter().find(|g| g.number == number)
    }
}

/// Attribute servers and point winners across the whole timeline.
///
/// `announcements` is aligned with `timeline.events`.
pub fn attribute_serves(
    timeline: &ScoreTimeline,
    announcements: &[Option<&str>],
    roster: &Roster,
    resolver: &dyn NameResolver,
    name_offset: usize,
) -> ServeAttribution {
    let events = &timeline.events;
    let mut out: Vec<EventServe> = vec![EventServe::default(); events.len()];
    let mut unresolved: FxHashSet<String> = FxHashSet::default();

    // games in first-appearance order
    let mut games: Vec<GameSummary> = Vec::new();
    let mut game_idx: FxHashMap<u32, usize> = FxHashMap::default();
    for e in events {
        game_idx.entry(e.game_number).or_insert_with(|| {
            games.push(GameSummary {
                number: e.game_number,
                set_number: e.set_number,
                server: None,
                server_side: None,
                points_attributed: 0,
                server_points_won: 0,
                outcome: GameOutcome::Unknown,
                scoreboard_winner: None,
            });
            games.len() - 1
        });
    }

    for (i, e) in events.iter().enumerate() {
        let Some(text) = announcements.get(i).copied().flatten() else {
            continue;
        };
        let Some(announcement) = parse_announcement(text, name_offset) else {
            debug!(event = i, text, "announcement too short to name a server");
            continue;
        };
        out[i].attempt = announcement.attempt;
        let Some(player) = resolver.resolve(&announcement.name, roster) else {
            if unresolved.insert(announcement.name.clone()) {
                warn!(event = i, name = %announcement.name, "server name not in roster");
            }
            continue;
        };
        let side = roster.side_of(player);
        out[i].server = Some(player.to_string());
        out[i].server_side = side;

        let game = &mut games[game_idx[&e.game_number]];
        if let Some(existing) = &game.server {
            if existing != player {
                warn!(
                    event = i,
                    game = e.game_number,
                    first = %existing,
                    announced = player,
                    "conflicting server announcement within a game"
                );
            }
        } else {
            game.server = Some(player.to_string());
            game.server_side = side;
        }
    }

    for i in 1..events.len() {
        let (prev, cur) = (&events[i - 1], &events[i]);
        let winner = point_winner(prev, cur);
        let game = &mut games[game_idx[&prev.game_number]];
        out[i].point_winner = winner;
        out[i].point_server_side = game.server_side;
        if cur.game_number != prev.game_number {
            game.scoreboard_winner = winner;
        }
        if let (Some(w), Some(s)) = (winner, game.server_side) {
            let won = w == s;
            out[i].server_won_point = Some(won);
            game.points_attributed += 1;
            game.server_points_won += won as u32;
        }
    }

    for game in games.iter_mut() {
        game.outcome = match (game.server_side, game.points_attributed) {
            (None, _) | (_, 0) => GameOutcome::Unknown,
            _ if game.server_points_won > 0 => GameOutcome::Held,
            _ => GameOutcome::Broken,
        };
    }

    let breaks = games.iter().filter(|g| g.outcome == GameOutcome::Broken).count();
    debug!(games = games.len(), breaks, unresolved = unresolved.len(), "serve attribution done");
    ServeAttribution { events: out, games }
}

// ============================================================================
// Serve statistics
// ============================================================================

/// One row of the serve statistics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServeStats {
    pub player: String,
    pub pair_id: u8,
    pub serve_points_won: u32,
    pub serve_points_total: u32,
    pub serve_win_pct: f64,
    pub games_held: u32,
    pub games_broken: u32,
    pub games_served_total: u32,
}

impl ServeStats {
    fn empty(player: &str, side: Side) -> Self {
        Self {
            player: player.to_string(),
            pair_id: side.pair_id(),
            serve_points_won: 0,
            serve_points_total: 0,
            serve_win_pct: 0.0,
            games_held: 0,
            games_broken: 0,
            games_served_total: 0,
        }
    }

    fn add_game(&mut self, game: &GameSummary) {
        self.serve_points_won += game.server_points_won;
        self.serve_points_total += game.points_attributed;
        self.games_served_total += 1;
        match game.outcome {
            GameOutcome::Held => self.games_held += 1,
            GameOutcome::Broken => self.games_broken += 1,
            GameOutcome::Unknown => {}
        }
    }

    fn finish(mut self) -> Self {
        if self.serve_points_total > 0 {
            let pct = self.serve_points_won as f64 / self.serve_points_total as f64 * 100.0;
            self.serve_win_pct = (pct * 100.0).round() / 100.0;
        }
        self
    }
}

/// Per-player rows (roster order) followed by one row per pair.
pub fn serve_stats(attribution: &ServeAttribution, roster: &Roster) -> Vec<ServeStats> {
    let mut players: Vec<ServeStats> = roster
        .players()
        .map(|(p, side)| ServeStats::empty(p, side))
        .collect();
    let mut pairs: Vec<ServeStats> = roster
        .pairs()
        .iter()
        .map(|p| ServeStats::empty(&p.label, p.side))
        .collect();

    for game in &attribution.games {
        let (Some(server), Some(side)) = (&game.server, game.server_side) else {
            continue;
        };
        if let Some(row) = players.iter_mut().find(|r| &r.player == server) {
            row.add_game(game);
        }
        pairs[side.pair_id() as usize - 1].add_game(game);
    }

    players
        .into_iter()
        .chain(pairs)
        .map(ServeStats::finish)
        .collect()
}
