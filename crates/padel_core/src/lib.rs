//! # padel_core - Padel Match Event Reconstruction
//!
//! This library turns raw per-shot annotation exports of padel match video
//! into a clean event table with a reconstructed score timeline, serve
//! attribution and per-player summaries.
//!
//! ## Features
//! - Alias-driven column reconciliation (YAML alias table, embedded default)
//! - Annotation row collapsing by event identity
//! - Set/game/point reconstruction from noisy scoreboard columns
//! - Server, point winner and hold/break attribution
//! - Per-player category tables and serve statistics
//!
//! No I/O happens here; reading and writing files is left to the caller.

// Doc formatting lints - purely cosmetic
#![allow(clippy::doc_lazy_continuation)]
// Loop style - index loops mirror the event/row alignment
#![allow(clippy::needless_range_loop)]

pub mod aggregate;
pub mod collapse;
pub mod columns;
pub mod error;
pub mod pipeline;
pub mod quality;
pub mod score;
pub mod serve;
pub mod table;
pub mod text;

pub use error::{PadelError, Result};

// Re-export the stage entry points
pub use aggregate::{classify_event, CategoryTable, EventCategory};
pub use collapse::collapse_events;
pub use columns::{reconcile_columns, AliasEntry, AliasTable};
pub use pipeline::{MatchPipeline, MatchReport, PipelineOptions};
pub use quality::{validate_table, QualityReport, QualitySchema};
pub use score::{track_scores, PointLabel, ScoreSnapshot, ScoreTimeline, Side, TrackedScore};
pub use serve::{
    attribute_serves, ChainResolver, ExactResolver, NameResolver, Roster, ServeStats,
    SurnameResolver,
};
pub use table::{normalize_cell, Cell, Table};
