//! Core data types that flow through the ingest pipeline.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::PathBuf;

/// One player's parsed input: the stats file plus its optional advancements.
#[derive(Debug, Clone)]
pub struct PlayerDocument {
    /// Opaque player identifier, taken from the file stem.
    pub player_uuid: String,
    pub stats_path: PathBuf,
    /// Modification time of the stats file; stored with second precision.
    pub observed_at: DateTime<Utc>,
    pub stats: Value,
    pub advancements: Option<Value>,
}

/// A registered server.
#[derive(Debug, Clone)]
pub struct Server {
    pub id: i64,
    pub code: String,
    pub name: Option<String>,
}

/// A started ingest run.
#[derive(Debug, Clone)]
pub struct IngestRun {
    pub id: String,
    pub server_id: i64,
    pub source: String,
    pub notes: Option<String>,
    pub started_at: i64,
}

/// Outcome of offering a snapshot to the deduplicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A new snapshot row was written with this id.
    Inserted(String),
    /// Identical stats content is already stored for this server and player.
    Duplicate,
}

/// Identity of a freshly admitted snapshot, carried into fact explosion.
#[derive(Debug, Clone)]
pub struct AcceptedSnapshot {
    pub id: String,
    pub server_id: i64,
    pub player_id: i64,
    pub observed_at: i64,
}

/// A flattened statistics reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFact {
    pub category: String,
    pub stat_key: String,
    pub value: i64,
}

/// A flattened advancement reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvancementFact {
    pub advancement_key: String,
    pub done: bool,
    pub done_at: Option<DateTime<Utc>>,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub files_seen: u64,
    pub files_skipped: u64,
    pub snapshots_inserted: u64,
    pub duplicates: u64,
    pub stat_facts_written: u64,
    pub advancement_facts_written: u64,
}
