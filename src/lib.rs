//! # statledger
//!
//! Idempotent ingestion of per-player game statistics snapshots into SQLite.
//!
//! Each player's stats file is fingerprinted, offered to the snapshot
//! deduplicator, and, only when its content is new for that server and
//! player, exploded into flat stat and advancement fact rows. Re-running an
//! ingest over unchanged files writes nothing but a new run record.
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ stats dir   │──▶│ fingerprint │──▶│ snapshot     │──▶│ facts    │
//! │ (+ advs)    │   │ (SHA-256)   │   │ dedup        │   │ explode  │
//! └─────────────┘   └─────────────┘   └──────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! statledger init
//! statledger server add survival --name "Survival"
//! statledger ingest --server survival --stats-dir world/stats --advancements-dir world/advancements
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and ingest settings |
//! | [`connector_fs`] | Reading player files from disk |
//! | [`fingerprint`] | Canonical content hashing |
//! | [`snapshot`] | Player upsert and snapshot deduplication |
//! | [`facts`] | Stat and advancement fact explosion |
//! | [`runs`] | Ingest run bookkeeping |
//! | [`servers`] | Server registry |
//! | [`ingest`] | Pipeline orchestration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod config;
pub mod connector_fs;
pub mod db;
pub mod facts;
pub mod fingerprint;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod runs;
pub mod servers;
pub mod snapshot;
