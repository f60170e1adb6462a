//! Schema creation.
//!
//! Every statement is `IF NOT EXISTS`, so `statledger init` can be run any
//! number of times. The unique constraints here are what make ingestion
//! idempotent; the pipeline relies on them rather than on read-then-write
//! checks.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS servers (
        id INTEGER PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        name TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS players (
        id INTEGER PRIMARY KEY,
        uuid TEXT NOT NULL UNIQUE,
        first_seen_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ingests (
        id TEXT PRIMARY KEY,
        server_id INTEGER NOT NULL,
        source TEXT NOT NULL,
        notes TEXT,
        started_at INTEGER NOT NULL,
        finished_at INTEGER,
        FOREIGN KEY (server_id) REFERENCES servers(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS player_server_snapshots (
        id TEXT PRIMARY KEY,
        ingest_id TEXT NOT NULL,
        server_id INTEGER NOT NULL,
        player_id INTEGER NOT NULL,
        observed_at INTEGER NOT NULL,
        stats_json TEXT NOT NULL,
        advancements_json TEXT,
        stats_hash TEXT NOT NULL,
        adv_hash TEXT,
        UNIQUE(server_id, player_id, stats_hash),
        FOREIGN KEY (ingest_id) REFERENCES ingests(id),
        FOREIGN KEY (server_id) REFERENCES servers(id),
        FOREIGN KEY (player_id) REFERENCES players(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stat_facts (
        id INTEGER PRIMARY KEY,
        snapshot_id TEXT NOT NULL,
        player_id INTEGER NOT NULL,
        server_id INTEGER NOT NULL,
        observed_at INTEGER NOT NULL,
        category TEXT NOT NULL,
        stat_key TEXT NOT NULL,
        value INTEGER NOT NULL,
        UNIQUE(snapshot_id, category, stat_key),
        FOREIGN KEY (snapshot_id) REFERENCES player_server_snapshots(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS advancement_facts (
        id INTEGER PRIMARY KEY,
        snapshot_id TEXT NOT NULL,
        player_id INTEGER NOT NULL,
        server_id INTEGER NOT NULL,
        observed_at INTEGER NOT NULL,
        advancement_key TEXT NOT NULL,
        done INTEGER NOT NULL,
        done_at INTEGER,
        UNIQUE(snapshot_id, advancement_key),
        FOREIGN KEY (snapshot_id) REFERENCES player_server_snapshots(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_snapshots_player ON player_server_snapshots(server_id, player_id, observed_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_ingest ON player_server_snapshots(ingest_id)",
    "CREATE INDEX IF NOT EXISTS idx_stat_facts_key ON stat_facts(server_id, category, stat_key)",
    "CREATE INDEX IF NOT EXISTS idx_advancement_facts_key ON advancement_facts(server_id, advancement_key)",
];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for statement in SCHEMA {
        sqlx::query(*statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}
