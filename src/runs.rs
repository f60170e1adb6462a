//! Ingest run bookkeeping.
//!
//! A run row is written before any file is touched and marked finished once
//! every file has been processed or skipped. A run without `finished_at` was
//! interrupted; re-running it in full is always safe.

use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{IngestRun, Server};

pub async fn begin_run(
    pool: &SqlitePool,
    server: &Server,
    source: &str,
    notes: Option<&str>,
) -> Result<IngestRun> {
    let run = IngestRun {
        id: Uuid::new_v4().to_string(),
        server_id: server.id,
        source: source.to_string(),
        notes: notes.map(str::to_string),
        started_at: chrono::Utc::now().timestamp(),
    };

    sqlx::query(
        "INSERT INTO ingests (id, server_id, source, notes, started_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&run.id)
    .bind(run.server_id)
    .bind(&run.source)
    .bind(&run.notes)
    .bind(run.started_at)
    .execute(pool)
    .await?;

    tracing::info!(run = %run.id, server = %server.code, source, "ingest run started");
    Ok(run)
}

/// Set `finished_at` on a run. Returns false if the run was already finished
/// (or does not exist); the first mark is never overwritten.
pub async fn finish_run(pool: &SqlitePool, run_id: &str) -> Result<bool> {
    let now = chrono::Utc::now().timestamp();
    let result =
        sqlx::query("UPDATE ingests SET finished_at = ? WHERE id = ? AND finished_at IS NULL")
            .bind(now)
            .bind(run_id)
            .execute(pool)
            .await?;

    Ok(result.rows_affected() == 1)
}
