//! Ingestion pipeline orchestration.
//!
//! Resolves the server, opens an ingest run, then feeds each stats file
//! through fingerprinting, deduplication and fact explosion, one file per
//! transaction. Bad files are skipped and counted; storage errors abort the
//! run and leave it unfinished.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::{Config, IngestOverrides, IngestSettings};
use crate::connector_fs::{read_player_document, scan_stats_dir};
use crate::db;
use crate::facts::{explode_advancements, explode_stats};
use crate::models::{AcceptedSnapshot, Admission, IngestRun, IngestSummary, PlayerDocument, Server};
use crate::runs::{begin_run, finish_run};
use crate::servers::resolve_server;
use crate::snapshot::{admit, upsert_player, SnapshotCandidate};

/// What happened to one player document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Inserted {
        snapshot_id: String,
        stat_facts: u64,
        advancement_facts: u64,
    },
    Duplicate,
}

/// Entry point for `statledger ingest`.
pub async fn run_ingest(
    config: &Config,
    overrides: IngestOverrides,
    dry_run: bool,
    limit: Option<usize>,
) -> Result<()> {
    // Configuration errors surface here, before the database is opened.
    let settings = IngestSettings::resolve(config, overrides)?;

    if dry_run {
        let mut files = scan_stats_dir(&settings.stats_dir, &settings.include)?;
        if let Some(lim) = limit {
            files.truncate(lim);
        }
        let readable = files
            .iter()
            .filter(|path| read_player_document(path, settings.advancements_dir.as_deref()).is_ok())
            .count();
        println!("ingest {} (dry-run)", settings.server_code);
        println!("  files found: {}", files.len());
        println!("  readable: {}", readable);
        println!("  unreadable: {}", files.len() - readable);
        return Ok(());
    }

    let pool = db::connect(config).await?;
    let (run, summary) = ingest_directory(&pool, &settings, limit).await?;

    println!("ingest {}", settings.server_code);
    println!("  files seen: {}", summary.files_seen);
    println!("  files skipped: {}", summary.files_skipped);
    println!("  snapshots inserted: {}", summary.snapshots_inserted);
    println!("  duplicates: {}", summary.duplicates);
    println!("  stat facts written: {}", summary.stat_facts_written);
    println!(
        "  advancement facts written: {}",
        summary.advancement_facts_written
    );
    println!("  run: {}", run.id);
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Run one complete ingest over the configured stats directory.
pub async fn ingest_directory(
    pool: &SqlitePool,
    settings: &IngestSettings,
    limit: Option<usize>,
) -> Result<(IngestRun, IngestSummary)> {
    let server = resolve_server(pool, &settings.server_code).await?;

    let mut files = scan_stats_dir(&settings.stats_dir, &settings.include)?;
    if let Some(lim) = limit {
        files.truncate(lim);
    }

    let run = begin_run(pool, &server, &settings.source, Some(&settings.notes)).await?;
    let mut summary = IngestSummary::default();

    for path in &files {
        summary.files_seen += 1;

        let doc = match read_player_document(path, settings.advancements_dir.as_deref()) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(error = %e, "skipping stats file");
                summary.files_skipped += 1;
                continue;
            }
        };

        match ingest_document(pool, &run, &server, &doc).await? {
            DocumentOutcome::Inserted {
                snapshot_id,
                stat_facts,
                advancement_facts,
            } => {
                tracing::debug!(
                    player = %doc.player_uuid,
                    path = %doc.stats_path.display(),
                    snapshot = %snapshot_id,
                    stat_facts,
                    advancement_facts,
                    "snapshot inserted"
                );
                summary.snapshots_inserted += 1;
                summary.stat_facts_written += stat_facts;
                summary.advancement_facts_written += advancement_facts;
            }
            DocumentOutcome::Duplicate => {
                tracing::debug!(
                    player = %doc.player_uuid,
                    path = %doc.stats_path.display(),
                    "unchanged stats, snapshot skipped"
                );
                summary.duplicates += 1;
            }
        }
    }

    finish_run(pool, &run.id).await?;
    tracing::info!(
        run = %run.id,
        files = summary.files_seen,
        skipped = summary.files_skipped,
        inserted = summary.snapshots_inserted,
        duplicates = summary.duplicates,
        "ingest run finished"
    );

    Ok((run, summary))
}

/// Store one player document: player, snapshot and facts commit together.
pub async fn ingest_document(
    pool: &SqlitePool,
    run: &IngestRun,
    server: &Server,
    doc: &PlayerDocument,
) -> Result<DocumentOutcome> {
    let mut tx = pool.begin().await?;

    let player_id = upsert_player(&mut *tx, &doc.player_uuid).await?;
    let observed_at = doc.observed_at.timestamp();

    let admission = admit(
        &mut *tx,
        SnapshotCandidate {
            ingest_id: &run.id,
            server_id: server.id,
            player_id,
            observed_at,
            stats: &doc.stats,
            advancements: doc.advancements.as_ref(),
        },
    )
    .await?;

    let outcome = match admission {
        Admission::Inserted(snapshot_id) => {
            let snapshot = AcceptedSnapshot {
                id: snapshot_id,
                server_id: server.id,
                player_id,
                observed_at,
            };
            let stat_facts = explode_stats(&mut *tx, &snapshot, &doc.stats).await?;
            let advancement_facts =
                explode_advancements(&mut *tx, &snapshot, doc.advancements.as_ref()).await?;
            DocumentOutcome::Inserted {
                snapshot_id: snapshot.id,
                stat_facts,
                advancement_facts,
            }
        }
        Admission::Duplicate => DocumentOutcome::Duplicate,
    };

    tx.commit().await?;
    Ok(outcome)
}
