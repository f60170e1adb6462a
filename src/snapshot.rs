//! Snapshot deduplication.
//!
//! A snapshot is identified by `(server, player, stats fingerprint)`. The
//! advancements fingerprint is stored alongside but is not part of the key,
//! so a change to advancements alone never yields a new snapshot.
//!
//! Both writes here are single `INSERT … ON CONFLICT … RETURNING` statements.
//! A concurrent run that stores the same content first simply turns this
//! insert into a no-op.

use anyhow::Result;
use serde_json::Value;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::fingerprint::fingerprint;
use crate::models::Admission;

/// Everything needed to offer one snapshot to [`admit`].
#[derive(Debug, Clone, Copy)]
pub struct SnapshotCandidate<'a> {
    pub ingest_id: &'a str,
    pub server_id: i64,
    pub player_id: i64,
    /// Unix seconds.
    pub observed_at: i64,
    pub stats: &'a Value,
    pub advancements: Option<&'a Value>,
}

/// Insert the player if unseen and return its row id either way.
pub async fn upsert_player(conn: &mut SqliteConnection, player_uuid: &str) -> Result<i64> {
    let now = chrono::Utc::now().timestamp();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO players (uuid, first_seen_at) VALUES (?, ?)
        ON CONFLICT(uuid) DO UPDATE SET uuid = excluded.uuid
        RETURNING id
        "#,
    )
    .bind(player_uuid)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

/// Store the candidate unless identical stats are already recorded for this
/// server and player.
pub async fn admit(conn: &mut SqliteConnection, candidate: SnapshotCandidate<'_>) -> Result<Admission> {
    let stats_hash = fingerprint(candidate.stats)?;
    let adv_hash = candidate.advancements.map(fingerprint).transpose()?;

    let stats_json = serde_json::to_string(candidate.stats)?;
    let advancements_json = candidate
        .advancements
        .map(serde_json::to_string)
        .transpose()?;

    let inserted: Option<String> = sqlx::query_scalar(
        r#"
        INSERT INTO player_server_snapshots
          (id, ingest_id, server_id, player_id, observed_at, stats_json, advancements_json, stats_hash, adv_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(server_id, player_id, stats_hash) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(candidate.ingest_id)
    .bind(candidate.server_id)
    .bind(candidate.player_id)
    .bind(candidate.observed_at)
    .bind(&stats_json)
    .bind(&advancements_json)
    .bind(&stats_hash)
    .bind(&adv_hash)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(match inserted {
        Some(id) => Admission::Inserted(id),
        None => Admission::Duplicate,
    })
}
