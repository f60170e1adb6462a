//! Fact explosion: flattening accepted snapshots into rows.
//!
//! Flattening is pure and permissive. Values that cannot be read as integers,
//! payloads that are not objects and timestamps that do not parse are dropped
//! one at a time without affecting their neighbours. Writing is guarded by the
//! `(snapshot, key)` unique constraints, so replaying an explosion against an
//! already materialized snapshot inserts nothing.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::SqliteConnection;

use crate::models::{AcceptedSnapshot, AdvancementFact, StatFact};

/// Flatten `{"stats": {category: {key: value}}}` into stat facts.
pub fn flatten_stats(stats_doc: &Value) -> Vec<StatFact> {
    let Some(categories) = stats_doc.get("stats").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut facts = Vec::new();
    for (category, entries) in categories {
        let Some(entries) = entries.as_object() else {
            continue;
        };
        for (stat_key, raw) in entries {
            if let Some(value) = coerce_stat_value(raw) {
                facts.push(StatFact {
                    category: category.clone(),
                    stat_key: stat_key.clone(),
                    value,
                });
            }
        }
    }
    facts
}

/// Read a stat value as an integer, or `None` if it has no integer meaning.
///
/// Accepts integers, finite floats (truncated toward zero), booleans as 0/1
/// and strings holding a decimal integer.
pub fn coerce_stat_value(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Some(v)
            } else if let Some(v) = n.as_u64() {
                i64::try_from(v).ok()
            } else {
                n.as_f64().and_then(truncate_f64)
            }
        }
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn truncate_f64(f: f64) -> Option<i64> {
    // 2^63: the first float past i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_finite() && f >= -LIMIT && f < LIMIT {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

/// Flatten `{key: {"done": bool, "criteria": {name: timestamp}}}` into
/// advancement facts. Non-object payloads such as `DataVersion` are skipped.
pub fn flatten_advancements(adv_doc: &Value) -> Vec<AdvancementFact> {
    let Some(entries) = adv_doc.as_object() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|(key, payload)| {
            let payload = payload.as_object()?;
            let done = payload.get("done").and_then(Value::as_bool).unwrap_or(false);
            let done_at = payload
                .get("criteria")
                .and_then(Value::as_object)
                .and_then(|criteria| latest_timestamp(criteria.values()));
            Some(AdvancementFact {
                advancement_key: key.clone(),
                done,
                done_at,
            })
        })
        .collect()
}

/// Latest of the values that parse as timestamps; `None` if none do.
pub fn latest_timestamp<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<DateTime<Utc>> {
    values.into_iter().filter_map(parse_criterion_timestamp).max()
}

/// Best-effort timestamp parse of a criterion value.
///
/// Accepts RFC 3339, the game's own `2023-01-01 00:00:00 +0000` form,
/// offset-less date-times with or without seconds (taken as UTC), and bare
/// dates (midnight UTC).
pub fn parse_criterion_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    let s = raw.as_str()?.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    .or_else(|| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })?;
    Some(naive.and_utc())
}

/// Insert the stat facts of an accepted snapshot. Returns the number of rows
/// actually written; rows already present are left untouched.
pub async fn explode_stats(
    conn: &mut SqliteConnection,
    snapshot: &AcceptedSnapshot,
    stats_doc: &Value,
) -> Result<u64> {
    let mut written = 0u64;
    for fact in flatten_stats(stats_doc) {
        let result = sqlx::query(
            r#"
            INSERT INTO stat_facts
              (snapshot_id, player_id, server_id, observed_at, category, stat_key, value)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(snapshot_id, category, stat_key) DO NOTHING
            "#,
        )
        .bind(&snapshot.id)
        .bind(snapshot.player_id)
        .bind(snapshot.server_id)
        .bind(snapshot.observed_at)
        .bind(&fact.category)
        .bind(&fact.stat_key)
        .bind(fact.value)
        .execute(&mut *conn)
        .await?;
        written += result.rows_affected();
    }
    Ok(written)
}

/// Insert the advancement facts of an accepted snapshot. A missing document
/// writes nothing.
pub async fn explode_advancements(
    conn: &mut SqliteConnection,
    snapshot: &AcceptedSnapshot,
    adv_doc: Option<&Value>,
) -> Result<u64> {
    let Some(adv_doc) = adv_doc else {
        return Ok(0);
    };

    let mut written = 0u64;
    for fact in flatten_advancements(adv_doc) {
        let result = sqlx::query(
            r#"
            INSERT INTO advancement_facts
              (snapshot_id, player_id, server_id, observed_at, advancement_key, done, done_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(snapshot_id, advancement_key) DO NOTHING
            "#,
        )
        .bind(&snapshot.id)
        .bind(snapshot.player_id)
        .bind(snapshot.server_id)
        .bind(snapshot.observed_at)
        .bind(&fact.advancement_key)
        .bind(fact.done)
        .bind(fact.done_at.map(|dt| dt.timestamp()))
        .execute(&mut *conn)
        .await?;
        written += result.rows_affected();
    }
    Ok(written)
}
