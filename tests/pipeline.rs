//! End-to-end tests of the ingest pipeline against a real SQLite file.
//!
//! These cover the idempotence guarantees: unchanged input never produces
//! new rows, achievement-only changes never produce snapshots, and replaying
//! fact explosion against an existing snapshot is a no-op.

use chrono::{TimeZone, Utc};
use serde_json::json;
use sqlx::{Row, SqlitePool};
use statledger::config::{parse_config, Config, IngestOverrides, IngestSettings};
use statledger::db;
use statledger::facts::{explode_advancements, explode_stats};
use statledger::ingest::ingest_directory;
use statledger::migrate;
use statledger::models::AcceptedSnapshot;
use statledger::runs::finish_run;
use statledger::servers::register_server;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ALEX: &str = "853c80ef-3c37-49fd-aa49-938b674adae6";
const STEVE: &str = "8667ba71-b85a-4004-af54-457a9734eed7";

struct Env {
    _tmp: TempDir,
    pool: SqlitePool,
    config: Config,
    stats_dir: PathBuf,
    adv_dir: PathBuf,
}

async fn setup() -> Env {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let stats_dir = root.join("stats");
    let adv_dir = root.join("advancements");
    fs::create_dir_all(&stats_dir).unwrap();
    fs::create_dir_all(&adv_dir).unwrap();

    let config = parse_config(&format!(
        "[db]\npath = \"{}\"\n",
        root.join("data").join("statledger.sqlite").display()
    ))
    .unwrap();
    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();
    register_server(&pool, "survival", Some("Survival")).await.unwrap();

    Env {
        _tmp: tmp,
        pool,
        config,
        stats_dir,
        adv_dir,
    }
}

fn write_json(dir: &Path, player: &str, body: &str) {
    fs::write(dir.join(format!("{}.json", player)), body).unwrap();
}

fn settings(env: &Env, server: &str) -> IngestSettings {
    IngestSettings::resolve(
        &env.config,
        IngestOverrides {
            server_code: Some(server.to_string()),
            stats_dir: Some(env.stats_dir.clone()),
            advancements_dir: Some(env.adv_dir.clone()),
            ..Default::default()
        },
    )
    .unwrap()
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let env = setup().await;
    write_json(
        &env.stats_dir,
        ALEX,
        r#"{"stats":{"minecraft:custom":{"minecraft:jump":5,"minecraft:deaths":1}},"DataVersion":3465}"#,
    );
    write_json(
        &env.stats_dir,
        STEVE,
        r#"{"stats":{"minecraft:mined":{"minecraft:stone":64}}}"#,
    );
    write_json(
        &env.adv_dir,
        ALEX,
        r#"{"minecraft:story/root":{"done":true,"criteria":{"crafting_table":"2023-01-01 10:00:00 +0000"}},"DataVersion":3465}"#,
    );

    let (_, first) = ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();
    assert_eq!(first.files_seen, 2);
    assert_eq!(first.snapshots_inserted, 2);
    assert_eq!(first.stat_facts_written, 3);
    assert_eq!(first.advancement_facts_written, 1);

    let (_, second) = ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();
    assert_eq!(second.snapshots_inserted, 0);
    assert_eq!(second.duplicates, 2);
    assert_eq!(second.stat_facts_written, 0);
    assert_eq!(second.advancement_facts_written, 0);

    assert_eq!(count(&env.pool, "players").await, 2);
    assert_eq!(count(&env.pool, "player_server_snapshots").await, 2);
    assert_eq!(count(&env.pool, "stat_facts").await, 3);
    assert_eq!(count(&env.pool, "advancement_facts").await, 1);

    // Each run is recorded and finished
    let unfinished: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM ingests WHERE finished_at IS NULL")
            .fetch_one(&env.pool)
            .await
            .unwrap();
    assert_eq!(count(&env.pool, "ingests").await, 2);
    assert_eq!(unfinished, 0);
}

#[tokio::test]
async fn test_reordered_keys_are_duplicates() {
    let env = setup().await;
    write_json(
        &env.stats_dir,
        ALEX,
        r#"{"stats":{"custom":{"jump":5,"walk":10}}}"#,
    );
    ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();

    // Same content, different key order and formatting, new mtime
    std::thread::sleep(std::time::Duration::from_millis(1100));
    write_json(
        &env.stats_dir,
        ALEX,
        "{\n  \"stats\": {\n    \"custom\": { \"walk\": 10, \"jump\": 5 }\n  }\n}\n",
    );
    let (_, summary) = ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();
    assert_eq!(summary.duplicates, 1);
    assert_eq!(count(&env.pool, "player_server_snapshots").await, 1);
}

#[tokio::test]
async fn test_changed_stats_create_new_snapshot() {
    let env = setup().await;
    write_json(&env.stats_dir, ALEX, r#"{"stats":{"custom":{"jump":5}}}"#);
    ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();

    write_json(&env.stats_dir, ALEX, r#"{"stats":{"custom":{"jump":6}}}"#);
    let (_, summary) = ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();
    assert_eq!(summary.snapshots_inserted, 1);
    assert_eq!(count(&env.pool, "player_server_snapshots").await, 2);
    assert_eq!(count(&env.pool, "players").await, 1);

    let values: Vec<i64> =
        sqlx::query_scalar("SELECT value FROM stat_facts WHERE stat_key = 'jump' ORDER BY value")
            .fetch_all(&env.pool)
            .await
            .unwrap();
    assert_eq!(values, vec![5, 6]);
}

#[tokio::test]
async fn test_advancements_change_alone_is_not_a_new_snapshot() {
    let env = setup().await;
    write_json(&env.stats_dir, ALEX, r#"{"stats":{"custom":{"jump":5}}}"#);
    write_json(&env.adv_dir, ALEX, r#"{"adv:first":{"done":true}}"#);
    ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();

    write_json(&env.adv_dir, ALEX, r#"{"adv:second":{"done":false}}"#);
    let (_, summary) = ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();
    assert_eq!(summary.duplicates, 1);
    assert_eq!(count(&env.pool, "player_server_snapshots").await, 1);

    let adv_json: String =
        sqlx::query_scalar("SELECT advancements_json FROM player_server_snapshots")
            .fetch_one(&env.pool)
            .await
            .unwrap();
    let stored: serde_json::Value = serde_json::from_str(&adv_json).unwrap();
    assert_eq!(stored, json!({"adv:first": {"done": true}}));

    let keys: Vec<String> = sqlx::query_scalar("SELECT advancement_key FROM advancement_facts")
        .fetch_all(&env.pool)
        .await
        .unwrap();
    assert_eq!(keys, vec!["adv:first".to_string()]);
}

#[tokio::test]
async fn test_malformed_value_skips_only_that_fact() {
    let env = setup().await;
    write_json(
        &env.stats_dir,
        ALEX,
        r#"{"stats":{"custom":{"jump":"not-a-number","walk_one_cm":300},"mined":{"stone":"12"}}}"#,
    );

    let (_, summary) = ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();
    assert_eq!(summary.snapshots_inserted, 1);
    assert_eq!(summary.stat_facts_written, 2);

    let jumps: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stat_facts WHERE stat_key = 'jump'")
        .fetch_one(&env.pool)
        .await
        .unwrap();
    assert_eq!(jumps, 0);
}

#[tokio::test]
async fn test_malformed_file_is_skipped_and_run_finishes() {
    let env = setup().await;
    write_json(&env.stats_dir, ALEX, "{ \"stats\": ");
    write_json(&env.stats_dir, STEVE, r#"{"stats":{"custom":{"jump":1}}}"#);

    let (run, summary) = ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();
    assert_eq!(summary.files_seen, 2);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.snapshots_inserted, 1);

    let finished_at: Option<i64> = sqlx::query_scalar("SELECT finished_at FROM ingests WHERE id = ?")
        .bind(&run.id)
        .fetch_one(&env.pool)
        .await
        .unwrap();
    assert!(finished_at.is_some());

    let players: Vec<String> = sqlx::query_scalar("SELECT uuid FROM players")
        .fetch_all(&env.pool)
        .await
        .unwrap();
    assert_eq!(players, vec![STEVE.to_string()]);
}

#[tokio::test]
async fn test_done_at_is_latest_criterion() {
    let env = setup().await;
    write_json(&env.stats_dir, ALEX, r#"{"stats":{}}"#);
    write_json(
        &env.adv_dir,
        ALEX,
        r#"{"adv:example":{"done":true,"criteria":{"a":"2023-01-01T00:00:00Z","b":"2023-06-01T00:00:00Z"}}}"#,
    );
    ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();

    let row = sqlx::query("SELECT done, done_at FROM advancement_facts WHERE advancement_key = 'adv:example'")
        .fetch_one(&env.pool)
        .await
        .unwrap();
    let done: bool = row.get("done");
    let done_at: Option<i64> = row.get("done_at");
    assert!(done);
    assert_eq!(
        done_at,
        Some(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap().timestamp())
    );
}

#[tokio::test]
async fn test_observed_at_is_file_mtime() {
    let env = setup().await;
    write_json(&env.stats_dir, ALEX, r#"{"stats":{"custom":{"jump":5}}}"#);
    let mtime = fs::metadata(env.stats_dir.join(format!("{}.json", ALEX)))
        .unwrap()
        .modified()
        .unwrap();
    let expected = chrono::DateTime::<Utc>::from(mtime).timestamp();

    ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();

    let observed_at: i64 = sqlx::query_scalar("SELECT observed_at FROM player_server_snapshots")
        .fetch_one(&env.pool)
        .await
        .unwrap();
    assert_eq!(observed_at, expected);
    let fact_observed_at: i64 = sqlx::query_scalar("SELECT observed_at FROM stat_facts")
        .fetch_one(&env.pool)
        .await
        .unwrap();
    assert_eq!(fact_observed_at, expected);
}

#[tokio::test]
async fn test_replayed_explosion_adds_no_rows() {
    let env = setup().await;
    write_json(&env.stats_dir, ALEX, r#"{"stats":{"custom":{"jump":5,"walk":7}}}"#);
    write_json(
        &env.adv_dir,
        ALEX,
        r#"{"adv:a":{"done":true,"criteria":{"x":"2023-01-01T00:00:00Z"}}}"#,
    );
    ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();

    let row = sqlx::query(
        "SELECT id, server_id, player_id, observed_at, stats_json, advancements_json FROM player_server_snapshots",
    )
    .fetch_one(&env.pool)
    .await
    .unwrap();
    let snapshot = AcceptedSnapshot {
        id: row.get("id"),
        server_id: row.get("server_id"),
        player_id: row.get("player_id"),
        observed_at: row.get("observed_at"),
    };
    let stats: serde_json::Value =
        serde_json::from_str(&row.get::<String, _>("stats_json")).unwrap();
    let advs: serde_json::Value =
        serde_json::from_str(&row.get::<String, _>("advancements_json")).unwrap();

    let mut conn = env.pool.acquire().await.unwrap();
    let stat_rows = explode_stats(&mut conn, &snapshot, &stats).await.unwrap();
    let adv_rows = explode_advancements(&mut conn, &snapshot, Some(&advs))
        .await
        .unwrap();
    drop(conn);

    assert_eq!(stat_rows, 0);
    assert_eq!(adv_rows, 0);
    assert_eq!(count(&env.pool, "stat_facts").await, 2);
    assert_eq!(count(&env.pool, "advancement_facts").await, 1);
}

#[tokio::test]
async fn test_unknown_server_aborts_before_writing() {
    let env = setup().await;
    write_json(&env.stats_dir, ALEX, r#"{"stats":{"custom":{"jump":5}}}"#);

    let err = ingest_directory(&env.pool, &settings(&env, "creative"), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("creative"));

    assert_eq!(count(&env.pool, "ingests").await, 0);
    assert_eq!(count(&env.pool, "players").await, 0);
    assert_eq!(count(&env.pool, "player_server_snapshots").await, 0);
}

#[tokio::test]
async fn test_same_content_on_two_servers() {
    let env = setup().await;
    register_server(&env.pool, "creative", None).await.unwrap();
    write_json(&env.stats_dir, ALEX, r#"{"stats":{"custom":{"jump":5}}}"#);

    ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();
    let (_, summary) = ingest_directory(&env.pool, &settings(&env, "creative"), None)
        .await
        .unwrap();

    assert_eq!(summary.snapshots_inserted, 1);
    assert_eq!(count(&env.pool, "player_server_snapshots").await, 2);
    assert_eq!(count(&env.pool, "players").await, 1);
}

#[tokio::test]
async fn test_limit_caps_files() {
    let env = setup().await;
    write_json(&env.stats_dir, ALEX, r#"{"stats":{}}"#);
    write_json(&env.stats_dir, STEVE, r#"{"stats":{}}"#);

    let (_, summary) = ingest_directory(&env.pool, &settings(&env, "survival"), Some(1))
        .await
        .unwrap();
    assert_eq!(summary.files_seen, 1);
    assert_eq!(count(&env.pool, "player_server_snapshots").await, 1);
}

#[tokio::test]
async fn test_finish_mark_is_set_once() {
    let env = setup().await;
    let (run, _) = ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap();

    // Already finished by the pipeline
    assert!(!finish_run(&env.pool, &run.id).await.unwrap());
    assert!(!finish_run(&env.pool, "no-such-run").await.unwrap());
}

#[tokio::test]
async fn test_register_server_is_idempotent() {
    let env = setup().await;
    let (first, created) = register_server(&env.pool, "skyblock", None).await.unwrap();
    assert!(created);
    let (second, created) = register_server(&env.pool, "skyblock", Some("Renamed"))
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
    assert_eq!(second.name, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_runs_store_each_snapshot_once() {
    let env = setup().await;
    let players: Vec<String> = (0..40).map(|i| format!("player-{:02}", i)).collect();
    for (i, player) in players.iter().enumerate() {
        write_json(
            &env.stats_dir,
            player,
            &format!(r#"{{"stats":{{"custom":{{"jump":{}}}}}}}"#, i),
        );
    }

    let pool_a = db::connect(&env.config).await.unwrap();
    let pool_b = db::connect(&env.config).await.unwrap();
    let settings_a = settings(&env, "survival");
    let settings_b = settings(&env, "survival");

    let (a, b) = tokio::join!(
        ingest_directory(&pool_a, &settings_a, None),
        ingest_directory(&pool_b, &settings_b, None)
    );
    let (_, a) = a.unwrap();
    let (_, b) = b.unwrap();

    assert_eq!(a.snapshots_inserted + b.snapshots_inserted, 40);
    assert_eq!(a.duplicates + b.duplicates, 40);
    assert_eq!(a.stat_facts_written + b.stat_facts_written, 40);
    assert_eq!(count(&env.pool, "player_server_snapshots").await, 40);
    assert_eq!(count(&env.pool, "stat_facts").await, 40);
    assert_eq!(count(&env.pool, "players").await, 40);

    pool_a.close().await;
    pool_b.close().await;
}

#[tokio::test]
async fn test_failed_fact_insert_rolls_back_the_file() {
    let env = setup().await;
    write_json(&env.stats_dir, ALEX, r#"{"stats":{"custom":{"jump":5}}}"#);

    sqlx::query("DROP TABLE stat_facts")
        .execute(&env.pool)
        .await
        .unwrap();

    let err = ingest_directory(&env.pool, &settings(&env, "survival"), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("stat_facts"), "got: {}", err);

    assert_eq!(count(&env.pool, "player_server_snapshots").await, 0);
    assert_eq!(count(&env.pool, "players").await, 0);

    let unfinished: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM ingests WHERE finished_at IS NULL")
            .fetch_one(&env.pool)
            .await
            .unwrap();
    assert_eq!(count(&env.pool, "ingests").await, 1);
    assert_eq!(unfinished, 1);
}
