//! Server registry.
//!
//! Servers are registered by an operator with `statledger server add` and
//! only ever *resolved* by the ingest pipeline.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::Server;

/// Look up a server by code. An unknown code is a configuration error.
pub async fn resolve_server(pool: &SqlitePool, code: &str) -> Result<Server> {
    let row = sqlx::query("SELECT id, code, name FROM servers WHERE code = ?")
        .bind(code)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(Server {
            id: row.get("id"),
            code: row.get("code"),
            name: row.get("name"),
        }),
        None => bail!(
            "Server code not found in database: '{}'. Register it with `statledger server add {}`",
            code,
            code
        ),
    }
}

/// Register a server, or return the existing one with the same code.
/// The boolean is true when a new row was written.
pub async fn register_server(
    pool: &SqlitePool,
    code: &str,
    name: Option<&str>,
) -> Result<(Server, bool)> {
    let code = code.trim();
    if code.is_empty() {
        bail!("Server code must not be empty");
    }

    let now = chrono::Utc::now().timestamp();
    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO servers (code, name, created_at) VALUES (?, ?, ?)
        ON CONFLICT(code) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(code)
    .bind(name)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    let server = resolve_server(pool, code).await?;
    Ok((server, inserted.is_some()))
}

pub async fn list_servers(pool: &SqlitePool) -> Result<Vec<Server>> {
    let rows = sqlx::query("SELECT id, code, name FROM servers ORDER BY code")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| Server {
            id: row.get("id"),
            code: row.get("code"),
            name: row.get("name"),
        })
        .collect())
}

pub async fn run_server_add(config: &Config, code: &str, name: Option<&str>) -> Result<()> {
    let pool = db::connect(config).await?;
    let (server, created) = register_server(&pool, code, name).await?;
    if created {
        println!("registered server '{}' (id {})", server.code, server.id);
    } else {
        println!("server '{}' already registered (id {})", server.code, server.id);
    }
    pool.close().await;
    Ok(())
}

pub async fn run_server_list(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let servers = list_servers(&pool).await?;

    println!("{:<6} {:<24} NAME", "ID", "CODE");
    for s in &servers {
        println!(
            "{:<6} {:<24} {}",
            s.id,
            s.code,
            s.name.as_deref().unwrap_or("-")
        );
    }

    pool.close().await;
    Ok(())
}
