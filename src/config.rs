//! TOML configuration and ingest settings resolution.
//!
//! The config file carries the database location and, optionally, a default
//! `[ingest]` section. Command-line flags (with environment fallbacks) are
//! merged over the file by [`IngestSettings::resolve`], which is the single
//! place where configuration errors for a run are raised.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default)]
    pub server_code: Option<String>,
    #[serde(default)]
    pub stats_dir: Option<PathBuf>,
    #[serde(default)]
    pub advancements_dir: Option<PathBuf>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            server_code: None,
            stats_dir: None,
            advancements_dir: None,
            source: default_source(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_source() -> String {
    "vanilla-json".to_string()
}

fn default_include_globs() -> Vec<String> {
    vec!["*.json".to_string()]
}

/// Per-invocation overrides collected from CLI flags and the environment.
#[derive(Debug, Default, Clone)]
pub struct IngestOverrides {
    pub server_code: Option<String>,
    pub stats_dir: Option<PathBuf>,
    pub advancements_dir: Option<PathBuf>,
    pub source: Option<String>,
    pub notes: Option<String>,
}

/// Fully validated settings for one ingest run.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub server_code: String,
    pub stats_dir: PathBuf,
    pub advancements_dir: Option<PathBuf>,
    pub source: String,
    pub notes: String,
    pub include: GlobSet,
}

impl IngestSettings {
    /// Merge overrides over the `[ingest]` section and validate the result.
    ///
    /// Fails when the server code or stats directory is missing, or the stats
    /// directory does not exist. A configured advancements directory that does
    /// not exist is also rejected, since every player would silently lose
    /// their advancements otherwise.
    pub fn resolve(config: &Config, overrides: IngestOverrides) -> Result<Self> {
        let file = &config.ingest;

        let server_code = overrides
            .server_code
            .or_else(|| file.server_code.clone())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let Some(server_code) = server_code else {
            bail!("No server code configured. Pass --server, set STATLEDGER_SERVER_CODE, or set ingest.server_code");
        };

        let Some(stats_dir) = overrides.stats_dir.or_else(|| file.stats_dir.clone()) else {
            bail!("No stats directory configured. Pass --stats-dir, set STATLEDGER_STATS_DIR, or set ingest.stats_dir");
        };
        if !stats_dir.is_dir() {
            bail!("Stats directory does not exist: {}", stats_dir.display());
        }

        let advancements_dir = overrides
            .advancements_dir
            .or_else(|| file.advancements_dir.clone())
            .filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = &advancements_dir {
            if !dir.is_dir() {
                bail!("Advancements directory does not exist: {}", dir.display());
            }
        }

        let source = overrides.source.unwrap_or_else(|| file.source.clone());
        if source.trim().is_empty() {
            bail!("ingest.source must not be empty");
        }

        let notes = overrides
            .notes
            .unwrap_or_else(|| stats_dir.display().to_string());

        let include = build_globset(&file.include_globs)?;

        Ok(Self {
            server_code,
            stats_dir,
            advancements_dir,
            source,
            notes,
            include,
        })
    }
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid include glob: '{}'", pattern))?,
        );
    }
    Ok(builder.build()?)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.path.as_os_str().is_empty() {
        anyhow::bail!("db.path must not be empty");
    }

    if config.ingest.include_globs.is_empty() {
        anyhow::bail!("ingest.include_globs must contain at least one pattern");
    }
    build_globset(&config.ingest.include_globs)?;

    Ok(config)
}
