//! Filesystem source: one stats file per player, with an optional
//! same-named advancements file in a second directory.

use anyhow::Result;
use chrono::{DateTime, Utc};
use globset::GlobSet;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::PlayerDocument;

/// Why a single stats file was skipped. Never fatal to the run.
#[derive(Debug)]
pub enum PlayerFileError {
    NoPlayerId(PathBuf),
    Io(PathBuf, std::io::Error),
    Json(PathBuf, serde_json::Error),
    NotAnObject(PathBuf),
}

impl fmt::Display for PlayerFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPlayerId(p) => write!(f, "{}: no player id in file name", p.display()),
            Self::Io(p, e) => write!(f, "{}: {}", p.display(), e),
            Self::Json(p, e) => write!(f, "{}: malformed JSON: {}", p.display(), e),
            Self::NotAnObject(p) => write!(f, "{}: top-level value is not an object", p.display()),
        }
    }
}

impl std::error::Error for PlayerFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(_, e) => Some(e),
            Self::Json(_, e) => Some(e),
            Self::NoPlayerId(_) | Self::NotAnObject(_) => None,
        }
    }
}

/// List stats files directly under `stats_dir` whose names match `include`,
/// in lexicographic order. Symlinked files are followed; dangling links are
/// skipped with a warning.
pub fn scan_stats_dir(stats_dir: &Path, include: &GlobSet) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(stats_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 => {
                tracing::warn!(error = %e, "skipping unreadable stats entry");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if include.is_match(entry.file_name()) {
            files.push(entry.into_path());
        }
    }

    // Sort for deterministic ordering
    files.sort();
    Ok(files)
}

/// Player id for a stats file: its stem, e.g. `<uuid>` for `<uuid>.json`.
pub fn player_id_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
}

/// Read and parse one player's documents.
///
/// Errors in the stats file skip the player. A missing or malformed
/// advancements file only costs the player their advancements.
pub fn read_player_document(
    stats_path: &Path,
    advancements_dir: Option<&Path>,
) -> Result<PlayerDocument, PlayerFileError> {
    let player_uuid = player_id_from_path(stats_path)
        .ok_or_else(|| PlayerFileError::NoPlayerId(stats_path.to_path_buf()))?;

    let stats = read_json_object(stats_path)?;

    let modified = std::fs::metadata(stats_path)
        .and_then(|m| m.modified())
        .map_err(|e| PlayerFileError::Io(stats_path.to_path_buf(), e))?;
    let observed_at = DateTime::<Utc>::from(modified);

    let advancements = advancements_dir.and_then(|dir| read_advancements(dir, stats_path));

    Ok(PlayerDocument {
        player_uuid,
        stats_path: stats_path.to_path_buf(),
        observed_at,
        stats,
        advancements,
    })
}

fn read_advancements(dir: &Path, stats_path: &Path) -> Option<Value> {
    let path = dir.join(stats_path.file_name()?);
    if !path.is_file() {
        return None;
    }
    match read_json_object(&path) {
        // An empty document carries nothing worth fingerprinting
        Ok(Value::Object(map)) if map.is_empty() => None,
        Ok(doc) => Some(doc),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable advancements file");
            None
        }
    }
}

fn read_json_object(path: &Path) -> Result<Value, PlayerFileError> {
    let bytes = std::fs::read(path).map_err(|e| PlayerFileError::Io(path.to_path_buf(), e))?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| PlayerFileError::Json(path.to_path_buf(), e))?;
    if !value.is_object() {
        return Err(PlayerFileError::NotAnObject(path.to_path_buf()));
    }
    Ok(value)
}
