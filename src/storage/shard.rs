//! Shard directory discovery
//!
//! A data directory is laid out as
//!
//! ```text
//! <root>/<database>/<retention policy>/<shard id>/<generation>-<sequence>.tsm
//! <root>/<database>/_series/...        (series file, not a shard)
//! <root>/<database>/<rp>/<id>/index/... (per-shard TSI index, not a shard)
//! ```
//!
//! Directory entries are visited in name order so discovery is reproducible.
//! Symbolic links are not followed.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::tsm::TSM_EXTENSION;
use crate::error::{Error, Result};

/// Directory holding the engine's series file
pub const SERIES_FILE_DIRECTORY: &str = "_series";

/// Directory holding a shard's series index
pub const INDEX_DIRECTORY: &str = "index";

/// One storage file inside a shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFile {
    /// Database name (third directory above the file)
    pub database: OsString,
    /// Retention policy name (second directory above the file)
    pub retention_policy: OsString,
    /// Shard ID (directory containing the file)
    pub shard_id: u64,
    /// Path to the file
    pub path: PathBuf,
}

/// Find every shard directory under `root`, keyed by shard ID.
///
/// A directory is a shard if its name parses as an unsigned integer.
/// `_series` and `index` directories are skipped without descending into
/// them. Any I/O failure aborts discovery.
pub fn discover_shards(root: &Path) -> Result<BTreeMap<u64, PathBuf>> {
    let mut shards = BTreeMap::new();
    visit_dirs(root, &mut shards)?;
    Ok(shards)
}

fn visit_dirs(path: &Path, shards: &mut BTreeMap<u64, PathBuf>) -> Result<()> {
    let metadata = fs::symlink_metadata(path).map_err(|source| walk_error(path, source))?;
    if !metadata.is_dir() {
        return Ok(());
    }

    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    if name == SERIES_FILE_DIRECTORY || name == INDEX_DIRECTORY {
        debug!(path = %path.display(), "skipping reserved directory");
        return Ok(());
    }

    if let Ok(id) = name.parse::<u64>() {
        debug!(shard_id = id, path = %path.display(), "discovered shard");
        shards.insert(id, path.to_path_buf());
    }

    for child in sorted_entries(path)? {
        visit_dirs(&child, shards)?;
    }
    Ok(())
}

/// List every TSM file below a shard directory.
///
/// Database and retention policy are taken from the absolute path of each
/// file. Files are ordered by shard ID, then by path.
///
/// # Errors
///
/// Fails if the directory cannot be read or a TSM file does not sit
/// directly inside a `<db>/<rp>/<shard id>` directory.
pub fn walk_shard_files(shard_dir: &Path) -> Result<Vec<ShardFile>> {
    let mut paths = Vec::new();
    collect_tsm_files(shard_dir, &mut paths)?;

    let mut files = paths
        .into_iter()
        .map(|path| locate(&path).map(|(database, retention_policy, shard_id)| ShardFile {
            database,
            retention_policy,
            shard_id,
            path,
        }))
        .collect::<Result<Vec<_>>>()?;

    files.sort_by(|a, b| a.shard_id.cmp(&b.shard_id).then_with(|| a.path.cmp(&b.path)));
    Ok(files)
}

fn collect_tsm_files(path: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let metadata = fs::symlink_metadata(path).map_err(|source| walk_error(path, source))?;
    if metadata.is_dir() {
        for child in sorted_entries(path)? {
            collect_tsm_files(&child, files)?;
        }
    } else if path.extension().is_some_and(|ext| ext == TSM_EXTENSION) {
        files.push(path.to_path_buf());
    }
    Ok(())
}

/// Resolve `(database, retention policy, shard id)` for a TSM file
fn locate(path: &Path) -> Result<(OsString, OsString, u64)> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let shard_dir = absolute.parent();
    let shard_id = shard_dir
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str())
        .and_then(|name| name.parse::<u64>().ok())
        .ok_or_else(|| {
            Error::ShardLayout(format!(
                "not a valid shard dir: {}",
                shard_dir.unwrap_or(&absolute).display()
            ))
        })?;

    let rp_dir = shard_dir.and_then(Path::parent);
    let db_dir = rp_dir.and_then(Path::parent);
    match (dir_name(rp_dir), dir_name(db_dir)) {
        (Some(rp), Some(db)) => Ok((db, rp, shard_id)),
        _ => Err(Error::ShardLayout(format!(
            "missing database or retention policy above {}",
            absolute.display()
        ))),
    }
}

fn dir_name(dir: Option<&Path>) -> Option<OsString> {
    dir.and_then(|d| d.file_name()).map(|name| name.to_os_string())
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir).map_err(|source| walk_error(dir, source))? {
        let entry = entry.map_err(|source| walk_error(dir, source))?;
        children.push(entry.path());
    }
    children.sort();
    Ok(children)
}

fn walk_error(path: &Path, source: std::io::Error) -> Error {
    Error::Walk {
        path: path.to_path_buf(),
        source,
    }
}
