//! Searcher state snapshots.
//!
//! A snapshot is a versioned JSON document holding the coordinator and every
//! engine in full, so a restored searcher continues with exactly the
//! suggestions the original would have made.

use cf_types::{CfError, CfResult};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::cfo::CfoConfig;
use crate::config::Configuration;
use crate::flow2::LocalSearch;
use crate::space::SearchSpace;
use crate::trial::{BestResult, EngineId, Mode, TrialRecord};

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// File name prefix for indexed checkpoints. Files are named
/// `searcher-state-<index>.json`; the `.json` extension is appended to the
/// bare `searcher-state-<index>` template.
pub const CKPT_FILE_PREFIX: &str = "searcher-state-";

/// `searcher-state-<index>.json`
pub fn checkpoint_file_name(index: usize) -> String {
    format!("{CKPT_FILE_PREFIX}{index}.json")
}

pub fn checkpoint_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(checkpoint_file_name(index))
}

/// Full coordinator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfoSnapshot {
    pub version: u32,
    pub searcher_id: Uuid,
    pub saved_at: DateTime<Utc>,
    pub space: SearchSpace,
    pub low_cost: Configuration,
    pub metric: Option<String>,
    pub mode: Option<Mode>,
    pub config: CfoConfig,
    pub started: bool,
    pub engines: Vec<LocalSearch>,
    pub next_engine_id: EngineId,
    pub restarts: usize,
    pub retired: usize,
    pub trials: Vec<TrialRecord>,
    pub best: Option<BestResult>,
}

/// Write `value` as JSON to `path` atomically.
///
/// The document goes to a temp file in the same directory first and is then
/// renamed over `path`, so a crash mid-write never leaves a torn checkpoint.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> CfResult<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));
    let mut writer = BufWriter::new(std::fs::File::create(&tmp_path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> CfResult<T> {
    let file = std::fs::File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

/// Read and version-check a coordinator snapshot.
pub fn read_snapshot(path: &Path) -> CfResult<CfoSnapshot> {
    let snapshot: CfoSnapshot = read_json(path)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CfError::Checkpoint(format!(
            "{} has snapshot version {}, expected {}",
            path.display(),
            snapshot.version,
            SNAPSHOT_VERSION
        )));
    }
    Ok(snapshot)
}
