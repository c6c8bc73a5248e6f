//! Three-tier durable store.
//!
//! Layout under the data root:
//!
//! ```text
//! raw/<source>/<source>_raw_YYYYMMDD_HHMMSS.<fmt>
//! raw/<source>/<source>_raw_latest.<fmt>
//! raw/<source>/<source>_raw_latest.meta.json
//! curated/<source>_master_panel.<fmt>
//! curated/master_panel.<fmt>
//! indicators/indicators_daily.<fmt>
//! ```
//!
//! Every write goes to a uniquely named hidden temp file in the target
//! directory, is synced, then moved into place, so readers of a `latest`
//! file see the old or the new content and never a partial file. Timestamped files are create-only:
//! they are linked into place without clobbering, so a concurrent writer of
//! the same stamp fails with `AlreadyExists`.

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use super::table;
use crate::domain::{Panel, RawSnapshot, SchemaError, SourceTag};

pub const RAW_DIR: &str = "raw";
pub const CURATED_DIR: &str = "curated";
pub const INDICATORS_DIR: &str = "indicators";

const MASTER_PANEL: &str = "master_panel";
const INDICATORS_DAILY: &str = "indicators_daily";
const CURATED_SUFFIX: &str = "_master_panel";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to overwrite existing file {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("format error in {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    #[error("schema violation in {}: {source}", path.display())]
    Schema {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// On-disk table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    #[default]
    Parquet,
    Csv,
}

impl StorageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for StorageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parquet" => Ok(Self::Parquet),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown storage format '{other}' (expected parquet or csv)")),
        }
    }
}

/// Timestamp component of raw snapshot file names.
pub fn run_stamp(at: NaiveDateTime) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Paths and content hash of a published raw snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedRaw {
    pub stamped: PathBuf,
    pub latest: PathBuf,
    pub content_hash: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: PathBuf,
    pub bytes: u64,
    /// Table height; `None` for sidecars and unreadable files.
    pub rows: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierStatus {
    pub tier: String,
    pub files: Vec<FileStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub root: PathBuf,
    pub format: StorageFormat,
    pub tiers: Vec<TierStatus>,
}

#[derive(Debug, Clone)]
pub struct DataStore {
    root: PathBuf,
    format: StorageFormat,
}

impl DataStore {
    pub fn new(root: impl Into<PathBuf>, format: StorageFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> StorageFormat {
        self.format
    }

    fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.format.extension())
    }

    pub fn raw_dir(&self, source: &SourceTag) -> PathBuf {
        self.root.join(RAW_DIR).join(source.as_str())
    }

    pub fn raw_stamped_path(&self, source: &SourceTag, stamp: &str) -> PathBuf {
        self.raw_dir(source)
            .join(self.file_name(&format!("{source}_raw_{stamp}")))
    }

    pub fn raw_latest_path(&self, source: &SourceTag) -> PathBuf {
        self.raw_dir(source)
            .join(self.file_name(&format!("{source}_raw_latest")))
    }

    pub fn raw_meta_path(&self, source: &SourceTag) -> PathBuf {
        self.raw_dir(source)
            .join(format!("{source}_raw_latest.meta.json"))
    }

    pub fn curated_path(&self, source: &SourceTag) -> PathBuf {
        self.root
            .join(CURATED_DIR)
            .join(self.file_name(&format!("{source}{CURATED_SUFFIX}")))
    }

    pub fn master_panel_path(&self) -> PathBuf {
        self.root.join(CURATED_DIR).join(self.file_name(MASTER_PANEL))
    }

    pub fn indicators_path(&self) -> PathBuf {
        self.root
            .join(INDICATORS_DIR)
            .join(self.file_name(INDICATORS_DAILY))
    }

    // ── Raw tier ────────────────────────────────────────────────────

    /// Write the timestamped snapshot (create-only) and replace `latest`.
    pub fn publish_raw(
        &self,
        source: &SourceTag,
        raw: &RawSnapshot,
        stamp: &str,
    ) -> Result<PublishedRaw, StorageError> {
        let stamped = self.raw_stamped_path(source, stamp);
        let latest = self.raw_latest_path(source);
        raw.validate_shape().map_err(|e| StorageError::Schema {
            path: latest.clone(),
            source: e,
        })?;

        let bytes = table::encode_raw(raw, self.format, &latest)?;
        let content_hash = blake3::hash(&bytes).to_hex().to_string();

        atomic_write(&stamped, &bytes, WriteMode::CreateNew)?;
        atomic_write(&latest, &bytes, WriteMode::Replace)?;
        info!(source = %source, path = %latest.display(), rows = raw.height(), "published raw snapshot");

        Ok(PublishedRaw {
            stamped,
            latest,
            content_hash,
            rows: raw.height(),
        })
    }

    pub fn write_raw_meta<T: Serialize>(&self, source: &SourceTag, meta: &T) -> Result<PathBuf, StorageError> {
        let path = self.raw_meta_path(source);
        let json = serde_json::to_vec_pretty(meta).map_err(|e| StorageError::Format {
            path: path.clone(),
            message: format!("meta serialization: {e}"),
        })?;
        atomic_write(&path, &json, WriteMode::Replace)?;
        Ok(path)
    }

    pub fn read_raw_meta<T: DeserializeOwned>(&self, source: &SourceTag) -> Result<T, StorageError> {
        let path = self.raw_meta_path(source);
        let bytes = read_bytes(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Format {
            path,
            message: format!("meta parse: {e}"),
        })
    }

    pub fn read_raw_latest(&self, source: &SourceTag) -> Result<RawSnapshot, StorageError> {
        let path = self.raw_latest_path(source);
        let bytes = read_bytes(&path)?;
        table::decode(&bytes, self.format, &path)
    }

    /// Sources with a directory under `raw/`, sorted.
    pub fn raw_sources(&self) -> Result<Vec<SourceTag>, StorageError> {
        let dir = self.root.join(RAW_DIR);
        let mut out: Vec<SourceTag> = list_dir(&dir)?
            .into_iter()
            .filter(|p| p.is_dir())
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .filter_map(|n| SourceTag::new(n).ok())
            .collect();
        out.sort();
        Ok(out)
    }

    // ── Curated tier ────────────────────────────────────────────────

    pub fn write_curated(&self, source: &SourceTag, panel: &Panel) -> Result<PathBuf, StorageError> {
        let path = self.curated_path(source);
        self.write_panel(&path, panel)?;
        Ok(path)
    }

    pub fn read_curated(&self, source: &SourceTag) -> Result<Panel, StorageError> {
        self.read_panel(&self.curated_path(source))
    }

    /// Sources with a curated panel in the configured format, sorted.
    pub fn curated_sources(&self) -> Result<Vec<SourceTag>, StorageError> {
        let ext = format!(".{}", self.format.extension());
        let mut out: Vec<SourceTag> = list_dir(&self.root.join(CURATED_DIR))?
            .into_iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .filter_map(|name| {
                let stem = name.strip_suffix(&ext)?;
                let tag = stem.strip_suffix(CURATED_SUFFIX)?;
                SourceTag::new(tag).ok()
            })
            .collect();
        out.sort();
        Ok(out)
    }

    pub fn write_master(&self, panel: &Panel) -> Result<PathBuf, StorageError> {
        let path = self.master_panel_path();
        self.write_panel(&path, panel)?;
        Ok(path)
    }

    pub fn read_master(&self) -> Result<Panel, StorageError> {
        self.read_panel(&self.master_panel_path())
    }

    // ── Indicator tier ──────────────────────────────────────────────

    pub fn write_indicators(&self, panel: &Panel) -> Result<PathBuf, StorageError> {
        let path = self.indicators_path();
        self.write_panel(&path, panel)?;
        Ok(path)
    }

    pub fn read_indicators(&self) -> Result<Panel, StorageError> {
        self.read_panel(&self.indicators_path())
    }

    fn write_panel(&self, path: &Path, panel: &Panel) -> Result<(), StorageError> {
        panel.validate_daily().map_err(|source| StorageError::Schema {
            path: path.to_path_buf(),
            source,
        })?;
        let bytes = table::encode_panel(panel, self.format, path)?;
        atomic_write(path, &bytes, WriteMode::Replace)?;
        info!(path = %path.display(), rows = panel.height(), columns = panel.width(), "published panel");
        Ok(())
    }

    fn read_panel(&self, path: &Path) -> Result<Panel, StorageError> {
        let bytes = read_bytes(path)?;
        table::decode_panel(&bytes, self.format, path)
    }

    // ── Status ──────────────────────────────────────────────────────

    /// Files per tier with sizes and, for tables, row counts.
    pub fn status(&self) -> Result<StoreStatus, StorageError> {
        let mut tiers = Vec::new();
        for tier in [RAW_DIR, CURATED_DIR, INDICATORS_DIR] {
            let mut files = Vec::new();
            collect_files(&self.root.join(tier), &mut files)?;
            files.sort();
            let files = files
                .into_iter()
                .map(|path| self.file_status(path))
                .collect::<Result<Vec<_>, _>>()?;
            tiers.push(TierStatus {
                tier: tier.to_string(),
                files,
            });
        }
        Ok(StoreStatus {
            root: self.root.clone(),
            format: self.format,
            tiers,
        })
    }

    fn file_status(&self, path: PathBuf) -> Result<FileStatus, StorageError> {
        let bytes = fs::metadata(&path)
            .map_err(|e| StorageError::io(&path, e))?
            .len();
        let rows = table::format_for(&path).and_then(|format| {
            let content = fs::read(&path).ok()?;
            match table::decode(&content, format, &path) {
                Ok(t) => Some(t.height()),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "unreadable table in status listing");
                    None
                }
            }
        });
        Ok(FileStatus { path, bytes, rows })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    CreateNew,
    Replace,
}

/// Uniquely named temp file in the target directory, fsync, then rename
/// (`Replace`) or no-clobber link (`CreateNew`). The temp file is removed on
/// any failure.
fn atomic_write(path: &Path, bytes: &[u8], mode: WriteMode) -> Result<(), StorageError> {
    let dir = path
        .parent()
        .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))?;
    fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("table");
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| StorageError::io(dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| StorageError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StorageError::io(tmp.path(), e))?;

    let persisted = match mode {
        WriteMode::Replace => tmp.persist(path),
        WriteMode::CreateNew => tmp.persist_noclobber(path),
    };
    // on failure the temp file is dropped with the error
    persisted.map_err(|e| match e.error.kind() {
        std::io::ErrorKind::AlreadyExists if mode == WriteMode::CreateNew => {
            StorageError::AlreadyExists(path.to_path_buf())
        }
        _ => StorageError::io(path, e.error),
    })?;

    sync_dir(dir);
    debug!(path = %path.display(), bytes = bytes.len(), "atomic write");
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(d) = fs::File::open(dir) {
        let _ = d.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

fn read_bytes(path: &Path) -> Result<Vec<u8>, StorageError> {
    fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
        _ => StorageError::io(path, e),
    })
}

/// Entries of `dir`; a missing directory is empty.
fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    fs::read_dir(dir)
        .map_err(|e| StorageError::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()).map_err(|e| StorageError::io(dir, e)))
        .collect()
}

/// Non-hidden files below `dir`, recursively.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), StorageError> {
    for path in list_dir(dir)? {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n.starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
