//! Snapshot engine: timestamp-named copies of selected savegame entries.

use std::{
    collections::{BTreeMap, HashSet},
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{Local, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    error::{Error, Result},
    fsops,
};

/// `strftime` layout of snapshot folder names, e.g. `24.12.2024_18-05-09`.
pub const SNAPSHOT_FORMAT: &str = "%d.%m.%Y_%H-%M-%S";

/// Heading of the note recorded for every new snapshot.
pub const NOTE_HEADER: &str = "Backed up files:";

static SNAPSHOT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{2}\.\d{2}\.\d{4}_\d{2}-\d{2}-\d{2}$").expect("invalid snapshot name regex")
});

/// Name of a snapshot folder derived from the wall-clock time of capture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotId {
    name: String,
    taken_at: NaiveDateTime,
}

impl SnapshotId {
    /// Identifier for the current local time.
    pub fn now() -> Self {
        Self::from_time(Local::now().naive_local())
    }

    /// Identifier for an explicit capture time (sub-second precision is dropped).
    pub fn from_time(taken_at: NaiveDateTime) -> Self {
        let name = taken_at.format(SNAPSHOT_FORMAT).to_string();
        // Reparse so `taken_at` never carries the dropped fraction.
        let taken_at = NaiveDateTime::parse_from_str(&name, SNAPSHOT_FORMAT).unwrap_or(taken_at);
        Self { name, taken_at }
    }

    /// Folder name / note key.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Parsed capture time.
    pub fn taken_at(&self) -> NaiveDateTime {
        self.taken_at
    }
}

impl FromStr for SnapshotId {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        let taken_at = parse_snapshot_time(name)?;
        Ok(Self {
            name: name.to_string(),
            taken_at,
        })
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Parse a folder name in [`SNAPSHOT_FORMAT`], requiring zero-padded fields.
pub fn parse_snapshot_time(name: &str) -> Result<NaiveDateTime> {
    if !SNAPSHOT_NAME_RE.is_match(name) {
        return Err(Error::Parse(format!("snapshot name {name:?}")));
    }
    NaiveDateTime::parse_from_str(name, SNAPSHOT_FORMAT)
        .map_err(|err| Error::Parse(format!("snapshot name {name:?}: {err}")))
}

/// A snapshot folder found on disk, with its note if the catalog has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    /// Folder name.
    pub name: String,
    /// Full folder path.
    pub path: PathBuf,
    /// Parsed capture time; `None` for renamed or foreign folders.
    pub taken_at: Option<NaiveDateTime>,
    /// Associated free-text note.
    pub note: Option<String>,
}

impl SnapshotInfo {
    /// Time used for ordering; unparseable names sort as the oldest possible time.
    pub fn sort_key(&self) -> NaiveDateTime {
        self.taken_at.unwrap_or(NaiveDateTime::MIN)
    }
}

/// List snapshot folders under a game's backup directory, newest first.
pub fn list_snapshots(
    game_backup_dir: &Path,
    notes: &BTreeMap<String, String>,
) -> Result<Vec<SnapshotInfo>> {
    if !game_backup_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut snapshots = Vec::new();
    let entries =
        fs::read_dir(game_backup_dir).map_err(|err| Error::io("list", game_backup_dir, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| Error::io("list", game_backup_dir, err))?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let taken_at = match parse_snapshot_time(&name) {
            Ok(time) => Some(time),
            Err(_) => {
                warn!(folder = %name, "Snapshot name is not a timestamp; listing it last");
                None
            }
        };
        snapshots.push(SnapshotInfo {
            note: notes.get(&name).cloned(),
            path: entry.path(),
            name,
            taken_at,
        });
    }

    snapshots.sort_by(|a, b| {
        b.sort_key()
            .cmp(&a.sort_key())
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(snapshots)
}

/// A selected entry that could not be copied.
#[derive(Debug)]
pub struct EntryFailure {
    /// Entry name relative to the source directory.
    pub name: String,
    /// Why the copy failed.
    pub error: Error,
}

/// Outcome of a snapshot: its id, what made it in and what did not.
#[derive(Debug)]
pub struct SnapshotReport {
    /// Identifier (= folder name) of the new snapshot.
    pub id: SnapshotId,
    /// Folder the entries were copied into.
    pub path: PathBuf,
    /// Entries copied successfully, in selection order.
    pub copied: Vec<String>,
    /// Entries skipped because their copy failed.
    pub failures: Vec<EntryFailure>,
}

impl SnapshotReport {
    /// Note text summarising the copied entries.
    pub fn note_text(&self) -> String {
        format!("{NOTE_HEADER}\n{}", self.copied.join("\n"))
    }
}

/// Copy the selected entries of `source` into a new snapshot under `dest_root`.
pub fn take_snapshot<S: AsRef<str>>(
    source: &Path,
    selected: &[S],
    dest_root: &Path,
) -> Result<SnapshotReport> {
    take_snapshot_as(SnapshotId::now(), source, selected, dest_root)
}

/// [`take_snapshot`] with an explicit identifier.
///
/// The source must exist and the selection must be non-empty; after that each
/// entry is copied independently and failures are collected, not returned.
/// Reusing an existing id copies into the existing folder.
pub fn take_snapshot_as<S: AsRef<str>>(
    id: SnapshotId,
    source: &Path,
    selected: &[S],
    dest_root: &Path,
) -> Result<SnapshotReport> {
    if !source.is_dir() {
        return Err(Error::NotFound(source.to_path_buf()));
    }
    if selected.is_empty() {
        return Err(Error::InvalidInput("no entries selected".to_string()));
    }

    let path = dest_root.join(id.as_str());
    fs::create_dir_all(&path).map_err(|err| Error::io("create", &path, err))?;

    let mut report = SnapshotReport {
        id,
        path,
        copied: Vec::new(),
        failures: Vec::new(),
    };
    let mut seen = HashSet::new();
    for name in selected {
        let name = name.as_ref();
        if !seen.insert(name) {
            continue;
        }
        match copy_entry(source, name, &report.path) {
            Ok(()) => report.copied.push(name.to_string()),
            Err(error) => {
                warn!(entry = name, %error, "Skipping entry that could not be copied");
                report.failures.push(EntryFailure {
                    name: name.to_string(),
                    error,
                });
            }
        }
    }

    info!(
        snapshot = %report.id,
        copied = report.copied.len(),
        failed = report.failures.len(),
        "Snapshot taken"
    );
    Ok(report)
}

fn copy_entry(source: &Path, name: &str, snapshot_dir: &Path) -> Result<()> {
    fsops::validate_entry_name(name)?;
    let src = source.join(name);
    let dst = snapshot_dir.join(name);
    let metadata = fs::metadata(&src).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(src.clone()),
        _ => Error::io("inspect", &src, err),
    })?;
    if metadata.is_dir() {
        fsops::copy_tree(&src, &dst)?;
    } else {
        fsops::copy_file(&src, &dst)?;
    }
    Ok(())
}
