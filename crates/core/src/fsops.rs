//! Metadata-preserving copy helpers and entry-name checks.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use filetime::FileTime;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Copy a single file over `dst`, keeping permissions and modification time.
///
/// Permissions come along with [`fs::copy`]. The modification time is set by
/// path afterwards, so read-only copies keep it too; where the platform still
/// refuses, the copy stands and a warning is logged.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    let bytes = fs::copy(src, dst).map_err(|err| Error::io("copy", src, err))?;
    preserve_mtime(src, dst);
    Ok(bytes)
}

fn preserve_mtime(src: &Path, dst: &Path) {
    let applied = fs::metadata(src).and_then(|metadata| {
        filetime::set_file_mtime(dst, FileTime::from_last_modification_time(&metadata))
    });
    if let Err(err) = applied {
        warn!(path = %dst.display(), %err, "Could not preserve modification time");
    }
}

/// Recursively copy `src` into `dst`, creating directories as needed and
/// overwriting files already present. Returns the number of files copied.
///
/// Directory modification times are applied once their contents are written.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    let mut files = 0;
    let mut dirs: Vec<(PathBuf, PathBuf)> = Vec::new();
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|err| walk_error(src, err))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| Error::Parse(format!("{} is outside {}", entry.path().display(), src.display())))?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|err| Error::io("create", &target, err))?;
            dirs.push((entry.path().to_path_buf(), target));
        } else {
            copy_file(entry.path(), &target)?;
            files += 1;
        }
    }
    // Deepest first, so setting a child never bumps an already stamped parent.
    for (from, to) in dirs.iter().rev() {
        preserve_mtime(from, to);
    }
    Ok(files)
}

pub(crate) fn walk_error(root: &Path, err: walkdir::Error) -> Error {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop"));
    Error::io("walk", path, source)
}

/// Ensure `name` is a single plain path component (no separators, `.` or `..`).
pub fn validate_entry_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(()),
        _ => Err(Error::InvalidInput(format!(
            "{name:?} is not a valid file or folder name"
        ))),
    }
}

/// Delete a file or a whole directory tree.
pub fn remove_entry(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
        _ => Error::io("inspect", path, err),
    })?;
    if metadata.is_dir() {
        fs::remove_dir_all(path).map_err(|err| Error::io("delete", path, err))
    } else {
        fs::remove_file(path).map_err(|err| Error::io("delete", path, err))
    }
}

/// Rename `from` to `to`, refusing to replace an existing entry.
pub fn rename_entry(from: &Path, to: &Path) -> Result<()> {
    if fs::symlink_metadata(from).is_err() {
        return Err(Error::NotFound(from.to_path_buf()));
    }
    if fs::symlink_metadata(to).is_ok() {
        return Err(Error::NameCollision(to.to_path_buf()));
    }
    fs::rename(from, to).map_err(|err| Error::io("rename", from, err))
}
