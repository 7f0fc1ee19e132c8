//! Restore engine: overwrite-only replay of a snapshot into the source directory.

use std::{fs, path::Path};

use tracing::info;
use walkdir::WalkDir;

use crate::{
    error::{Error, Result},
    fsops,
};

/// Summary of a completed restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreReport {
    /// Number of files written into the source directory.
    pub files_restored: usize,
}

/// Copy every file of `snapshot_dir` to the same relative path under `source`.
///
/// Existing files are overwritten and files missing from the snapshot are left
/// alone. The first failure stops the walk; files restored before it stay.
pub fn restore(snapshot_dir: &Path, source: &Path) -> Result<RestoreReport> {
    if !snapshot_dir.is_dir() {
        return Err(Error::NotFound(snapshot_dir.to_path_buf()));
    }

    let mut report = RestoreReport::default();
    for entry in WalkDir::new(snapshot_dir).sort_by_file_name() {
        let entry = entry.map_err(|err| fsops::walk_error(snapshot_dir, err))?;
        let relative = entry.path().strip_prefix(snapshot_dir).map_err(|_| {
            Error::Parse(format!(
                "{} is outside {}",
                entry.path().display(),
                snapshot_dir.display()
            ))
        })?;
        let target = source.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|err| Error::io("create", &target, err))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|err| Error::io("create", parent, err))?;
            }
            fsops::copy_file(entry.path(), &target)?;
            report.files_restored += 1;
        }
    }

    info!(
        snapshot = %snapshot_dir.display(),
        target = %source.display(),
        files = report.files_restored,
        "Snapshot restored"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use filetime::FileTime;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    #[test]
    fn overwrites_and_keeps_unrelated_files() -> Result<()> {
        let dir = tempdir()?;
        let snapshot = dir.path().join("snap");
        fs::create_dir_all(snapshot.join("profile/slots"))?;
        fs::write(snapshot.join("save.dat"), b"old")?;
        fs::write(snapshot.join("profile/slots/1.sav"), b"slot one")?;
        fs::write(snapshot.join("profile/locked.sav"), b"locked")?;
        let mut permissions = fs::metadata(snapshot.join("profile/locked.sav"))?.permissions();
        permissions.set_readonly(true);
        fs::set_permissions(snapshot.join("profile/locked.sav"), permissions)?;
        let yesterday =
            FileTime::from_system_time(SystemTime::now() - Duration::from_secs(86_400));
        for file in ["save.dat", "profile/slots/1.sav", "profile/locked.sav"] {
            filetime::set_file_mtime(snapshot.join(file), yesterday)?;
        }

        let source = dir.path().join("src");
        fs::create_dir_all(&source)?;
        fs::write(source.join("save.dat"), b"new")?;
        fs::write(source.join("newer.dat"), b"keep me")?;

        let report = restore(&snapshot, &source)?;
        assert_eq!(report.files_restored, 3);
        assert_eq!(fs::read(source.join("save.dat"))?, b"old");
        assert_eq!(fs::read(source.join("profile/slots/1.sav"))?, b"slot one");
        assert_eq!(fs::read(source.join("newer.dat"))?, b"keep me");
        for file in ["save.dat", "profile/slots/1.sav", "profile/locked.sav"] {
            let restored = FileTime::from_last_modification_time(&fs::metadata(source.join(file))?);
            let backed_up = FileTime::from_last_modification_time(&fs::metadata(snapshot.join(file))?);
            assert_eq!(restored, backed_up, "{file} lost its modification time");
        }
        assert!(fs::metadata(source.join("profile/locked.sav"))?
            .permissions()
            .readonly());
        Ok(())
    }

    #[test]
    fn creates_missing_source_directory() -> Result<()> {
        let dir = tempdir()?;
        let snapshot = dir.path().join("snap");
        fs::create_dir_all(&snapshot)?;
        fs::write(snapshot.join("a"), b"a")?;
        let source = dir.path().join("fresh/install");
        restore(&snapshot, &source)?;
        assert_eq!(fs::read(source.join("a"))?, b"a");
        Ok(())
    }

    #[test]
    fn missing_snapshot_is_not_found() -> Result<()> {
        let dir = tempdir()?;
        let result = restore(&dir.path().join("nope"), dir.path());
        assert!(matches!(result, Err(Error::NotFound(_))));
        Ok(())
    }

    #[test]
    fn failure_stops_the_walk_and_keeps_earlier_files() -> Result<()> {
        let dir = tempdir()?;
        let snapshot = dir.path().join("snap");
        fs::create_dir_all(snapshot.join("b"))?;
        fs::write(snapshot.join("a.dat"), b"a")?;
        fs::write(snapshot.join("b/inner.dat"), b"inner")?;
        fs::write(snapshot.join("c.dat"), b"c")?;

        let source = dir.path().join("src");
        fs::create_dir_all(&source)?;
        // A plain file where the snapshot has a folder blocks the nested copy.
        fs::write(source.join("b"), b"blocker")?;

        assert!(restore(&snapshot, &source).is_err());
        assert_eq!(fs::read(source.join("a.dat"))?, b"a");
        assert!(!source.join("c.dat").exists());
        Ok(())
    }
}
