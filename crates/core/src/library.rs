//! Catalog maintenance plus snapshot/restore bound to one catalog and backup tree.
//!
//! Notes are keyed by snapshot folder name, so renames and deletions of a
//! snapshot update both the folder and the note in the same call.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::info;

use crate::{
    catalog::Catalog,
    config::AppConfig,
    error::{Error, Result},
    fsops,
    models::GameEntry,
    restore::{self, RestoreReport},
    snapshot::{self, SnapshotId, SnapshotInfo, SnapshotReport},
};

/// Extension given to every file in the icon store.
pub const ICON_EXTENSION: &str = "png";

/// The catalog together with the backup tree and icon store it describes.
pub struct Library {
    catalog: Catalog,
    backup_root: PathBuf,
    icon_root: PathBuf,
}

impl Library {
    /// Open the catalog and directories named by the configuration.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let catalog = Catalog::load(config.catalog_path())?;
        Ok(Self::new(catalog, config.backup_root(), config.icon_root()))
    }

    /// Assemble a library from an already loaded catalog.
    pub fn new(
        catalog: Catalog,
        backup_root: impl Into<PathBuf>,
        icon_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            backup_root: backup_root.into(),
            icon_root: icon_root.into(),
        }
    }

    /// Underlying catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Entry for `game`.
    pub fn game(&self, game: &str) -> Result<&GameEntry> {
        self.catalog.require(game)
    }

    /// `BackupRoot/<game>`.
    pub fn game_backup_dir(&self, game: &str) -> PathBuf {
        self.backup_root.join(game)
    }

    /// `BackupRoot/<game>/<snapshot>`.
    pub fn snapshot_dir(&self, game: &str, snapshot: &str) -> PathBuf {
        self.game_backup_dir(game).join(snapshot)
    }

    /// Where the icon for `game` is stored.
    pub fn icon_path(&self, game: &str) -> PathBuf {
        self.icon_root.join(format!("{game}.{ICON_EXTENSION}"))
    }

    /// Register a game; an existing entry with the same name is replaced.
    pub fn add_game(&mut self, name: &str, source: &Path, icon: Option<&Path>) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("game name must not be empty".into()));
        }
        fsops::validate_entry_name(name)?;
        if source.as_os_str().is_empty() {
            return Err(Error::InvalidInput("choose a savegame directory".into()));
        }

        let mut entry = GameEntry::new(source);
        if let Some(image) = icon {
            entry.icon_path = Some(self.store_icon(name, image)?);
        }
        self.catalog.upsert(name, entry)?;
        info!(game = name, source = %source.display(), "Game added");
        Ok(())
    }

    /// Copy `image` into the icon store for `game`, replacing the previous icon.
    pub fn change_icon(&mut self, game: &str, image: &Path) -> Result<PathBuf> {
        self.catalog.require(game)?;
        let stored = self.store_icon(game, image)?;
        let recorded = stored.clone();
        self.catalog
            .update(game, |entry| entry.icon_path = Some(recorded))?;
        Ok(stored)
    }

    /// Point `game` at a different savegame directory.
    pub fn change_source_path(&mut self, game: &str, source: &Path) -> Result<()> {
        if source.as_os_str().is_empty() {
            return Err(Error::InvalidInput("choose a savegame directory".into()));
        }
        self.catalog
            .update(game, |entry| entry.source_path = source.to_path_buf())?;
        info!(game, source = %source.display(), "Source path changed");
        Ok(())
    }

    /// Drop `game` from the catalog. Backups and icon stay on disk.
    pub fn delete_game(&mut self, game: &str) -> Result<GameEntry> {
        let entry = self.catalog.remove(game)?;
        info!(game, "Game removed from catalog");
        Ok(entry)
    }

    /// Replace the note attached to `snapshot`.
    pub fn edit_note(&mut self, game: &str, snapshot: &str, text: &str) -> Result<()> {
        self.catalog.set_note(game, snapshot, text)
    }

    /// Top-level entries of the game's savegame directory, sorted by name.
    pub fn list_source_entries(&self, game: &str) -> Result<Vec<String>> {
        let source = &self.catalog.require(game)?.source_path;
        if !source.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(source).map_err(|err| Error::io("list", source, err))? {
            let entry = entry.map_err(|err| Error::io("list", source, err))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Delete a file or folder inside the game's savegame directory.
    pub fn delete_source_entry(&self, game: &str, entry: &str) -> Result<()> {
        fsops::validate_entry_name(entry)?;
        let path = self.catalog.require(game)?.source_path.join(entry);
        fsops::remove_entry(&path)?;
        info!(game, entry, "Source entry deleted");
        Ok(())
    }

    /// Rename a file or folder inside the game's savegame directory.
    pub fn rename_source_entry(&self, game: &str, from: &str, to: &str) -> Result<()> {
        fsops::validate_entry_name(from)?;
        fsops::validate_entry_name(to)?;
        if from == to {
            return Ok(());
        }
        let source = &self.catalog.require(game)?.source_path;
        fsops::rename_entry(&source.join(from), &source.join(to))?;
        info!(game, from, to, "Source entry renamed");
        Ok(())
    }

    /// Snapshot folders for `game`, newest first, with their notes.
    pub fn list_snapshots(&self, game: &str) -> Result<Vec<SnapshotInfo>> {
        let entry = self.catalog.require(game)?;
        snapshot::list_snapshots(&self.game_backup_dir(game), &entry.notes)
    }

    /// Copy the selected entries into a new snapshot and record the summary note.
    pub fn take_snapshot<S: AsRef<str>>(
        &mut self,
        game: &str,
        selected: &[S],
    ) -> Result<SnapshotReport> {
        self.take_snapshot_as(SnapshotId::now(), game, selected)
    }

    /// [`Library::take_snapshot`] with an explicit identifier.
    pub fn take_snapshot_as<S: AsRef<str>>(
        &mut self,
        id: SnapshotId,
        game: &str,
        selected: &[S],
    ) -> Result<SnapshotReport> {
        let source = self.catalog.require(game)?.source_path.clone();
        let report =
            snapshot::take_snapshot_as(id, &source, selected, &self.game_backup_dir(game))?;
        self.catalog
            .set_note(game, report.id.as_str(), &report.note_text())?;
        Ok(report)
    }

    /// Replay `snapshot` into the game's savegame directory.
    pub fn restore(&self, game: &str, snapshot: &str) -> Result<RestoreReport> {
        fsops::validate_entry_name(snapshot)?;
        let source = &self.catalog.require(game)?.source_path;
        restore::restore(&self.snapshot_dir(game, snapshot), source)
    }

    /// Rename a snapshot folder and move its note along.
    pub fn rename_snapshot(&mut self, game: &str, from: &str, to: &str) -> Result<()> {
        fsops::validate_entry_name(from)?;
        fsops::validate_entry_name(to)?;
        self.catalog.require(game)?;
        if from == to {
            return Ok(());
        }
        fsops::rename_entry(&self.snapshot_dir(game, from), &self.snapshot_dir(game, to))?;
        self.catalog.rename_note(game, from, to)?;
        info!(game, from, to, "Snapshot renamed");
        Ok(())
    }

    /// Delete a snapshot folder and its note. A folder already gone only drops the note.
    pub fn delete_snapshot(&mut self, game: &str, snapshot: &str) -> Result<()> {
        fsops::validate_entry_name(snapshot)?;
        self.catalog.require(game)?;
        let path = self.snapshot_dir(game, snapshot);
        if path.exists() {
            fs::remove_dir_all(&path).map_err(|err| Error::io("delete", &path, err))?;
        }
        self.catalog.remove_note(game, snapshot)?;
        info!(game, snapshot, "Snapshot deleted");
        Ok(())
    }

    fn store_icon(&self, game: &str, image: &Path) -> Result<PathBuf> {
        if !image.is_file() {
            return Err(Error::NotFound(image.to_path_buf()));
        }
        fs::create_dir_all(&self.icon_root)
            .map_err(|err| Error::io("create", &self.icon_root, err))?;
        let target = self.icon_path(game);
        fs::copy(image, &target).map_err(|err| Error::io("copy", image, err))?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        source: PathBuf,
        library: Library,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            let dir = tempdir()?;
            let root = dir.path().to_path_buf();
            let catalog = Catalog::load(root.join("save_paths.json"))?;
            let library = Library::new(catalog, root.join("Backups"), root.join("icons"));
            Ok(Self {
                _dir: dir,
                source: root.join("src"),
                root,
                library,
            })
        }

        fn reload(&self) -> Result<Catalog> {
            Ok(Catalog::load(self.root.join("save_paths.json"))?)
        }
    }

    fn id(hour: u32) -> SnapshotId {
        let time = NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("valid time");
        SnapshotId::from_time(time)
    }

    #[test]
    fn snapshot_then_restore_reverts_modified_file() -> Result<()> {
        let mut fx = Fixture::new()?;
        fs::create_dir_all(&fx.source)?;
        fs::write(fx.source.join("save.dat"), b"chapter 1")?;

        assert!(fx.library.catalog().is_empty());
        fx.library.add_game("Foo", &fx.source, None)?;

        let report = fx.library.take_snapshot("Foo", &["save.dat"])?;
        let stamp = report.id.to_string();
        let backed_up = fx.root.join("Backups/Foo").join(&stamp).join("save.dat");
        assert_eq!(fs::read(&backed_up)?, b"chapter 1");
        assert_eq!(
            fx.reload()?.require("Foo")?.note(&stamp),
            Some("Backed up files:\nsave.dat")
        );

        fs::write(fx.source.join("save.dat"), b"chapter 2 (broken)")?;
        fx.library.restore("Foo", &stamp)?;
        assert_eq!(fs::read(fx.source.join("save.dat"))?, b"chapter 1");
        Ok(())
    }

    #[test]
    fn restore_leaves_unselected_and_new_files() -> Result<()> {
        let mut fx = Fixture::new()?;
        fs::create_dir_all(fx.source.join("slots"))?;
        fs::write(fx.source.join("slots/a.sav"), b"a")?;
        fs::write(fx.source.join("options.ini"), b"opt")?;
        fx.library.add_game("Foo", &fx.source, None)?;
        fx.library.take_snapshot_as(id(9), "Foo", &["slots"])?;

        fs::write(fx.source.join("slots/a.sav"), b"changed")?;
        fs::write(fx.source.join("slots/b.sav"), b"new")?;
        let report = fx.library.restore("Foo", id(9).as_str())?;

        assert_eq!(report.files_restored, 1);
        assert_eq!(fs::read(fx.source.join("slots/a.sav"))?, b"a");
        assert_eq!(fs::read(fx.source.join("slots/b.sav"))?, b"new");
        assert_eq!(fs::read(fx.source.join("options.ini"))?, b"opt");
        Ok(())
    }

    #[test]
    fn missing_snapshot_restore_is_not_found() -> Result<()> {
        let mut fx = Fixture::new()?;
        fs::create_dir_all(&fx.source)?;
        fx.library.add_game("Foo", &fx.source, None)?;
        assert!(matches!(
            fx.library.restore("Foo", "01.01.2020_00-00-00"),
            Err(Error::NotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn deleting_a_game_keeps_backups_and_icon() -> Result<()> {
        let mut fx = Fixture::new()?;
        fs::create_dir_all(&fx.source)?;
        fs::write(fx.source.join("save.dat"), b"x")?;
        let image = fx.root.join("cover.jpg");
        fs::write(&image, b"img")?;
        fx.library.add_game("Foo", &fx.source, Some(image.as_path()))?;
        fx.library.take_snapshot_as(id(10), "Foo", &["save.dat"])?;

        fx.library.delete_game("Foo")?;
        assert!(fx.reload()?.get("Foo").is_none());
        assert!(fx.root.join("Backups/Foo").join(id(10).as_str()).join("save.dat").exists());
        assert!(fx.root.join("icons/Foo.png").exists());
        Ok(())
    }

    #[test]
    fn icons_are_copied_and_replaced() -> Result<()> {
        let mut fx = Fixture::new()?;
        let first = fx.root.join("first.ico");
        let second = fx.root.join("second.jpg");
        fs::write(&first, b"first")?;
        fs::write(&second, b"second")?;

        fx.library.add_game("Foo", &fx.source, Some(first.as_path()))?;
        let stored = fx.root.join("icons/Foo.png");
        assert_eq!(fx.reload()?.require("Foo")?.icon_path.as_deref(), Some(stored.as_path()));
        assert_eq!(fs::read(&stored)?, b"first");

        assert_eq!(fx.library.change_icon("Foo", &second)?, stored);
        assert_eq!(fs::read(&stored)?, b"second");

        let missing = fx.library.change_icon("Foo", &fx.root.join("nope.png"));
        assert!(matches!(missing, Err(Error::NotFound(_))));
        Ok(())
    }

    #[test]
    fn add_game_validates_input() -> Result<()> {
        let mut fx = Fixture::new()?;
        assert!(fx.library.add_game("  ", &fx.source, None).is_err());
        assert!(fx.library.add_game("Foo", Path::new(""), None).is_err());
        assert!(fx.library.add_game("../Foo", &fx.source, None).is_err());
        assert!(fx.library.catalog().is_empty());

        fx.library.add_game(" Foo ", &fx.source, None)?;
        fx.library.change_source_path("Foo", &fx.root.join("other"))?;
        assert_eq!(fx.reload()?.require("Foo")?.source_path, fx.root.join("other"));
        Ok(())
    }

    #[test]
    fn renaming_a_snapshot_moves_its_note() -> Result<()> {
        let mut fx = Fixture::new()?;
        fs::create_dir_all(&fx.source)?;
        fs::write(fx.source.join("save.dat"), b"x")?;
        fx.library.add_game("Foo", &fx.source, None)?;
        fx.library.take_snapshot_as(id(8), "Foo", &["save.dat"])?;

        fx.library.rename_snapshot("Foo", id(8).as_str(), "before boss")?;
        let catalog = fx.reload()?;
        let entry = catalog.require("Foo")?;
        assert_eq!(entry.note("before boss"), Some("Backed up files:\nsave.dat"));
        assert_eq!(entry.note(id(8).as_str()), None);
        assert!(fx.root.join("Backups/Foo/before boss/save.dat").exists());

        let listed = fx.library.list_snapshots("Foo")?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].taken_at, None);
        Ok(())
    }

    #[test]
    fn renaming_onto_an_existing_snapshot_is_refused() -> Result<()> {
        let mut fx = Fixture::new()?;
        fs::create_dir_all(&fx.source)?;
        fs::write(fx.source.join("save.dat"), b"x")?;
        fx.library.add_game("Foo", &fx.source, None)?;
        fx.library.take_snapshot_as(id(8), "Foo", &["save.dat"])?;
        fx.library.take_snapshot_as(id(9), "Foo", &["save.dat"])?;
        fx.library.edit_note("Foo", id(8).as_str(), "eight")?;
        fx.library.edit_note("Foo", id(9).as_str(), "nine")?;

        let result = fx.library.rename_snapshot("Foo", id(8).as_str(), id(9).as_str());
        assert!(matches!(result, Err(Error::NameCollision(_))));

        let catalog = fx.reload()?;
        let entry = catalog.require("Foo")?;
        assert_eq!(entry.note(id(8).as_str()), Some("eight"));
        assert_eq!(entry.note(id(9).as_str()), Some("nine"));
        assert!(fx.library.snapshot_dir("Foo", id(8).as_str()).is_dir());
        assert!(fx.library.snapshot_dir("Foo", id(9).as_str()).is_dir());
        Ok(())
    }

    #[test]
    fn deleting_a_snapshot_drops_folder_and_note() -> Result<()> {
        let mut fx = Fixture::new()?;
        fs::create_dir_all(&fx.source)?;
        fs::write(fx.source.join("save.dat"), b"x")?;
        fx.library.add_game("Foo", &fx.source, None)?;
        fx.library.take_snapshot_as(id(8), "Foo", &["save.dat"])?;
        fx.library.take_snapshot_as(id(11), "Foo", &["save.dat"])?;

        fx.library.delete_snapshot("Foo", id(8).as_str())?;
        assert!(!fx.library.snapshot_dir("Foo", id(8).as_str()).exists());
        assert_eq!(fx.reload()?.require("Foo")?.notes.len(), 1);

        let names: Vec<_> = fx
            .library
            .list_snapshots("Foo")?
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec![id(11).to_string()]);
        Ok(())
    }

    #[test]
    fn source_entries_can_be_listed_renamed_and_deleted() -> Result<()> {
        let mut fx = Fixture::new()?;
        fs::create_dir_all(fx.source.join("profile"))?;
        fs::write(fx.source.join("b.sav"), b"b")?;
        fs::write(fx.source.join("a.sav"), b"a")?;
        fx.library.add_game("Foo", &fx.source, None)?;

        assert_eq!(
            fx.library.list_source_entries("Foo")?,
            vec!["a.sav", "b.sav", "profile"]
        );

        let clash = fx.library.rename_source_entry("Foo", "a.sav", "b.sav");
        assert!(matches!(clash, Err(Error::NameCollision(_))));
        fx.library.rename_source_entry("Foo", "a.sav", "c.sav")?;
        fx.library.delete_source_entry("Foo", "profile")?;
        assert_eq!(fx.library.list_source_entries("Foo")?, vec!["b.sav", "c.sav"]);

        fx.library.change_source_path("Foo", &fx.root.join("gone"))?;
        assert!(fx.library.list_source_entries("Foo")?.is_empty());
        Ok(())
    }

    #[test]
    fn snapshot_of_missing_source_is_refused() -> Result<()> {
        let mut fx = Fixture::new()?;
        fx.library.add_game("Foo", &fx.source, None)?;
        let result = fx.library.take_snapshot("Foo", &["save.dat"]);
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(fx.reload()?.require("Foo")?.notes.is_empty());
        assert!(!fx.root.join("Backups/Foo").exists());
        Ok(())
    }
}
