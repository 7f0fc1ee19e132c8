//! Catalog store: game name to source path, icon and notes, persisted as JSON.
//!
//! Every mutating method writes the document back before returning, so the
//! file on disk always reflects the last mutation that reported success.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::{
    error::{Error, Result},
    models::GameEntry,
};

/// In-memory catalog bound to the file it was loaded from.
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
    games: BTreeMap<String, GameEntry>,
}

impl Catalog {
    /// Load the catalog at `path`; a missing file yields an empty catalog.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let games = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(Error::io("read catalog", &path, err)),
        };
        debug!(path = %path.display(), games = games.len(), "Catalog loaded");
        Ok(Self { path, games })
    }

    /// Write the full mapping to disk, replacing the previous document.
    pub fn save(&self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|err| Error::io("create", &parent, err))?;

        let serialised = serde_json::to_vec_pretty(&self.games)?;
        let mut staging =
            NamedTempFile::new_in(&parent).map_err(|err| Error::io("stage catalog in", &parent, err))?;
        staging
            .write_all(&serialised)
            .map_err(|err| Error::io("write catalog", staging.path(), err))?;
        staging
            .persist(&self.path)
            .map_err(|err| Error::io("replace catalog", &self.path, err.error))?;
        Ok(())
    }

    /// File backing this catalog.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, ordered by game name.
    pub fn games(&self) -> &BTreeMap<String, GameEntry> {
        &self.games
    }

    /// Game names in display order.
    pub fn names(&self) -> Vec<String> {
        self.games.keys().cloned().collect()
    }

    /// Look up a game by name.
    pub fn get(&self, name: &str) -> Option<&GameEntry> {
        self.games.get(name)
    }

    /// Look up a game, failing with `InvalidInput` for unknown names.
    pub fn require(&self, name: &str) -> Result<&GameEntry> {
        self.games
            .get(name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown game {name:?}")))
    }

    /// Number of games.
    pub fn len(&self) -> usize {
        self.games.len()
    }

    /// Whether the catalog has no games.
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Insert or replace the entry stored under `name`.
    pub fn upsert(&mut self, name: &str, entry: GameEntry) -> Result<()> {
        self.games.insert(name.to_string(), entry);
        self.save()
    }

    /// Remove the entry stored under `name`, returning it.
    pub fn remove(&mut self, name: &str) -> Result<GameEntry> {
        let entry = self
            .games
            .remove(name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown game {name:?}")))?;
        self.save()?;
        Ok(entry)
    }

    /// Apply `change` to an existing entry and persist.
    pub fn update<F>(&mut self, name: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut GameEntry),
    {
        let entry = self
            .games
            .get_mut(name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown game {name:?}")))?;
        change(entry);
        self.save()
    }

    /// Replace the note attached to `snapshot`.
    pub fn set_note(&mut self, game: &str, snapshot: &str, text: &str) -> Result<()> {
        self.update(game, |entry| {
            entry.notes.insert(snapshot.to_string(), text.to_string());
        })
    }

    /// Drop the note attached to `snapshot`; absent notes are not an error.
    pub fn remove_note(&mut self, game: &str, snapshot: &str) -> Result<Option<String>> {
        let entry = self
            .games
            .get_mut(game)
            .ok_or_else(|| Error::InvalidInput(format!("unknown game {game:?}")))?;
        let removed = entry.notes.remove(snapshot);
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    /// Move the note keyed by `from` to `to`, if there is one.
    pub fn rename_note(&mut self, game: &str, from: &str, to: &str) -> Result<()> {
        let entry = self
            .games
            .get_mut(game)
            .ok_or_else(|| Error::InvalidInput(format!("unknown game {game:?}")))?;
        if let Some(note) = entry.notes.remove(from) {
            entry.notes.insert(to.to_string(), note);
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_an_empty_catalog() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::load(dir.path().join("save_paths.json"))?;
        assert!(catalog.is_empty());
        assert!(!catalog.path().exists());
        Ok(())
    }

    #[test]
    fn every_mutation_is_persisted() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("save_paths.json");
        let mut catalog = Catalog::load(&path)?;

        catalog.upsert("Foo", GameEntry::new("/saves/foo"))?;
        assert_eq!(Catalog::load(&path)?.len(), 1);

        catalog.set_note("Foo", "01.01.2024_00-00-00", "first")?;
        let reloaded = Catalog::load(&path)?;
        assert_eq!(
            reloaded.require("Foo")?.note("01.01.2024_00-00-00"),
            Some("first")
        );

        catalog.rename_note("Foo", "01.01.2024_00-00-00", "boss")?;
        let reloaded = Catalog::load(&path)?;
        assert_eq!(reloaded.require("Foo")?.note("boss"), Some("first"));
        assert_eq!(reloaded.require("Foo")?.notes.len(), 1);

        assert_eq!(catalog.remove_note("Foo", "boss")?, Some("first".to_string()));
        assert!(Catalog::load(&path)?.require("Foo")?.notes.is_empty());

        catalog.remove("Foo")?;
        assert!(Catalog::load(&path)?.is_empty());
        Ok(())
    }

    #[test]
    fn duplicate_names_overwrite() -> Result<()> {
        let dir = tempdir()?;
        let mut catalog = Catalog::load(dir.path().join("save_paths.json"))?;
        catalog.upsert("Foo", GameEntry::new("/a"))?;
        catalog.upsert("Foo", GameEntry::new("/b"))?;
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.require("Foo")?.source_path, PathBuf::from("/b"));
        Ok(())
    }

    #[test]
    fn reads_documents_written_by_hand() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("save_paths.json");
        fs::write(
            &path,
            r#"{
  "Späť": {"path": "/saves/spat", "icon": "icons/Späť.png",
           "notes": {"02.03.2024_12-30-00": "Backed up files:\nslot1"}},
  "Bar": {"path": "/saves/bar", "icon": ""}
}"#,
        )?;
        let catalog = Catalog::load(&path)?;
        assert_eq!(catalog.names(), vec!["Bar".to_string(), "Späť".to_string()]);
        let entry = catalog.require("Späť")?;
        assert_eq!(entry.icon_path, Some(PathBuf::from("icons/Späť.png")));
        assert_eq!(entry.notes.len(), 1);

        catalog.save()?;
        let written = fs::read_to_string(&path)?;
        assert!(written.contains("Späť"));
        Ok(())
    }

    #[test]
    fn unknown_games_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        let mut catalog = Catalog::load(dir.path().join("save_paths.json"))?;
        assert!(matches!(
            catalog.set_note("Nope", "x", "y"),
            Err(Error::InvalidInput(_))
        ));
        assert!(catalog.remove("Nope").is_err());
        Ok(())
    }
}
