//! Shared domain models.

use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

/// Catalog record for one game, keyed by its name in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEntry {
    /// Directory holding the game's savegame files.
    #[serde(rename = "path")]
    pub source_path: PathBuf,
    /// Copy of the game's icon inside the icon store.
    #[serde(
        rename = "icon",
        default,
        deserialize_with = "empty_as_none",
        serialize_with = "none_as_empty"
    )]
    pub icon_path: Option<PathBuf>,
    /// Free-text notes keyed by snapshot folder name.
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
}

impl GameEntry {
    /// Create an entry without icon or notes.
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            icon_path: None,
            notes: BTreeMap::new(),
        }
    }

    /// Note attached to the given snapshot, if any.
    pub fn note(&self, snapshot: &str) -> Option<&str> {
        self.notes.get(snapshot).map(String::as_str)
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from))
}

fn none_as_empty<S>(value: &Option<PathBuf>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(path) => serializer.serialize_str(&path.to_string_lossy()),
        None => serializer.serialize_str(""),
    }
}
