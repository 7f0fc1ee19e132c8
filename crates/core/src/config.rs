//! Application configuration layered from defaults, a TOML file and the environment.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Directory under the platform config/data dirs owned by the application.
pub const APP_DIR: &str = "savekeep";
/// Prefix for environment overrides, e.g. `SAVEKEEP_DATA_ROOT`.
pub const ENV_PREFIX: &str = "SAVEKEEP";

const CONFIG_FILE: &str = "config.toml";
const DEFAULT_VERSION_URL: &str =
    "https://raw.githubusercontent.com/savekeep/savekeep/master/version.txt";
const DEFAULT_BINARY_URL: &str = if cfg!(windows) {
    "https://github.com/savekeep/savekeep/releases/latest/download/savekeep.exe"
} else {
    "https://github.com/savekeep/savekeep/releases/latest/download/savekeep"
};

const DEFAULT_CONFIG: &str = r#"# savekeep configuration
#
# Relative backup_dir, icon_dir and catalog_file paths resolve against data_root.
# A relative version_file resolves against install_dir (the executable's folder
# when unset). Every key can be overridden with a SAVEKEEP_<KEY> variable.

# data_root = "/path/to/savekeep"
backup_dir = "Backups"
icon_dir = "icons"
catalog_file = "save_paths.json"
version_file = "version.txt"

# Seconds to wait for the remote version marker before giving up.
version_check_timeout_secs = 5
# Seconds the updater waits for a graceful shutdown before force-killing.
stop_timeout_secs = 5
"#;

/// Runtime settings shared by the front end and the updater.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base directory for the catalog, the backup tree and the icon store.
    pub data_root: PathBuf,
    /// Root of the backup tree (`<backup_dir>/<GameName>/<SnapshotId>`).
    pub backup_dir: PathBuf,
    /// Directory holding one icon image per game.
    pub icon_dir: PathBuf,
    /// Catalog document location.
    pub catalog_file: PathBuf,
    /// Folder containing the application and updater executables.
    pub install_dir: Option<PathBuf>,
    /// File name of the application executable.
    pub app_binary: String,
    /// File name of the updater executable.
    pub updater_binary: String,
    /// Local version marker.
    pub version_file: PathBuf,
    /// Remote plain-text version marker.
    pub version_url: String,
    /// Remote replacement executable.
    pub binary_url: String,
    /// Timeout for the version check request.
    pub version_check_timeout_secs: u64,
    /// Grace period before the updater force-kills the running application.
    pub stop_timeout_secs: u64,
    /// Pause after stopping the application, before the download starts.
    pub settle_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_root: dirs::data_dir()
                .map(|dir| dir.join(APP_DIR))
                .unwrap_or_else(|| PathBuf::from(".")),
            backup_dir: PathBuf::from("Backups"),
            icon_dir: PathBuf::from("icons"),
            catalog_file: PathBuf::from("save_paths.json"),
            install_dir: None,
            app_binary: executable_name("savekeep"),
            updater_binary: executable_name("savekeep-updater"),
            version_file: PathBuf::from("version.txt"),
            version_url: DEFAULT_VERSION_URL.to_string(),
            binary_url: DEFAULT_BINARY_URL.to_string(),
            version_check_timeout_secs: 5,
            stop_timeout_secs: 5,
            settle_delay_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default config file location.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load configuration from `path` (optional) plus environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        let config = settings
            .try_deserialize::<Self>()
            .context("failed to deserialize configuration")?;
        Ok(config)
    }

    /// Root of the per-game backup tree.
    pub fn backup_root(&self) -> PathBuf {
        self.resolve_data(&self.backup_dir)
    }

    /// Directory holding game icons.
    pub fn icon_root(&self) -> PathBuf {
        self.resolve_data(&self.icon_dir)
    }

    /// Location of the catalog document.
    pub fn catalog_path(&self) -> PathBuf {
        self.resolve_data(&self.catalog_file)
    }

    /// Directory for log files.
    pub fn log_dir(&self) -> PathBuf {
        self.data_root.join("logs")
    }

    /// Folder holding the executables, falling back to the running binary's folder.
    pub fn install_dir(&self) -> PathBuf {
        if let Some(dir) = &self.install_dir {
            return dir.clone();
        }
        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Full path of the application executable.
    pub fn app_binary_path(&self) -> PathBuf {
        self.install_dir().join(&self.app_binary)
    }

    /// Full path of the updater executable.
    pub fn updater_binary_path(&self) -> PathBuf {
        self.install_dir().join(&self.updater_binary)
    }

    /// Full path of the local version marker.
    pub fn version_file_path(&self) -> PathBuf {
        if self.version_file.is_absolute() {
            self.version_file.clone()
        } else {
            self.install_dir().join(&self.version_file)
        }
    }

    /// Timeout applied to the version check request only.
    pub fn version_check_timeout(&self) -> Duration {
        Duration::from_secs(self.version_check_timeout_secs)
    }

    /// Grace period given to the running application before a force-kill.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Pause inserted between stopping the application and downloading.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    fn resolve_data(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_root.join(path)
        }
    }
}

/// Default location of the configuration file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Write a commented default configuration file unless one already exists.
pub fn ensure_default_config() -> Result<()> {
    ensure_default_config_at(config_path())
}

/// Same as [`ensure_default_config`] for an explicit path.
pub fn ensure_default_config_at(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(())
}

fn executable_name(stem: &str) -> String {
    if cfg!(windows) {
        format!("{stem}.exe")
    } else {
        stem.to_string()
    }
}
