//! Self-update sequence as an explicit state machine.
//!
//! `Idle → Stopping → Downloading → UpdatingMarker → Relaunching → Done`, with
//! `Failed` reachable from every working state. Once the old process has been
//! stopped there is no way back; a failed download leaves no running copy.

pub mod system;

use std::{
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    error::{Error, Result},
};

pub use system::{CommandLauncher, HttpFetcher, SystemProcesses};

/// Finds and stops running copies of the application.
pub trait ProcessControl {
    /// Stop every process whose name contains `name` (case-insensitive),
    /// force-killing those still alive after `grace`. Returns how many matched.
    fn stop_matching(&mut self, name: &str, grace: Duration) -> Result<usize>;
}

/// Fetches remote resources.
pub trait Fetcher {
    /// Stream the body at `url` into `sink`, returning the byte count.
    fn download(&mut self, url: &str, sink: &mut dyn Write) -> Result<u64>;
    /// Fetch the body at `url` as text.
    fn fetch_text(&mut self, url: &str) -> Result<String>;
}

/// Starts the replacement binary.
pub trait Launcher {
    /// Spawn `program` as an independent process.
    fn launch(&mut self, program: &Path) -> Result<()>;
}

/// Working stage named by a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    /// Locating and terminating the running application.
    Stopping,
    /// Replacing the application binary.
    Downloading,
    /// Rewriting the local version marker.
    UpdatingMarker,
    /// Starting the new binary.
    Relaunching,
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopping => "stopping",
            Self::Downloading => "downloading",
            Self::UpdatingMarker => "updating version marker",
            Self::Relaunching => "relaunching",
        };
        f.write_str(label)
    }
}

/// Position of the update sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    /// Nothing has happened yet.
    Idle,
    /// Next step stops the running application.
    Stopping,
    /// Next step downloads the replacement binary.
    Downloading,
    /// Next step refreshes the version marker.
    UpdatingMarker,
    /// Next step starts the new binary.
    Relaunching,
    /// New binary started.
    Done,
    /// Sequence stopped at `stage`.
    Failed {
        /// Stage that failed.
        stage: UpdateStage,
        /// Human readable cause.
        reason: String,
    },
}

impl UpdateState {
    /// Whether stepping further has no effect.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }
}

/// Fixed inputs of one update run.
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    /// Name matched against running processes.
    pub app_name: String,
    /// Executable to replace and relaunch.
    pub binary_path: PathBuf,
    /// Replacement executable URL.
    pub binary_url: String,
    /// Version marker URL.
    pub version_url: String,
    /// Local version marker to overwrite.
    pub version_file: PathBuf,
    /// Grace period before force-killing.
    pub stop_timeout: Duration,
    /// Pause after stopping, before downloading.
    pub settle_delay: Duration,
}

impl UpdatePlan {
    /// Plan derived from the application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            app_name: config.app_binary.clone(),
            binary_path: config.app_binary_path(),
            binary_url: config.binary_url.clone(),
            version_url: config.version_url.clone(),
            version_file: config.version_file_path(),
            stop_timeout: config.stop_timeout(),
            settle_delay: config.settle_delay(),
        }
    }
}

/// Drives an [`UpdatePlan`] through its states using pluggable backends.
pub struct Updater<P, F, L> {
    plan: UpdatePlan,
    processes: P,
    fetcher: F,
    launcher: L,
    state: UpdateState,
    history: Vec<UpdateState>,
}

impl<P, F, L> Updater<P, F, L>
where
    P: ProcessControl,
    F: Fetcher,
    L: Launcher,
{
    /// Create an idle updater.
    pub fn new(plan: UpdatePlan, processes: P, fetcher: F, launcher: L) -> Self {
        Self {
            plan,
            processes,
            fetcher,
            launcher,
            state: UpdateState::Idle,
            history: vec![UpdateState::Idle],
        }
    }

    /// Current state.
    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[UpdateState] {
        &self.history
    }

    /// Perform the work of the current state and advance.
    pub fn step(&mut self) -> &UpdateState {
        let next = match self.state {
            UpdateState::Idle => UpdateState::Stopping,
            UpdateState::Stopping => self.stop_running(),
            UpdateState::Downloading => self.replace_binary(),
            UpdateState::UpdatingMarker => self.update_marker(),
            UpdateState::Relaunching => self.relaunch(),
            UpdateState::Done | UpdateState::Failed { .. } => return &self.state,
        };
        info!(from = ?self.state, to = ?next, "Updater transition");
        self.history.push(next.clone());
        self.state = next;
        &self.state
    }

    /// Step until a terminal state is reached.
    pub fn run(&mut self) -> &UpdateState {
        while !self.state.is_terminal() {
            self.step();
        }
        &self.state
    }

    fn stop_running(&mut self) -> UpdateState {
        match self
            .processes
            .stop_matching(&self.plan.app_name, self.plan.stop_timeout)
        {
            Ok(count) => {
                info!(count, name = %self.plan.app_name, "Stopped running application");
                if !self.plan.settle_delay.is_zero() {
                    thread::sleep(self.plan.settle_delay);
                }
                UpdateState::Downloading
            }
            Err(err) => failed(UpdateStage::Stopping, err),
        }
    }

    fn replace_binary(&mut self) -> UpdateState {
        match self.download_binary() {
            Ok(bytes) => {
                info!(bytes, path = %self.plan.binary_path.display(), "Binary replaced");
                UpdateState::UpdatingMarker
            }
            Err(err) => failed(UpdateStage::Downloading, err),
        }
    }

    fn download_binary(&mut self) -> Result<u64> {
        let target = &self.plan.binary_path;
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut staging =
            NamedTempFile::new_in(&dir).map_err(|err| Error::io("stage download in", &dir, err))?;
        let bytes = self.fetcher.download(&self.plan.binary_url, staging.as_file_mut())?;
        staging
            .as_file_mut()
            .flush()
            .map_err(|err| Error::io("write", staging.path(), err))?;
        mark_executable(staging.path())?;
        staging
            .persist(target)
            .map_err(|err| Error::io("replace", target, err.error))?;
        Ok(bytes)
    }

    fn update_marker(&mut self) -> UpdateState {
        let result = self
            .fetcher
            .fetch_text(&self.plan.version_url)
            .and_then(|text| {
                fs::write(&self.plan.version_file, text.trim())
                    .map_err(|err| Error::io("write", &self.plan.version_file, err))
            });
        if let Err(err) = result {
            warn!(%err, "Version marker not updated; continuing with relaunch");
        }
        UpdateState::Relaunching
    }

    fn relaunch(&mut self) -> UpdateState {
        match self.launcher.launch(&self.plan.binary_path) {
            Ok(()) => UpdateState::Done,
            Err(err) => failed(UpdateStage::Relaunching, err),
        }
    }
}

fn failed(stage: UpdateStage, err: Error) -> UpdateState {
    warn!(%stage, %err, "Update step failed");
    UpdateState::Failed {
        stage,
        reason: err.to_string(),
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|err| Error::io("set permissions on", path, err))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};
    use tempfile::tempdir;

    #[derive(Default)]
    struct Calls {
        stopped: Vec<String>,
        launched: Vec<PathBuf>,
    }

    struct FakeProcesses {
        calls: Rc<RefCell<Calls>>,
        fail: bool,
    }

    impl ProcessControl for FakeProcesses {
        fn stop_matching(&mut self, name: &str, _grace: Duration) -> Result<usize> {
            if self.fail {
                return Err(Error::InvalidInput("process table unavailable".into()));
            }
            self.calls.borrow_mut().stopped.push(name.to_string());
            Ok(1)
        }
    }

    struct FakeFetcher {
        binary: Option<Vec<u8>>,
        version: Option<String>,
    }

    impl Fetcher for FakeFetcher {
        fn download(&mut self, _url: &str, sink: &mut dyn Write) -> Result<u64> {
            let body = self
                .binary
                .as_ref()
                .ok_or_else(|| Error::Network("connection reset".into()))?;
            sink.write_all(body)
                .map_err(|err| Error::io("write", "sink", err))?;
            Ok(body.len() as u64)
        }

        fn fetch_text(&mut self, _url: &str) -> Result<String> {
            self.version
                .clone()
                .ok_or_else(|| Error::Network("timed out".into()))
        }
    }

    struct FakeLauncher {
        calls: Rc<RefCell<Calls>>,
        fail: bool,
    }

    impl Launcher for FakeLauncher {
        fn launch(&mut self, program: &Path) -> Result<()> {
            if self.fail {
                return Err(Error::NotFound(program.to_path_buf()));
            }
            self.calls.borrow_mut().launched.push(program.to_path_buf());
            Ok(())
        }
    }

    fn plan(dir: &Path) -> UpdatePlan {
        UpdatePlan {
            app_name: "savekeep".into(),
            binary_path: dir.join("savekeep"),
            binary_url: "https://example.invalid/savekeep".into(),
            version_url: "https://example.invalid/version.txt".into(),
            version_file: dir.join("version.txt"),
            stop_timeout: Duration::from_millis(10),
            settle_delay: Duration::ZERO,
        }
    }

    fn updater(
        dir: &Path,
        fetcher: FakeFetcher,
        stop_fails: bool,
        launch_fails: bool,
    ) -> (
        Updater<FakeProcesses, FakeFetcher, FakeLauncher>,
        Rc<RefCell<Calls>>,
    ) {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let updater = Updater::new(
            plan(dir),
            FakeProcesses {
                calls: Rc::clone(&calls),
                fail: stop_fails,
            },
            fetcher,
            FakeLauncher {
                calls: Rc::clone(&calls),
                fail: launch_fails,
            },
        );
        (updater, calls)
    }

    #[test]
    fn happy_path_walks_every_state() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("savekeep"), b"old build")?;
        fs::write(dir.path().join("version.txt"), "1.0.0")?;
        let (mut updater, calls) = updater(
            dir.path(),
            FakeFetcher {
                binary: Some(b"new build".to_vec()),
                version: Some("1.1.0\n".into()),
            },
            false,
            false,
        );

        assert_eq!(updater.run(), &UpdateState::Done);
        assert_eq!(
            updater.history(),
            &[
                UpdateState::Idle,
                UpdateState::Stopping,
                UpdateState::Downloading,
                UpdateState::UpdatingMarker,
                UpdateState::Relaunching,
                UpdateState::Done,
            ]
        );
        assert_eq!(fs::read(dir.path().join("savekeep"))?, b"new build");
        assert_eq!(fs::read_to_string(dir.path().join("version.txt"))?, "1.1.0");
        assert_eq!(calls.borrow().stopped, vec!["savekeep".to_string()]);
        assert_eq!(calls.borrow().launched, vec![dir.path().join("savekeep")]);

        assert_eq!(updater.step(), &UpdateState::Done);
        assert_eq!(updater.history().len(), 6);
        Ok(())
    }

    #[test]
    fn download_failure_leaves_installation_alone() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("savekeep"), b"old build")?;
        let (mut updater, calls) = updater(
            dir.path(),
            FakeFetcher {
                binary: None,
                version: Some("1.1.0".into()),
            },
            false,
            false,
        );

        let state = updater.run().clone();
        assert!(matches!(
            state,
            UpdateState::Failed {
                stage: UpdateStage::Downloading,
                ..
            }
        ));
        assert_eq!(fs::read(dir.path().join("savekeep"))?, b"old build");
        assert!(calls.borrow().launched.is_empty());
        assert!(!dir.path().join("version.txt").exists());
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn marker_failure_is_not_fatal() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let (mut updater, calls) = updater(
            dir.path(),
            FakeFetcher {
                binary: Some(b"new build".to_vec()),
                version: None,
            },
            false,
            false,
        );
        assert_eq!(updater.run(), &UpdateState::Done);
        assert!(!dir.path().join("version.txt").exists());
        assert_eq!(calls.borrow().launched.len(), 1);
        Ok(())
    }

    #[test]
    fn stop_and_relaunch_failures_are_terminal() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let fetcher = || FakeFetcher {
            binary: Some(b"new".to_vec()),
            version: Some("2.0".into()),
        };

        let (mut stopping, _) = updater(dir.path(), fetcher(), true, false);
        assert!(matches!(
            stopping.run(),
            UpdateState::Failed {
                stage: UpdateStage::Stopping,
                ..
            }
        ));
        assert!(!dir.path().join("savekeep").exists());

        let (mut relaunch, _) = updater(dir.path(), fetcher(), false, true);
        match relaunch.run() {
            UpdateState::Failed { stage, reason } => {
                assert_eq!(*stage, UpdateStage::Relaunching);
                assert!(reason.contains("does not exist"));
            }
            other => panic!("unexpected state {other:?}"),
        }
        Ok(())
    }
}
