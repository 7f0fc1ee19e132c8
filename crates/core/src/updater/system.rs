//! Process, network and launch backends used by the real updater binary.

use std::{
    io::Write,
    path::Path,
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System};
use tracing::{info, warn};

use super::{Fetcher, Launcher, ProcessControl};
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Process table access through `sysinfo`.
pub struct SystemProcesses {
    system: System,
    own_pid: Option<Pid>,
}

impl SystemProcesses {
    /// Snapshot the process table, remembering our own pid so we never stop ourselves.
    pub fn new() -> Self {
        Self {
            system: System::new(),
            own_pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn alive(&mut self, pids: &[Pid]) -> Vec<Pid> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(pids), true);
        pids.iter()
            .copied()
            .filter(|pid| {
                self.system
                    .process(*pid)
                    .map(|process| process.status() != ProcessStatus::Zombie)
                    .unwrap_or(false)
            })
            .collect()
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for SystemProcesses {
    fn stop_matching(&mut self, name: &str, grace: Duration) -> Result<usize> {
        let needle = name.to_lowercase();
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let targets: Vec<Pid> = self
            .system
            .processes()
            .iter()
            .filter(|(pid, _)| Some(**pid) != self.own_pid)
            .filter(|(_, process)| {
                process
                    .name()
                    .to_string_lossy()
                    .to_lowercase()
                    .contains(&needle)
            })
            .map(|(pid, _)| *pid)
            .collect();

        for pid in &targets {
            if let Some(process) = self.system.process(*pid) {
                info!(pid = %pid, name = %process.name().to_string_lossy(), "Terminating process");
                if process.kill_with(Signal::Term).is_none() {
                    process.kill();
                }
            }
        }

        let deadline = Instant::now() + grace;
        loop {
            let alive = self.alive(&targets);
            if alive.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                for pid in alive {
                    if let Some(process) = self.system.process(pid) {
                        warn!(pid = %pid, "Process ignored termination; killing");
                        process.kill();
                    }
                }
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        Ok(targets.len())
    }
}

/// Blocking HTTP client without a request timeout; binary downloads may be slow.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Build the client.
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn download(&mut self, url: &str, sink: &mut dyn Write) -> Result<u64> {
        let mut response = self.client.get(url).send()?.error_for_status()?;
        let bytes = response.copy_to(sink)?;
        Ok(bytes)
    }

    fn fetch_text(&mut self, url: &str) -> Result<String> {
        let text = self.client.get(url).send()?.error_for_status()?.text()?;
        Ok(text)
    }
}

/// Launches programs as detached processes.
#[derive(Debug, Default)]
pub struct CommandLauncher;

impl Launcher for CommandLauncher {
    fn launch(&mut self, program: &Path) -> Result<()> {
        spawn_detached(program)
    }
}

/// Spawn `program` in its own folder without inheriting our stdio.
pub fn spawn_detached(program: &Path) -> Result<()> {
    if !program.exists() {
        return Err(Error::NotFound(program.to_path_buf()));
    }
    let mut command = Command::new(program);
    if let Some(dir) = program.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        command.current_dir(dir);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;

        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let child = command
        .spawn()
        .map_err(|err| Error::io("launch", program, err))?;
    info!(pid = child.id(), program = %program.display(), "Process launched");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launching_a_missing_program_is_not_found() {
        let result = spawn_detached(Path::new("/definitely/not/here/savekeep"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn nothing_matches_an_unlikely_name() -> anyhow::Result<()> {
        let mut processes = SystemProcesses::new();
        let stopped =
            processes.stop_matching("savekeep-test-no-such-process-7f3a", Duration::ZERO)?;
        assert_eq!(stopped, 0);
        Ok(())
    }
}
