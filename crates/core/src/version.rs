//! Version markers, the remote update check and the hand-off to the updater.

use std::{fmt, fs, path::Path, str::FromStr, time::Duration};

use tracing::{debug, info};

use crate::{
    config::AppConfig,
    error::{Error, Result},
    updater::system::spawn_detached,
};

/// Version baked into the running binary, used when no marker file exists.
pub const BUILT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dot-separated tuple of unsigned integers, compared numerically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version(Vec<u64>);

impl Version {
    /// Numeric segments in order.
    pub fn segments(&self) -> &[u64] {
        &self.0
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let segments = trimmed
            .split('.')
            .map(|segment| {
                if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(Error::Parse(format!("version {trimmed:?}")));
                }
                segment
                    .parse::<u64>()
                    .map_err(|_| Error::Parse(format!("version {trimmed:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(segments))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

/// Whether `remote` is strictly newer than `local`. Unparseable input is never newer.
pub fn is_newer(remote: &str, local: &str) -> bool {
    match (remote.parse::<Version>(), local.parse::<Version>()) {
        (Ok(remote), Ok(local)) => remote > local,
        _ => false,
    }
}

/// Read the local version marker, falling back to [`BUILT_VERSION`].
pub fn read_local_version(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => contents.trim().to_string(),
        Ok(_) => BUILT_VERSION.to_string(),
        Err(err) => {
            debug!(path = %path.display(), %err, "No local version marker; using built version");
            BUILT_VERSION.to_string()
        }
    }
}

/// Fetch the remote version marker with a short timeout.
pub fn fetch_remote_version(url: &str, timeout: Duration) -> Result<String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;
    let text = client.get(url).send()?.error_for_status()?.text()?;
    Ok(text.trim().to_string())
}

/// A newer release is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOffer {
    /// Version currently installed.
    pub local: String,
    /// Version published remotely.
    pub remote: String,
}

/// Compare the local marker with the remote one. Any failure means "no update".
pub fn check_for_update(config: &AppConfig) -> Option<UpdateOffer> {
    let local = read_local_version(&config.version_file_path());
    let remote = match fetch_remote_version(&config.version_url, config.version_check_timeout()) {
        Ok(remote) => remote,
        Err(err) => {
            debug!(%err, "Version check skipped");
            return None;
        }
    };
    offer_if_newer(local, remote)
}

fn offer_if_newer(local: String, remote: String) -> Option<UpdateOffer> {
    if is_newer(&remote, &local) {
        info!(%local, %remote, "Update available");
        Some(UpdateOffer { local, remote })
    } else {
        None
    }
}

/// Start the updater as an independent process. The caller should exit on success.
pub fn launch_updater(config: &AppConfig) -> Result<()> {
    let updater = config.updater_binary_path();
    spawn_detached(&updater)?;
    info!(updater = %updater.display(), "Updater launched");
    Ok(())
}
