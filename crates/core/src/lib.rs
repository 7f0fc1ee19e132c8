#![warn(clippy::all, missing_docs)]

//! Core logic for savekeep.
//!
//! This crate hosts the catalog store, the snapshot and restore engines,
//! catalog maintenance, version checks and the self-update state machine
//! used by the terminal front end and the updater binary.

pub mod catalog;
pub mod config;
pub mod error;
pub mod fsops;
pub mod library;
pub mod models;
pub mod restore;
pub mod snapshot;
pub mod updater;
pub mod version;

pub use catalog::Catalog;
pub use config::AppConfig;
pub use error::{Error, Result};
pub use library::Library;
pub use models::GameEntry;
pub use restore::RestoreReport;
pub use snapshot::{SnapshotId, SnapshotInfo, SnapshotReport};
pub use updater::{UpdatePlan, UpdateState, Updater};
pub use version::{check_for_update, is_newer, launch_updater, UpdateOffer};
