//! SQLite storage and the reconciliation command for viewgate
//!
//! This crate provides:
//! - [`SqlitePermissionStore`], a [`viewgate_core::PermissionStore`] backed by SQLite
//! - the `viewgate` binary, which reconciles permission records with a
//!   handler manifest

mod error;
pub mod run;
pub mod store;

pub use error::CliError;
pub use run::{exit_code, print_report, run, summary_line, Args};
pub use store::{SqlitePermissionStore, DEFAULT_DATABASE};
