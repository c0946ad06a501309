//! CLI subcommand implementations.

pub mod check;
pub mod cleanup;
pub mod install;
pub mod jsonutil;
pub mod list;
pub mod update;

use std::process::ExitCode;

/// With `--quiet`: nothing to report (no updates, nothing removed).
pub fn exit_no_data() -> ExitCode {
    ExitCode::from(61)
}

/// With `--quiet`: an installed image is incompatible and no fix exists.
pub fn exit_no_medium() -> ExitCode {
    ExitCode::from(123)
}
