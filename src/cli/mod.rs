//! Command-line interface for hall-monitor.
//!
//! Provides the full `run` workflow plus standalone `check` and `update`
//! commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
