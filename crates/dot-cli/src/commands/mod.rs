//! Command implementations for dot-cli

pub mod apply;
pub mod diff;
pub mod state;

pub use apply::run_apply;
pub use diff::run_diff;
pub use state::{run_state_delete, run_state_dump};

use colored::Colorize;
use dot_core::ApplyReport;

/// Print the failures an apply recorded without stopping.
fn print_failures(report: &ApplyReport) {
    for error in &report.errors {
        eprintln!("{}: {}", "warning".yellow().bold(), error);
    }
}
