//! Diff command implementation
//!
//! Runs a full apply against the git-diff backend, which describes every
//! change on stdout instead of making it.

use std::io::Write;

use dot_core::ApplyOptions;
use dot_fs::{NormalizedPath, OsFs};
use dot_state::FileState;
use dot_system::{GitDiffSystem, RealSystem, UnifiedEncoder};

use super::print_failures;
use crate::context::Context;
use crate::error::Result;

pub fn run_diff(context: &Context) -> Result<()> {
    let system = RealSystem::new(OsFs::new(), FileState::open(&context.state_file)?);
    let mut target = context.target_state();
    target.populate(&system)?;

    let stdout = std::io::stdout();
    let prefix = NormalizedPath::from(context.target_dir.as_path());
    let mut diff = GitDiffSystem::new(&system, UnifiedEncoder::new(stdout.lock()), prefix);
    let report = target.apply(&mut diff, &ApplyOptions { keep_going: true })?;
    diff.into_sink().into_inner().flush()?;

    print_failures(&report);
    Ok(report.into_result()?)
}
