//! Apply command implementation

use colored::Colorize;
use dot_core::ApplyOptions;
use dot_fs::OsFs;
use dot_state::FileState;
use dot_system::{DryRunSystem, RealSystem};

use super::print_failures;
use crate::context::Context;
use crate::error::Result;

/// Bring the destination in line with the source.
///
/// With `dry_run`, nothing is changed and the command only reports whether
/// anything would be.
pub fn run_apply(context: &Context, dry_run: bool, keep_going: bool) -> Result<()> {
    let mut system = RealSystem::new(OsFs::new(), FileState::open(&context.state_file)?);
    let mut target = context.target_state();
    target.populate(&system)?;
    let options = ApplyOptions { keep_going };

    let report = if dry_run {
        let mut preview = DryRunSystem::new(&system);
        let report = target.apply(&mut preview, &options)?;
        if preview.modified() {
            println!("{} Changes pending", "~".yellow().bold());
        } else {
            println!("{} Up to date", "OK".green().bold());
        }
        report
    } else {
        target.apply(&mut system, &options)?
    };

    print_failures(&report);
    Ok(report.into_result()?)
}
