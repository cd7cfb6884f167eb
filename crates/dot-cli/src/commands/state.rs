//! State command implementations

use std::collections::BTreeMap;

use colored::Colorize;
use dot_state::{FileState, PersistentState};

use crate::context::Context;
use crate::error::Result;

/// Print the whole state file as JSON: `{bucket: {key: value}}`.
pub fn run_state_dump(context: &Context) -> Result<()> {
    let state = FileState::open(&context.state_file)?;

    let mut dump: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for (bucket, key, value) in state.entries().iter() {
        dump.entry(String::from_utf8_lossy(bucket).into_owned())
            .or_default()
            .insert(
                String::from_utf8_lossy(key).into_owned(),
                String::from_utf8_lossy(value).into_owned(),
            );
    }
    println!("{}", serde_json::to_string_pretty(&dump)?);
    Ok(())
}

pub fn run_state_delete(context: &Context, bucket: &str, key: &str) -> Result<()> {
    let mut state = FileState::open(&context.state_file)?;
    if state.get(bucket.as_bytes(), key.as_bytes())?.is_none() {
        println!("{} {bucket}/{key} not present", "-".dimmed());
        return Ok(());
    }
    state.delete(bucket.as_bytes(), key.as_bytes())?;
    println!("{} Deleted {bucket}/{key}", "OK".green().bold());
    Ok(())
}
