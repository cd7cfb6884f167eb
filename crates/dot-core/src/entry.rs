//! Target entries and how each one is brought up to date

use std::collections::BTreeMap;

use dot_fs::checksum::compute_checksum;
use dot_fs::{Metadata, NormalizedPath};
use dot_system::System;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::attr::RunPolicy;
use crate::template::{TemplateEngine, TemplateError, TemplateFuncs};
use crate::{Error, Result};

/// Persistent state bucket recording successful script runs, keyed by the
/// script's target name. Values are content checksums.
pub const SCRIPT_STATE_BUCKET: &[u8] = b"script-runs";

/// Content of an entry before and after template evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Contents {
    /// Template source, not yet evaluated.
    Raw(Vec<u8>),
    /// Final bytes.
    Ready(Vec<u8>),
    Failed(TemplateError),
}

impl Contents {
    pub(crate) fn new(bytes: Vec<u8>, template: bool) -> Self {
        if template {
            Self::Raw(bytes)
        } else {
            Self::Ready(bytes)
        }
    }

    fn ready(&self, source_name: &str) -> Result<&[u8]> {
        let source = match self {
            Self::Ready(bytes) => return Ok(bytes),
            Self::Raw(_) => TemplateError::NotEvaluated {
                name: source_name.to_string(),
            },
            Self::Failed(e) => e.clone(),
        };
        Err(Error::Template {
            name: source_name.to_string(),
            source,
        })
    }

    /// Run raw template content through the engine. Returns the failure, if
    /// any.
    fn evaluate(&mut self, ctx: &EvalContext<'_>, source_name: &str) -> Option<TemplateError> {
        let Self::Raw(raw) = self else {
            return None;
        };
        match ctx.engine.execute(source_name, raw, ctx.data, ctx.funcs) {
            Ok(bytes) => {
                *self = Self::Ready(bytes);
                None
            }
            Err(e) => {
                *self = Self::Failed(e.clone());
                Some(e)
            }
        }
    }
}

pub(crate) struct EvalContext<'a> {
    pub engine: &'a dyn TemplateEngine,
    pub data: &'a Value,
    pub funcs: &'a TemplateFuncs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub(crate) source_name: String,
    pub(crate) target_name: String,
    pub(crate) perm: u32,
    pub(crate) template: bool,
    pub(crate) empty: bool,
    pub(crate) contents: Contents,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    pub(crate) source_name: String,
    pub(crate) target_name: String,
    pub(crate) perm: u32,
    pub(crate) entries: BTreeMap<String, Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symlink {
    pub(crate) source_name: String,
    pub(crate) target_name: String,
    pub(crate) template: bool,
    pub(crate) linkname: Contents,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub(crate) source_name: String,
    pub(crate) target_name: String,
    pub(crate) template: bool,
    pub(crate) policy: RunPolicy,
    pub(crate) contents: Contents,
}

/// One desired object in the target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File(File),
    Dir(Dir),
    Symlink(Symlink),
    Script(Script),
}

impl File {
    pub fn perm(&self) -> u32 {
        self.perm
    }

    /// True when the file is kept even with empty content.
    pub fn is_empty_allowed(&self) -> bool {
        self.empty
    }

    /// Evaluated content.
    pub fn contents(&self) -> Result<&[u8]> {
        self.contents.ready(&self.source_name)
    }
}

impl Dir {
    pub fn perm(&self) -> u32 {
        self.perm
    }

    /// Children keyed by target base name, in apply order.
    pub fn entries(&self) -> &BTreeMap<String, Entry> {
        &self.entries
    }
}

impl Symlink {
    /// Evaluated link target, with surrounding whitespace removed.
    pub fn linkname(&self) -> Result<String> {
        let bytes = self.linkname.ready(&self.source_name)?;
        Ok(String::from_utf8_lossy(bytes).trim().to_string())
    }
}

impl Script {
    pub fn policy(&self) -> RunPolicy {
        self.policy
    }

    pub fn contents(&self) -> Result<&[u8]> {
        self.contents.ready(&self.source_name)
    }
}

/// Options for an apply.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Record write and script failures and carry on with other entries.
    pub keep_going: bool,
}

/// What happened during an apply that ran to completion.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Entries visited, including unchanged ones.
    pub visited: usize,
    /// Entry failures that did not stop the walk.
    pub errors: Vec<Error>,
}

impl ApplyReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        match Error::from_many(self.errors) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

/// Walk state shared across one apply.
pub(crate) struct Walk<'a> {
    options: &'a ApplyOptions,
    pub(crate) report: ApplyReport,
}

impl<'a> Walk<'a> {
    pub(crate) fn new(options: &'a ApplyOptions) -> Self {
        Self {
            options,
            report: ApplyReport::default(),
        }
    }

    /// Note an entry failure. Returns the error back when it ends the walk.
    fn record(&mut self, error: Error) -> Result<()> {
        if error.is_fatal() && !self.options.keep_going {
            return Err(error);
        }
        warn!(error = %error, "entry failed");
        self.report.errors.push(error);
        Ok(())
    }
}

impl Entry {
    /// Path relative to the source directory.
    pub fn source_name(&self) -> &str {
        match self {
            Self::File(e) => &e.source_name,
            Self::Dir(e) => &e.source_name,
            Self::Symlink(e) => &e.source_name,
            Self::Script(e) => &e.source_name,
        }
    }

    /// Path relative to the target directory.
    pub fn target_name(&self) -> &str {
        match self {
            Self::File(e) => &e.target_name,
            Self::Dir(e) => &e.target_name,
            Self::Symlink(e) => &e.target_name,
            Self::Script(e) => &e.target_name,
        }
    }

    pub fn is_template(&self) -> bool {
        match self {
            Self::File(e) => e.template,
            Self::Dir(_) => false,
            Self::Symlink(e) => e.template,
            Self::Script(e) => e.template,
        }
    }

    /// Make the target match this entry, issuing no mutations when it
    /// already does. Directories apply before their children.
    pub fn apply(&self, system: &mut dyn System, target_dir: &NormalizedPath) -> Result<()> {
        let options = ApplyOptions::default();
        let mut walk = Walk::new(&options);
        self.apply_with(system, target_dir, &mut walk)?;
        walk.report.into_result()
    }

    pub(crate) fn evaluate(&mut self, ctx: &EvalContext<'_>, errors: &mut Vec<Error>) {
        let failure = match self {
            Self::File(e) => e.contents.evaluate(ctx, &e.source_name),
            Self::Symlink(e) => e.linkname.evaluate(ctx, &e.source_name),
            Self::Script(e) => e.contents.evaluate(ctx, &e.source_name),
            Self::Dir(dir) => {
                for child in dir.entries.values_mut() {
                    child.evaluate(ctx, errors);
                }
                None
            }
        };
        if let Some(source) = failure {
            errors.push(Error::Template {
                name: self.source_name().to_string(),
                source,
            });
        }
    }

    pub(crate) fn apply_with(
        &self,
        system: &mut dyn System,
        target_dir: &NormalizedPath,
        walk: &mut Walk<'_>,
    ) -> Result<()> {
        walk.report.visited += 1;
        let path = target_dir.join(self.target_name());

        let outcome = match self {
            Self::File(file) => file.reconcile(system, &path),
            Self::Dir(dir) => dir.reconcile(system, &path),
            Self::Symlink(symlink) => symlink.reconcile(system, &path),
            Self::Script(script) => script.reconcile(system, &path),
        };
        if let Err(error) = outcome {
            // Children of a failed directory are skipped
            return walk.record(error);
        }

        if let Self::Dir(dir) = self {
            for child in dir.entries.values() {
                child.apply_with(system, target_dir, walk)?;
            }
        }
        Ok(())
    }
}

/// lstat that maps a missing path to `None`.
fn current(system: &dyn System, path: &NormalizedPath) -> Result<Option<Metadata>> {
    match system.lstat(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(Error::read(path, e)),
    }
}

impl File {
    fn reconcile(&self, system: &mut dyn System, path: &NormalizedPath) -> Result<()> {
        let contents = self.contents()?;
        let current = current(system, path)?;

        if contents.is_empty() && !self.empty {
            if current.is_some() {
                info!(path = %path, "removing empty file");
                system.remove_all(path).map_err(|e| Error::write(path, e))?;
            }
            return Ok(());
        }

        match current {
            Some(metadata) if metadata.is_file() => {
                let existing = system.read_file(path).map_err(|e| Error::read(path, e))?;
                if existing != contents {
                    info!(path = %path, "updating file");
                    system
                        .write_file(path, contents, self.perm)
                        .map_err(|e| Error::write(path, e))?;
                } else if metadata.perm() != self.perm {
                    info!(path = %path, perm = format_args!("{:o}", self.perm), "fixing file mode");
                    system.chmod(path, self.perm).map_err(|e| Error::write(path, e))?;
                } else {
                    debug!(path = %path, "file up to date");
                }
            }
            Some(_) => {
                info!(path = %path, "replacing with file");
                system.remove_all(path).map_err(|e| Error::write(path, e))?;
                system
                    .write_file(path, contents, self.perm)
                    .map_err(|e| Error::write(path, e))?;
            }
            None => {
                info!(path = %path, "creating file");
                system
                    .write_file(path, contents, self.perm)
                    .map_err(|e| Error::write(path, e))?;
            }
        }
        Ok(())
    }
}

impl Dir {
    fn reconcile(&self, system: &mut dyn System, path: &NormalizedPath) -> Result<()> {
        match current(system, path)? {
            Some(metadata) if metadata.is_dir() => {
                if metadata.perm() != self.perm {
                    info!(path = %path, perm = format_args!("{:o}", self.perm), "fixing directory mode");
                    system.chmod(path, self.perm).map_err(|e| Error::write(path, e))?;
                }
            }
            Some(_) => {
                info!(path = %path, "replacing with directory");
                system.remove_all(path).map_err(|e| Error::write(path, e))?;
                system.mkdir(path, self.perm).map_err(|e| Error::write(path, e))?;
            }
            None => {
                info!(path = %path, "creating directory");
                system.mkdir(path, self.perm).map_err(|e| Error::write(path, e))?;
            }
        }
        Ok(())
    }
}

impl Symlink {
    fn reconcile(&self, system: &mut dyn System, path: &NormalizedPath) -> Result<()> {
        let linkname = self.linkname()?;
        let current = current(system, path)?;

        if linkname.is_empty() {
            if current.is_some() {
                info!(path = %path, "removing symlink with empty target");
                system.remove_all(path).map_err(|e| Error::write(path, e))?;
            }
            return Ok(());
        }

        match current {
            Some(metadata) if metadata.is_symlink() => {
                if system.read_link(path).map_err(|e| Error::read(path, e))? == linkname {
                    debug!(path = %path, "symlink up to date");
                    return Ok(());
                }
            }
            // A rename cannot replace a directory
            Some(metadata) if metadata.is_dir() => {
                info!(path = %path, "replacing directory with symlink");
                system.remove_all(path).map_err(|e| Error::write(path, e))?;
            }
            _ => {}
        }

        info!(path = %path, target = %linkname, "writing symlink");
        system
            .write_symlink(&linkname, path)
            .map_err(|e| Error::write(path, e))
    }
}

impl Script {
    fn reconcile(&self, system: &mut dyn System, path: &NormalizedPath) -> Result<()> {
        let contents = self.contents()?;
        if contents.iter().all(u8::is_ascii_whitespace) {
            debug!(name = %self.target_name, "skipping empty script");
            return Ok(());
        }

        let key = self.target_name.as_bytes();
        let checksum = compute_checksum(contents);
        let should_run = match self.policy {
            RunPolicy::Always => true,
            RunPolicy::Once => system
                .state_get(SCRIPT_STATE_BUCKET, key)
                .map_err(|e| Error::read(path, e))?
                .is_none(),
            RunPolicy::OnChange => {
                system
                    .state_get(SCRIPT_STATE_BUCKET, key)
                    .map_err(|e| Error::read(path, e))?
                    .as_deref()
                    != Some(checksum.as_bytes())
            }
        };
        if !should_run {
            debug!(name = %self.target_name, policy = ?self.policy, "script already run");
            return Ok(());
        }

        info!(name = %self.target_name, "running script");
        system.run_script(path, contents).map_err(|source| Error::Script {
            name: self.target_name.clone(),
            source,
        })?;

        if self.policy != RunPolicy::Always {
            system
                .state_set(SCRIPT_STATE_BUCKET, key, checksum.as_bytes())
                .map_err(|e| Error::write(path, e))?;
        }
        Ok(())
    }
}
