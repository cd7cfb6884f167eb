//! The desired state of a target directory

use std::collections::BTreeMap;
use std::collections::btree_map;

use dot_fs::{FileKind, NormalizedPath};
use dot_system::{System, SystemReader};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::attr::{DirAttrs, FileAttrs, FileType};
use crate::entry::{self, ApplyOptions, ApplyReport, Contents, EvalContext, Walk};
use crate::template::{SimpleEngine, TemplateEngine, TemplateError, TemplateFuncs};
use crate::{Entry, Error, Result};

/// Everything a source directory says the target directory should contain.
///
/// Built by [`populate`](Self::populate), evaluated once, then applied
/// through any [`System`] backend.
pub struct TargetState {
    target_dir: NormalizedPath,
    source_dir: NormalizedPath,
    umask: u32,
    data: Value,
    funcs: TemplateFuncs,
    engine: Box<dyn TemplateEngine>,
    entries: BTreeMap<String, Entry>,
    read_errors: Vec<Error>,
    evaluated: bool,
}

impl TargetState {
    pub fn new(
        target_dir: impl Into<NormalizedPath>,
        umask: u32,
        source_dir: impl Into<NormalizedPath>,
        data: Value,
        funcs: TemplateFuncs,
    ) -> Self {
        Self {
            target_dir: target_dir.into(),
            source_dir: source_dir.into(),
            umask,
            data,
            funcs,
            engine: Box::new(SimpleEngine),
            entries: BTreeMap::new(),
            read_errors: Vec::new(),
            evaluated: false,
        }
    }

    /// Use `engine` instead of the built-in template language.
    pub fn with_engine(mut self, engine: impl TemplateEngine + 'static) -> Self {
        self.engine = Box::new(engine);
        self
    }

    pub fn target_dir(&self) -> &NormalizedPath {
        &self.target_dir
    }

    pub fn source_dir(&self) -> &NormalizedPath {
        &self.source_dir
    }

    pub fn umask(&self) -> u32 {
        self.umask
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Top-level entries keyed by target name.
    pub fn entries(&self) -> &BTreeMap<String, Entry> {
        &self.entries
    }

    /// Source entries the last [`populate`](Self::populate) could not read.
    /// They are left out of the tree and reported by the next apply.
    pub fn read_errors(&self) -> &[Error] {
        &self.read_errors
    }

    /// Look up an entry by its path relative to the target directory.
    pub fn get(&self, target_name: &str) -> Option<&Entry> {
        let mut components = target_name.split('/').filter(|c| !c.is_empty());
        let mut entry = self.entries.get(components.next()?)?;
        for component in components {
            let Entry::Dir(dir) = entry else {
                return None;
            };
            entry = dir.entries.get(component)?;
        }
        Some(entry)
    }

    /// Run `source` through the template engine with this state's data and
    /// functions.
    pub fn execute_template(&self, name: &str, source: &[u8]) -> std::result::Result<Vec<u8>, TemplateError> {
        self.engine.execute(name, source, &self.data, &self.funcs)
    }

    /// Scan the source directory and build the entry tree.
    ///
    /// Names starting with `.` are ignored. Reads go through `reader` so the
    /// source can live on any backend.
    ///
    /// Fails only when the source directory itself cannot be listed or two
    /// sources produce the same target. A source file or subdirectory that
    /// cannot be read is skipped and kept in [`read_errors`](Self::read_errors).
    pub fn populate<R: SystemReader + ?Sized>(&mut self, reader: &R) -> Result<()> {
        let source_dir = self.source_dir.clone();
        let mut read_errors = Vec::new();
        let entries = self.populate_dir(reader, &source_dir, "", "", &mut read_errors)?;
        info!(
            source = %self.source_dir,
            entries = entries.len(),
            unreadable = read_errors.len(),
            "populated target state"
        );
        self.entries = entries;
        self.read_errors = read_errors;
        self.evaluated = false;
        Ok(())
    }

    fn populate_dir<R: SystemReader + ?Sized>(
        &self,
        reader: &R,
        dir: &NormalizedPath,
        source_prefix: &str,
        target_prefix: &str,
        read_errors: &mut Vec<Error>,
    ) -> Result<BTreeMap<String, Entry>> {
        let mut entries = BTreeMap::new();
        for dir_entry in reader.read_dir(dir).map_err(|e| Error::read(dir, e))? {
            let name = dir_entry.name.as_str();
            if name.starts_with('.') {
                debug!(name, "ignoring hidden source entry");
                continue;
            }
            let path = dir.join(name);
            let source_name = join_name(source_prefix, name);

            let mut metadata = dir_entry.metadata;
            if metadata.is_symlink() {
                match reader.stat(&path) {
                    Ok(followed) => metadata = followed,
                    Err(e) => {
                        warn!(path = %path, error = %e, "skipping dangling source symlink");
                        continue;
                    }
                }
            }

            let entry = match metadata.kind() {
                FileKind::Dir => {
                    let attrs = DirAttrs::parse(name);
                    let target_name = join_name(target_prefix, &attrs.name);
                    let children =
                        match self.populate_dir(reader, &path, &source_name, &target_name, read_errors) {
                            Ok(children) => children,
                            Err(error @ Error::Read { .. }) => {
                                warn!(error = %error, "skipping unreadable source directory");
                                read_errors.push(error);
                                continue;
                            }
                            Err(error) => return Err(error),
                        };
                    Entry::Dir(entry::Dir {
                        source_name,
                        target_name,
                        perm: attrs.perm(self.umask),
                        entries: children,
                    })
                }
                FileKind::File => {
                    let attrs = FileAttrs::parse(name);
                    let target_name = join_name(target_prefix, &attrs.name);
                    let bytes = match reader.read_file(&path) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            let error = Error::read(&path, e);
                            warn!(error = %error, "skipping unreadable source file");
                            read_errors.push(error);
                            continue;
                        }
                    };
                    let contents = Contents::new(bytes, attrs.template);
                    match attrs.file_type {
                        FileType::Regular => Entry::File(entry::File {
                            source_name,
                            target_name,
                            perm: attrs.perm(self.umask),
                            template: attrs.template,
                            empty: attrs.empty,
                            contents,
                        }),
                        FileType::Symlink => Entry::Symlink(entry::Symlink {
                            source_name,
                            target_name,
                            template: attrs.template,
                            linkname: contents,
                        }),
                        FileType::Script(policy) => Entry::Script(entry::Script {
                            source_name,
                            target_name,
                            template: attrs.template,
                            policy,
                            contents,
                        }),
                    }
                }
                FileKind::Symlink | FileKind::Other => {
                    warn!(path = %path, "skipping unsupported source entry");
                    continue;
                }
            };

            let base = entry
                .target_name()
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string();
            match entries.entry(base) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
                btree_map::Entry::Occupied(slot) => {
                    return Err(Error::DuplicateTarget {
                        target_name: entry.target_name().to_string(),
                        first: slot.get().source_name().to_string(),
                        second: entry.source_name().to_string(),
                    });
                }
            }
        }
        Ok(entries)
    }

    /// Evaluate every template entry. Failed entries are marked and the
    /// failures returned together; other entries are unaffected.
    pub fn evaluate(&mut self) -> Result<()> {
        let ctx = EvalContext {
            engine: self.engine.as_ref(),
            data: &self.data,
            funcs: &self.funcs,
        };
        let mut errors = Vec::new();
        for entry in self.entries.values_mut() {
            entry.evaluate(&ctx, &mut errors);
        }
        self.evaluated = true;
        match Error::from_many(errors) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Bring the target directory in line with this state through `system`.
    ///
    /// Evaluates first if [`evaluate`](Self::evaluate) has not run. Returns
    /// `Err` only when a failure ends the walk; failures that did not are
    /// listed in the report, along with any unreadable sources.
    pub fn apply(&mut self, system: &mut dyn System, options: &ApplyOptions) -> Result<ApplyReport> {
        if !self.evaluated
            && let Err(error) = self.evaluate()
        {
            // Each failed entry is reported again by the walk
            debug!(error = %error, "template evaluation failed");
        }

        let mut walk = Walk::new(options);
        walk.report.errors.append(&mut self.read_errors);
        for entry in self.entries.values() {
            entry.apply_with(system, &self.target_dir, &mut walk)?;
        }
        let report = walk.report;
        info!(
            visited = report.visited,
            failed = report.errors.len(),
            "apply finished"
        );
        Ok(report)
    }
}

fn join_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dot_fs::MemFs;
    use dot_state::MemoryState;
    use dot_system::RealSystem;
    use serde_json::json;

    fn state_over(fs: MemFs) -> (TargetState, RealSystem<MemFs, MemoryState>) {
        let system = RealSystem::new(fs, MemoryState::new());
        let mut state = TargetState::new("/home/user", 0o022, "/src", json!({}), TemplateFuncs::new());
        state.populate(&system).unwrap();
        (state, system)
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let fs = MemFs::new();
        fs.create_file("/src/dot_foo", "a", 0o644).unwrap();
        fs.create_file("/src/private_dot_foo", "b", 0o644).unwrap();
        let system = RealSystem::new(fs, MemoryState::new());

        let mut state = TargetState::new("/home/user", 0o022, "/src", json!({}), TemplateFuncs::new());
        let err = state.populate(&system).unwrap_err();
        assert!(matches!(err, Error::DuplicateTarget { ref target_name, .. } if target_name == ".foo"));
    }

    #[test]
    fn get_descends_directories() {
        let fs = MemFs::new();
        fs.create_file("/src/private_dot_ssh/config", "Host *\n", 0o644).unwrap();
        let (state, _) = state_over(fs);

        let entry = state.get(".ssh/config").unwrap();
        assert_eq!(entry.source_name(), "private_dot_ssh/config");
        assert!(state.get(".ssh/missing").is_none());
        assert!(state.get(".ssh/config/deeper").is_none());
    }

    #[test]
    fn source_symlinks_are_followed() {
        let fs = MemFs::new();
        fs.create_file("/shared/profile", "export A=1\n", 0o644).unwrap();
        fs.create_dir_all("/src", 0o755).unwrap();
        fs.create_symlink("/shared/profile", "/src/dot_profile").unwrap();
        fs.create_symlink("/nowhere", "/src/dot_dangling").unwrap();
        let (state, _) = state_over(fs);

        assert!(matches!(state.get(".profile"), Some(Entry::File(_))));
        assert!(state.get(".dangling").is_none());
    }

    #[test]
    fn execute_template_uses_state_data() {
        let state = TargetState::new("/t", 0o022, "/s", json!({"host": "box"}), TemplateFuncs::new());
        assert_eq!(state.execute_template("t", b"on {{ .host }}").unwrap(), b"on box");
    }
}
