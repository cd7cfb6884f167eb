//! Source name decoding
//!
//! A source file name encodes the target name together with the entry's
//! type and permissions, as a sequence of prefixes and an optional suffix:
//! `private_executable_dot_script.tmpl` is the private, executable,
//! templated target `.script`.

pub const DOT_PREFIX: &str = "dot_";
pub const EMPTY_PREFIX: &str = "empty_";
pub const EXECUTABLE_PREFIX: &str = "executable_";
pub const ONCE_PREFIX: &str = "once_";
pub const ONCHANGE_PREFIX: &str = "onchange_";
pub const PRIVATE_PREFIX: &str = "private_";
pub const RUN_PREFIX: &str = "run_";
pub const SYMLINK_PREFIX: &str = "symlink_";
pub const TEMPLATE_SUFFIX: &str = ".tmpl";

/// Default permissions before the umask is applied.
const FILE_PERM: u32 = 0o666;
const DIR_PERM: u32 = 0o777;

/// When a script runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPolicy {
    /// On every apply.
    Always,
    /// Until it has succeeded once.
    Once,
    /// Whenever its content differs from the content of its last successful
    /// run.
    OnChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Symlink,
    Script(RunPolicy),
}

/// Attributes decoded from a source file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttrs {
    pub name: String,
    pub file_type: FileType,
    pub private: bool,
    pub empty: bool,
    pub executable: bool,
    pub template: bool,
}

impl FileAttrs {
    pub fn parse(source_name: &str) -> Self {
        let mut name = source_name;
        let mut attrs = Self {
            name: String::new(),
            file_type: FileType::Regular,
            private: false,
            empty: false,
            executable: false,
            template: false,
        };

        if let Some(rest) = name.strip_prefix(SYMLINK_PREFIX) {
            attrs.file_type = FileType::Symlink;
            name = rest;
        } else if let Some(rest) = name.strip_prefix(RUN_PREFIX) {
            let (policy, rest) = if let Some(rest) = rest.strip_prefix(ONCE_PREFIX) {
                (RunPolicy::Once, rest)
            } else if let Some(rest) = rest.strip_prefix(ONCHANGE_PREFIX) {
                (RunPolicy::OnChange, rest)
            } else {
                (RunPolicy::Always, rest)
            };
            attrs.file_type = FileType::Script(policy);
            name = rest;
        } else {
            if let Some(rest) = name.strip_prefix(PRIVATE_PREFIX) {
                attrs.private = true;
                name = rest;
            }
            if let Some(rest) = name.strip_prefix(EMPTY_PREFIX) {
                attrs.empty = true;
                name = rest;
            }
            if let Some(rest) = name.strip_prefix(EXECUTABLE_PREFIX) {
                attrs.executable = true;
                name = rest;
            }
        }

        if let Some(rest) = name.strip_suffix(TEMPLATE_SUFFIX) {
            attrs.template = true;
            name = rest;
        }
        attrs.name = decode_dot(name);
        attrs
    }

    /// Permission bits of the target file.
    ///
    /// Private files keep their owner bits regardless of `umask`.
    pub fn perm(&self, umask: u32) -> u32 {
        let mut perm = FILE_PERM;
        if self.executable {
            perm |= 0o111;
        }
        if self.private {
            perm & 0o700
        } else {
            perm & !umask & 0o777
        }
    }
}

/// Attributes decoded from a source directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirAttrs {
    pub name: String,
    pub private: bool,
}

impl DirAttrs {
    pub fn parse(source_name: &str) -> Self {
        let (private, name) = match source_name.strip_prefix(PRIVATE_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, source_name),
        };
        Self {
            name: decode_dot(name),
            private,
        }
    }

    pub fn perm(&self, umask: u32) -> u32 {
        if self.private {
            DIR_PERM & 0o700
        } else {
            DIR_PERM & !umask & 0o777
        }
    }
}

fn decode_dot(name: &str) -> String {
    match name.strip_prefix(DOT_PREFIX) {
        Some(rest) => format!(".{rest}"),
        None => name.to_string(),
    }
}
