//! An in-memory filesystem
//!
//! Nothing outside the process can observe a `MemFs`, so it reports itself
//! as not live and backends may use simpler non-atomic strategies on it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use glob::{MatchOptions, Pattern};

use crate::vfs::{DirEntry, FileKind, Metadata, Vfs, WriteHandle};
use crate::{Error, NormalizedPath, Result};

const MEM_DEV: u64 = 1;
const MAX_SYMLINK_HOPS: usize = 40;
const DEFAULT_DIR_PERM: u32 = 0o755;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    File { data: Vec<u8>, perm: u32 },
    Dir { perm: u32 },
    Symlink { target: String },
}

impl Node {
    fn metadata(&self) -> Metadata {
        match self {
            Node::File { data, perm } => {
                Metadata::new(FileKind::File, *perm, MEM_DEV, data.len() as u64)
            }
            Node::Dir { perm } => Metadata::new(FileKind::Dir, *perm, MEM_DEV, 0),
            Node::Symlink { target } => {
                Metadata::new(FileKind::Symlink, 0o777, MEM_DEV, target.len() as u64)
            }
        }
    }
}

/// A [`Vfs`] held entirely in memory.
#[derive(Debug)]
pub struct MemFs {
    nodes: RefCell<BTreeMap<NormalizedPath, Node>>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// An empty filesystem containing only `/`.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            NormalizedPath::root(),
            Node::Dir {
                perm: DEFAULT_DIR_PERM,
            },
        );
        Self {
            nodes: RefCell::new(nodes),
        }
    }

    /// Create a directory and any missing parents.
    pub fn create_dir_all(&self, path: impl Into<NormalizedPath>, perm: u32) -> Result<()> {
        let path = path.into();
        let mut nodes = self.nodes.borrow_mut();
        let mut current = NormalizedPath::root();
        for component in path.components() {
            current = current.join(component);
            match nodes.get(&current) {
                Some(Node::Dir { .. }) => {}
                Some(_) => return Err(not_a_directory(&current)),
                None => {
                    nodes.insert(current.clone(), Node::Dir { perm });
                }
            }
        }
        Ok(())
    }

    /// Create a file with `data`, creating missing parents with mode 0755.
    pub fn create_file(
        &self,
        path: impl Into<NormalizedPath>,
        data: impl AsRef<[u8]>,
        perm: u32,
    ) -> Result<()> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent, DEFAULT_DIR_PERM)?;
        }
        self.nodes.borrow_mut().insert(
            path,
            Node::File {
                data: data.as_ref().to_vec(),
                perm,
            },
        );
        Ok(())
    }

    /// Create a symlink, creating missing parents with mode 0755.
    pub fn create_symlink(&self, target: &str, path: impl Into<NormalizedPath>) -> Result<()> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent, DEFAULT_DIR_PERM)?;
        }
        self.nodes.borrow_mut().insert(
            path,
            Node::Symlink {
                target: target.to_string(),
            },
        );
        Ok(())
    }

    /// Every path in the filesystem, sorted.
    pub fn paths(&self) -> Vec<NormalizedPath> {
        self.nodes.borrow().keys().cloned().collect()
    }

    /// Follow symlinks in the final component.
    fn resolve(&self, path: &NormalizedPath) -> Result<NormalizedPath> {
        let nodes = self.nodes.borrow();
        let mut current = path.clone();
        for _ in 0..MAX_SYMLINK_HOPS {
            match nodes.get(&current) {
                Some(Node::Symlink { target }) => {
                    current = if target.starts_with('/') {
                        NormalizedPath::new(target)
                    } else {
                        current
                            .parent()
                            .unwrap_or_else(NormalizedPath::root)
                            .join(target)
                    };
                }
                _ => return Ok(current),
            }
        }
        Err(Error::kind(
            path.to_native(),
            ErrorKind::Other,
            "too many levels of symbolic links",
        ))
    }

    fn check_parent(nodes: &BTreeMap<NormalizedPath, Node>, path: &NormalizedPath) -> Result<()> {
        let parent = path.parent().unwrap_or_else(NormalizedPath::root);
        match nodes.get(&parent) {
            Some(Node::Dir { .. }) => Ok(()),
            Some(_) => Err(not_a_directory(&parent)),
            None => Err(not_found(&parent)),
        }
    }

    fn descendants(
        nodes: &BTreeMap<NormalizedPath, Node>,
        path: &NormalizedPath,
    ) -> Vec<NormalizedPath> {
        nodes
            .keys()
            .filter(|key| matches!(key.strip_prefix(path), Some(rest) if !rest.is_empty()))
            .cloned()
            .collect()
    }
}

fn not_found(path: &NormalizedPath) -> Error {
    Error::kind(path.to_native(), ErrorKind::NotFound, "no such file or directory")
}

fn not_a_directory(path: &NormalizedPath) -> Error {
    Error::kind(path.to_native(), ErrorKind::NotADirectory, "not a directory")
}

fn is_a_directory(path: &NormalizedPath) -> Error {
    Error::kind(path.to_native(), ErrorKind::IsADirectory, "is a directory")
}

fn already_exists(path: &NormalizedPath) -> Error {
    Error::kind(path.to_native(), ErrorKind::AlreadyExists, "file exists")
}

struct MemWriteHandle<'a> {
    fs: &'a MemFs,
    path: NormalizedPath,
}

impl WriteHandle for MemWriteHandle<'_> {
    fn chmod(&mut self, perm: u32) -> Result<()> {
        match self.fs.nodes.borrow_mut().get_mut(&self.path) {
            Some(Node::File { perm: current, .. }) => {
                *current = perm & 0o7777;
                Ok(())
            }
            _ => Err(not_found(&self.path)),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        match self.fs.nodes.borrow_mut().get_mut(&self.path) {
            Some(Node::File { data, .. }) => {
                data.extend_from_slice(bytes);
                Ok(())
            }
            _ => Err(not_found(&self.path)),
        }
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl Vfs for MemFs {
    fn is_live(&self) -> bool {
        false
    }

    fn native_path(&self, _path: &NormalizedPath) -> Option<PathBuf> {
        None
    }

    fn stat(&self, path: &NormalizedPath) -> Result<Metadata> {
        let resolved = self.resolve(path)?;
        self.nodes
            .borrow()
            .get(&resolved)
            .map(Node::metadata)
            .ok_or_else(|| not_found(path))
    }

    fn lstat(&self, path: &NormalizedPath) -> Result<Metadata> {
        self.nodes
            .borrow()
            .get(path)
            .map(Node::metadata)
            .ok_or_else(|| not_found(path))
    }

    fn read_dir(&self, path: &NormalizedPath) -> Result<Vec<DirEntry>> {
        let resolved = self.resolve(path)?;
        let nodes = self.nodes.borrow();
        match nodes.get(&resolved) {
            Some(Node::Dir { .. }) => {}
            Some(_) => return Err(not_a_directory(path)),
            None => return Err(not_found(path)),
        }
        let entries = nodes
            .iter()
            .filter(|(key, _)| key.parent().as_ref() == Some(&resolved))
            .filter_map(|(key, node)| {
                Some(DirEntry {
                    name: key.file_name()?.to_string(),
                    metadata: node.metadata(),
                })
            })
            .collect();
        Ok(entries)
    }

    fn read_file(&self, path: &NormalizedPath) -> Result<Vec<u8>> {
        let resolved = self.resolve(path)?;
        match self.nodes.borrow().get(&resolved) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(_) => Err(is_a_directory(path)),
            None => Err(not_found(path)),
        }
    }

    fn read_link(&self, path: &NormalizedPath) -> Result<String> {
        match self.nodes.borrow().get(path) {
            Some(Node::Symlink { target }) => Ok(target.clone()),
            Some(_) => Err(Error::kind(
                path.to_native(),
                ErrorKind::InvalidInput,
                "not a symbolic link",
            )),
            None => Err(not_found(path)),
        }
    }

    fn create_truncate(
        &self,
        path: &NormalizedPath,
        perm: u32,
    ) -> Result<Box<dyn WriteHandle + '_>> {
        let resolved = self.resolve(path)?;
        {
            let mut nodes = self.nodes.borrow_mut();
            match nodes.get_mut(&resolved) {
                Some(Node::File { data, .. }) => data.clear(),
                Some(_) => return Err(is_a_directory(path)),
                None => {
                    Self::check_parent(&nodes, &resolved)?;
                    nodes.insert(
                        resolved.clone(),
                        Node::File {
                            data: Vec::new(),
                            perm: perm & 0o7777,
                        },
                    );
                }
            }
        }
        Ok(Box::new(MemWriteHandle {
            fs: self,
            path: resolved,
        }))
    }

    fn mkdir(&self, path: &NormalizedPath, perm: u32) -> Result<()> {
        let mut nodes = self.nodes.borrow_mut();
        if nodes.contains_key(path) {
            return Err(already_exists(path));
        }
        Self::check_parent(&nodes, path)?;
        nodes.insert(path.clone(), Node::Dir { perm: perm & 0o7777 });
        Ok(())
    }

    fn chmod(&self, path: &NormalizedPath, perm: u32) -> Result<()> {
        let resolved = self.resolve(path)?;
        match self.nodes.borrow_mut().get_mut(&resolved) {
            Some(Node::File { perm: current, .. }) | Some(Node::Dir { perm: current }) => {
                *current = perm & 0o7777;
                Ok(())
            }
            _ => Err(not_found(path)),
        }
    }

    fn symlink(&self, old: &str, new: &NormalizedPath) -> Result<()> {
        let mut nodes = self.nodes.borrow_mut();
        if nodes.contains_key(new) {
            return Err(already_exists(new));
        }
        Self::check_parent(&nodes, new)?;
        nodes.insert(
            new.clone(),
            Node::Symlink {
                target: old.to_string(),
            },
        );
        Ok(())
    }

    fn rename(&self, old: &NormalizedPath, new: &NormalizedPath) -> Result<()> {
        let mut nodes = self.nodes.borrow_mut();
        if !nodes.contains_key(old) {
            return Err(not_found(old));
        }
        Self::check_parent(&nodes, new)?;
        if matches!(nodes.get(new), Some(Node::Dir { .. }))
            && !Self::descendants(&nodes, new).is_empty()
        {
            return Err(Error::kind(
                new.to_native(),
                ErrorKind::DirectoryNotEmpty,
                "directory not empty",
            ));
        }

        let moved: Vec<NormalizedPath> = std::iter::once(old.clone())
            .chain(Self::descendants(&nodes, old))
            .collect();
        let mut relocated = Vec::with_capacity(moved.len());
        for key in moved {
            if let Some(node) = nodes.remove(&key) {
                let suffix = key.strip_prefix(old).unwrap_or_default().to_string();
                relocated.push((new.join(&suffix), node));
            }
        }
        nodes.remove(new);
        nodes.extend(relocated);
        Ok(())
    }

    fn remove_all(&self, path: &NormalizedPath) -> Result<()> {
        if path.is_root() {
            return Err(Error::kind(
                path.to_native(),
                ErrorKind::PermissionDenied,
                "refusing to remove root",
            ));
        }
        let mut nodes = self.nodes.borrow_mut();
        for key in Self::descendants(&nodes, path) {
            nodes.remove(&key);
        }
        nodes.remove(path);
        Ok(())
    }

    fn glob(&self, pattern: &str) -> Result<Vec<NormalizedPath>> {
        let compiled = Pattern::new(pattern).map_err(|e| Error::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        Ok(self
            .nodes
            .borrow()
            .keys()
            .filter(|key| compiled.matches_with(key.as_str(), options))
            .cloned()
            .collect())
    }
}
