// src/fs/mock.rs

use super::{FileMeta, FileSystem};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(FileMeta),
    Dir(Vec<String>), // List of child names
}

/// In-memory filesystem. Files carry only a size and an mtime.
///
/// Clones share the same tree, so a test can keep a handle while the code
/// under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<BTreeMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<PathBuf, MockEntry>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create an empty directory (and its ancestors).
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut files = self.entries();
        ensure_dir_entry(&mut files, path.as_ref());
    }

    /// Create a file of `len` bytes modified now.
    pub fn add_file(&self, path: impl AsRef<Path>, len: u64) {
        self.add_file_with_mtime(path, len, SystemTime::now());
    }

    pub fn add_file_with_mtime(&self, path: impl AsRef<Path>, len: u64, modified: SystemTime) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.entries();
        files.insert(path.clone(), MockEntry::File(FileMeta { len, modified }));

        if let Some(parent) = path.parent() {
            ensure_dir_entry(&mut files, parent);
            link_child(&mut files, parent, &path);
        }
    }

    /// Move a file into `dest_dir`, keeping its name and metadata.
    pub fn move_file(&self, from: &Path, dest_dir: &Path) -> Result<PathBuf> {
        let name = from
            .file_name()
            .ok_or_else(|| anyhow!("no file name: {:?}", from))?;
        let meta = match self.entries().get(from) {
            Some(MockEntry::File(meta)) => *meta,
            _ => return Err(anyhow!("File not found: {:?}", from)),
        };
        self.remove_file(from)?;
        let dest = dest_dir.join(name);
        self.add_file_with_mtime(&dest, meta.len, meta.modified);
        Ok(dest)
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.entries().contains_key(path.as_ref())
    }

    /// All file paths directly inside `dir`.
    pub fn files_in(&self, dir: impl AsRef<Path>) -> Vec<PathBuf> {
        let dir = dir.as_ref();
        match self.entries().get(dir) {
            Some(MockEntry::Dir(children)) => children.iter().map(|name| dir.join(name)).collect(),
            _ => Vec::new(),
        }
    }
}

fn ensure_dir_entry(files: &mut BTreeMap<PathBuf, MockEntry>, path: &Path) {
    if path.as_os_str().is_empty() || files.contains_key(path) {
        return;
    }
    files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
    if let Some(parent) = path.parent() {
        ensure_dir_entry(files, parent);
        link_child(files, parent, path);
    }
}

fn link_child(files: &mut BTreeMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
    if let (Some(MockEntry::Dir(children)), Some(name)) =
        (files.get_mut(parent), child.file_name().and_then(|n| n.to_str()))
    {
        if !children.iter().any(|c| c == name) {
            children.push(name.to_string());
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.entries();
        match files.get(path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.entries().get(path), Some(MockEntry::File(_)))
    }

    fn metadata(&self, path: &Path) -> Result<FileMeta> {
        match self.entries().get(path) {
            Some(MockEntry::File(meta)) => Ok(*meta),
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut files = self.entries();
        match files.get(path) {
            Some(MockEntry::File(_)) => {}
            Some(MockEntry::Dir(_)) => return Err(anyhow!("Is a directory: {:?}", path)),
            None => return Err(anyhow!("File not found: {:?}", path)),
        }
        files.remove(path);

        if let (Some(parent), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str())) {
            if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
                children.retain(|c| c != name);
            }
        }
        Ok(())
    }
}
