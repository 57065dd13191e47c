//! Inverted index from input file to dependent entry points.
//!
//! Only node-like entry points are indexed; go-like ones rebuild on the
//! coarse `.go` suffix rule. A file maps to each entry point that
//! currently lists it in `input_files`, once per entry point. The file
//! key is dropped as soon as its list becomes empty.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use super::EntryPointKey;

#[derive(Debug, Default)]
pub(crate) struct FileIndex {
    map: FxHashMap<PathBuf, Vec<EntryPointKey>>,
}

impl FileIndex {
    /// Register `key` as depending on `file`.
    pub fn add(&mut self, file: PathBuf, key: &EntryPointKey) {
        let keys = self.map.entry(file).or_default();
        if !keys.contains(key) {
            keys.push(key.clone());
        }
    }

    /// Drop the dependency of `key` on `file`, removing the file key
    /// entirely when no entry point references it anymore.
    pub fn remove(&mut self, file: &Path, key: &EntryPointKey) {
        if let Some(keys) = self.map.get_mut(file) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                self.map.remove(file);
            }
        }
    }

    /// Entry points depending on `file`, in registration order.
    pub fn lookup(&self, file: &Path) -> &[EntryPointKey] {
        self.map.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any entry point still references `file`.
    pub fn contains_file(&self, file: &Path) -> bool {
        self.map.contains_key(file)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}
