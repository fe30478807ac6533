//! Container access.
//!
//! Library files live inside OLE compound documents, but nothing in the
//! record formats depends on OLE itself. [`Container`] is the seam: the
//! reader and writer see named streams addressed by `/`-separated paths
//! and a way to list the children of a storage, and any compound-file
//! implementation (or a plain map, for tests and tools) can sit behind it.

use std::collections::BTreeMap;

use crate::ecad::types::error::{EcadError, Result};

/// Stream-level access to a compound container.
///
/// Paths are `/`-separated, relative to the container root; the empty path
/// names the root storage itself.
pub trait Container {
    /// Reads the full contents of a stream.
    ///
    /// # Errors
    /// [`EcadError::MissingStream`] if no stream exists at `path`.
    fn read_stream(&self, path: &str) -> Result<Vec<u8>>;

    /// Creates or replaces a stream.
    fn write_stream(&mut self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Lists the immediate children (storages and streams) of a storage.
    fn children(&self, storage_path: &str) -> Result<Vec<String>>;

    fn has_stream(&self, path: &str) -> bool;
}

/// An in-memory container backed by a sorted stream map.
///
/// Children are listed in lexicographic order, which keeps reads
/// deterministic when the section directory has to be recovered by
/// enumeration.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainer {
    streams: BTreeMap<String, Vec<u8>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct access to a stream's bytes, if present.
    pub fn stream(&self, path: &str) -> Option<&[u8]> {
        self.streams.get(path).map(Vec::as_slice)
    }

    /// All stream paths, in lexicographic order.
    pub fn stream_names(&self) -> Vec<String> {
        self.streams.keys().cloned().collect()
    }
}

impl Container for MemoryContainer {
    fn read_stream(&self, path: &str) -> Result<Vec<u8>> {
        self.streams
            .get(path)
            .cloned()
            .ok_or_else(|| EcadError::MissingStream(path.to_owned()))
    }

    fn write_stream(&mut self, path: &str, bytes: &[u8]) -> Result<()> {
        self.streams.insert(path.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn children(&self, storage_path: &str) -> Result<Vec<String>> {
        let prefix = if storage_path.is_empty() {
            String::new()
        } else {
            format!("{storage_path}/")
        };

        let mut names: Vec<String> = Vec::new();
        for key in self.streams.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let child = match rest.split_once('/') {
                Some((storage, _)) => storage,
                None => rest,
            };
            // Keys are sorted, so duplicates cluster together.
            if names.last().map(String::as_str) != Some(child) {
                names.push(child.to_owned());
            }
        }
        Ok(names)
    }

    fn has_stream(&self, path: &str) -> bool {
        self.streams.contains_key(path)
    }
}
