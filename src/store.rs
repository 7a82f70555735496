use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Destination for imported notes and attachments.
///
/// Paths are slash-delimited and relative to the store's root.
pub trait OutputStore {
    fn folder_exists(&self, path: &str) -> bool;
    /// Create `path` and any missing parents. Existing folders are left alone.
    fn create_folder(&mut self, path: &str) -> io::Result<()>;
    fn write_text(&mut self, path: &str, text: &str) -> io::Result<()>;
    fn write_binary(&mut self, path: &str, data: &[u8]) -> io::Result<()>;
}

/// Store writing into a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }
}

impl OutputStore for FsStore {
    fn folder_exists(&self, path: &str) -> bool {
        self.resolve(path).is_dir()
    }

    fn create_folder(&mut self, path: &str) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path))
    }

    fn write_text(&mut self, path: &str, text: &str) -> io::Result<()> {
        fs::write(self.resolve(path), text)
    }

    fn write_binary(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        fs::write(self.resolve(path), data)
    }
}
