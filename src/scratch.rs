use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Empties the scratch root left over from a previous run.
pub fn prepare_root(root: &Path) -> io::Result<()> {
    if root.exists() {
        std::fs::remove_dir_all(root)?;
    }
    std::fs::create_dir_all(root)
}

/// Per-cycle working directory for downloaded documents.
/// Removed when dropped, whichever way the cycle ends.
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    pub fn create_in(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix("cycle-").tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Fresh subdirectory for one post-part, so equal document titles
    /// from different parts never share a path.
    pub fn part_dir(&self, name: &str) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }
}
