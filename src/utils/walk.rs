//! Recursive directory walker.
//!
//! Depth-first: a subdirectory is fully visited before its next sibling.
//! Siblings are visited in file-name order so builds are reproducible.

use crate::error::{BuildError, BuildResult};
use std::{
    io,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Visit every non-directory entry below `dir` exactly once.
///
/// The first entry that cannot be listed or stat'ed aborts the walk.
pub fn walk(dir: &Path, mut visit: impl FnMut(&Path)) -> BuildResult<()> {
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(dir).to_path_buf();
            let source = err
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
            BuildError::io(path, source)
        })?;

        if !entry.file_type().is_dir() {
            visit(entry.path());
        }
    }
    Ok(())
}

/// Collect every file below `dir` on a blocking thread.
pub async fn collect_files(dir: &Path) -> BuildResult<Vec<PathBuf>> {
    let dir = dir.to_path_buf();
    let root = dir.clone();
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        walk(&dir, |path| files.push(path.to_path_buf()))?;
        Ok(files)
    })
    .await
    .map_err(|err| BuildError::io(root, io::Error::other(err)))?
}
