//! Opaque assets: anything that is not a stylesheet, markup or script.

use crate::{error::BuildResult, utils::fs::copy_output};
use std::path::Path;

/// Copy an opaque asset to its output location unchanged.
///
/// No freshness check: the watcher only calls this for files that changed,
/// and a full build starts from an empty output tree.
pub async fn copy_asset(source: &Path, dest: &Path) -> BuildResult<()> {
    copy_output(source, dest).await
}
