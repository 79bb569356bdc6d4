//! Async filesystem layer shared by every pipeline stage.
//!
//! All output writes go through here so directory creation, error mapping
//! and retries behave the same for every asset class.

use crate::error::{BuildError, BuildResult};
use std::{future::Future, io::ErrorKind, path::Path, pin::Pin};
use tokio::fs;

/// Boxed future returned by the external collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// Output Writer
// ============================================================================

/// Create the parent directory of `dest` (and all missing ancestors).
///
/// Another writer creating the same directory in between is not an error.
async fn ensure_parent(dest: &Path) -> BuildResult<()> {
    let Some(parent) = dest.parent() else {
        return Ok(());
    };
    if fs::try_exists(parent).await.unwrap_or(false) {
        return Ok(());
    }
    match fs::create_dir_all(parent).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists && parent.is_dir() => Ok(()),
        Err(err) => Err(BuildError::io(parent, err)),
    }
}

/// Write `content` to `dest`, creating parent directories as needed.
/// Existing files are overwritten.
pub async fn write_output(dest: &Path, content: impl AsRef<[u8]>) -> BuildResult<()> {
    ensure_parent(dest).await?;
    fs::write(dest, content)
        .await
        .map_err(|err| BuildError::io(dest, err))
}

/// Copy `source` to `dest` byte-for-byte, creating parent directories as needed.
///
/// A failure is reported against `source` when it has gone missing, and
/// against `dest` otherwise.
pub async fn copy_output(source: &Path, dest: &Path) -> BuildResult<()> {
    ensure_parent(dest).await?;
    match fs::copy(source, dest).await {
        Ok(_) => Ok(()),
        Err(err) if fs::try_exists(source).await.unwrap_or(false) => Err(BuildError::io(dest, err)),
        Err(err) => Err(BuildError::io(source, err)),
    }
}

/// Remove one output file. Returns `false` when there was nothing to remove.
pub async fn remove_output_file(dest: &Path) -> BuildResult<bool> {
    match fs::remove_file(dest).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(BuildError::io(dest, err)),
    }
}

/// Recursively remove an output directory. Returns `false` when it did not exist.
pub async fn remove_output_dir(dest: &Path) -> BuildResult<bool> {
    match fs::remove_dir_all(dest).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(BuildError::io(dest, err)),
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Run `op`, retrying transient (IO) failures up to `retries` more times.
///
/// Retries are immediate: the caller already waited for the settle delay,
/// this only covers a lock that outlives it by a few scheduler ticks.
pub async fn retry<T, F, Fut>(retries: u32, mut op: F) -> BuildResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BuildResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < retries => {
                attempt += 1;
                tokio::task::yield_now().await;
            }
            result => return result,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io,
        sync::atomic::{AtomicU32, Ordering},
    };
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_output_creates_ancestors() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dist/css/deep/style.css");

        write_output(&dest, "body{}").await.unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "body{}");

        // overwrite unconditionally
        write_output(&dest, "a{}").await.unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "a{}");
    }

    #[tokio::test]
    async fn test_shared_ancestor_created_once() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("dist/img/a.txt");
        let b = dir.path().join("dist/img/b.txt");

        write_output(&a, "a").await.unwrap();
        write_output(&b, "b").await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("dist"))
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name(), "img");
    }

    #[tokio::test]
    async fn test_concurrent_writers_same_ancestor() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("dist/x/y/a.txt");
        let b = dir.path().join("dist/x/y/b.txt");

        let (ra, rb) = tokio::join!(write_output(&a, "a"), write_output(&b, "b"));
        ra.unwrap();
        rb.unwrap();
        assert!(a.is_file() && b.is_file());
    }

    #[tokio::test]
    async fn test_copy_output_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("logo.png");
        let bytes = [0x89, b'P', b'N', b'G', 0, 0xff, 0x10];
        std::fs::write(&source, bytes).unwrap();

        let dest = dir.path().join("dist/logo.png");
        copy_output(&source, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_copy_missing_source_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = copy_output(&dir.path().join("nope"), &dir.path().join("dist/nope"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, BuildError::Io { ref path, .. } if *path == dir.path().join("nope")));
    }

    #[tokio::test]
    async fn test_copy_failure_on_dest_names_dest() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("logo.png");
        std::fs::write(&source, "png").unwrap();
        // a directory squatting on the destination makes the write side fail
        let dest = dir.path().join("dist/logo.png");
        std::fs::create_dir_all(&dest).unwrap();

        let err = copy_output(&source, &dest).await.unwrap_err();
        assert!(matches!(err, BuildError::Io { ref path, .. } if *path == dest), "{err}");
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(!remove_output_file(&dir.path().join("gone.css")).await.unwrap());
        assert!(!remove_output_dir(&dir.path().join("gone")).await.unwrap());

        let nested = dir.path().join("images/icons/a.svg");
        write_output(&nested, "<svg/>").await.unwrap();
        assert!(remove_output_dir(&dir.path().join("images")).await.unwrap());
        assert!(!dir.path().join("images").exists());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry(3, || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(BuildError::io("locked.scss", io::Error::other("busy")))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_budget() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: BuildResult<()> = retry(2, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BuildError::io("locked.scss", io::Error::other("busy")))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_never_repeats_compile_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: BuildResult<()> = retry(5, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BuildError::compile(Path::new("bad.scss"), "syntax"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
