//! Pipeline error types.
//!
//! Configuration problems live in [`crate::config::ConfigError`]; this enum
//! covers everything that can go wrong while building or watching.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the walker, writer, compilers and watcher.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Filesystem read/write/stat/mkdir/unlink failure.
    #[error("IO error at `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external collaborator rejected one source file.
    #[error("failed to compile `{}`\n{message}", path.display())]
    Compile { path: PathBuf, message: String },

    /// The source tree could not be watched.
    #[error("failed to watch `{}`: {source}", path.display())]
    WatchSetup {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("`{}` is not inside the source directory", .0.display())]
    PathOutsideSource(PathBuf),

    /// Two compilable sources map onto the same output file.
    #[error("`{}` and `{}` both write `{}`", first.display(), second.display(), dest.display())]
    OutputCollision {
        dest: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn compile(path: &Path, message: impl Into<String>) -> Self {
        Self::Compile {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Only IO failures are worth an immediate retry; a compile error is a
    /// defect in the source and will fail the same way again.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

pub type BuildResult<T> = Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_build_error_display() {
        let err = BuildError::io(
            "dist/style.css",
            Error::new(ErrorKind::PermissionDenied, "Permission denied (os error 13)"),
        );
        let display = format!("{err}");
        assert!(display.contains("dist/style.css"));
        assert!(display.contains("Permission denied (os error 13)"));

        let err = BuildError::compile(Path::new("src/app.js"), "Unexpected token (3:4)");
        let display = format!("{err}");
        assert!(display.contains("src/app.js"));
        assert!(display.contains("Unexpected token (3:4)"));
    }

    #[test]
    fn test_watch_setup_display_names_cause() {
        let err = BuildError::WatchSetup {
            path: "src".into(),
            source: notify::Error::path_not_found(),
        };
        let display = format!("{err}");
        assert!(display.contains("`src`"));
        assert!(display.contains(&notify::Error::path_not_found().to_string()));
    }

    #[test]
    fn test_only_io_is_transient() {
        let io = BuildError::io("a", Error::new(ErrorKind::PermissionDenied, "locked"));
        let compile = BuildError::compile(Path::new("a.scss"), "bad");
        assert!(io.is_transient());
        assert!(!compile.is_transient());
        assert!(!BuildError::PathOutsideSource("x".into()).is_transient());
    }
}
