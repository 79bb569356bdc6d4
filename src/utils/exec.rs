//! External command execution.
//!
//! Runs compiler tools (`sass`, `postcss`, `babel`, ...) as child processes
//! on the async runtime, feeding optional stdin and capturing stdout.

use crate::log;
use regex::Regex;
use std::{
    ffi::OsStr,
    io,
    path::Path,
    process::{Output, Stdio},
    sync::LazyLock,
};
use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command};

/// Why a command did not produce usable output.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("empty command")]
    Empty,

    #[error("failed to run `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Failed(String),
}

// ============================================================================
// Command Execution
// ============================================================================

/// Run `cmd` followed by `args`, optionally piping `input` into stdin.
///
/// Returns stdout on success. Stderr from a successful run is logged as
/// warnings, filtered through `filter`.
pub async fn exec(
    cmd: &[String],
    args: &[&OsStr],
    input: Option<&[u8]>,
    filter: &'static FilterRule,
) -> Result<String, ExecError> {
    let (name, program_args) = cmd.split_first().ok_or(ExecError::Empty)?;

    let mut command = Command::new(name);
    command
        .args(program_args)
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let spawn_err = |source| ExecError::Spawn {
        name: name.clone(),
        source,
    };

    let mut child = command.spawn().map_err(spawn_err)?;

    // Feed stdin while collecting output, so a large input cannot deadlock
    // against a full stdout pipe.
    let stdin = child.stdin.take();
    let feed = async move {
        if let (Some(mut stdin), Some(input)) = (stdin, input) {
            stdin.write_all(input).await?;
            stdin.shutdown().await?;
        }
        Ok::<_, io::Error>(())
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output.map_err(spawn_err)?;

    if !output.status.success() {
        return Err(ExecError::Failed(format_error(name, &output, filter)));
    }
    fed.map_err(spawn_err)?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    filter.log(name, stderr.trim());

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Open a directory in the platform file browser without waiting for it.
pub fn open_in_file_browser(path: &Path) -> io::Result<()> {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(windows) {
        "explorer"
    } else {
        "xdg-open"
    };

    which::which(opener).map_err(|err| io::Error::new(io::ErrorKind::NotFound, err))?;
    std::process::Command::new(opener)
        .arg(path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

// ============================================================================
// Output Filtering
// ============================================================================

fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    RE.replace_all(s, "")
}

/// Filter rule for skipping known noise in command output.
pub struct FilterRule {
    /// Prefixes to match at the start of output lines.
    pub skip_prefixes: &'static [&'static str],
}

impl FilterRule {
    pub const fn new(skip_prefixes: &'static [&'static str]) -> Self {
        Self { skip_prefixes }
    }

    fn should_skip(&self, line: &str) -> bool {
        line.is_empty() || self.skip_prefixes.iter().any(|p| line.starts_with(p))
    }

    /// Lines of `output` that survive the filter, ANSI codes removed.
    fn keep(&self, output: &str) -> Vec<String> {
        output
            .lines()
            .map(|line| strip_ansi(line).trim().to_owned())
            .filter(|line| !self.should_skip(line))
            .collect()
    }

    fn log(&self, name: &str, output: &str) {
        let lines = self.keep(output);
        if !lines.is_empty() {
            log!(name; "{}", lines.join("\n"));
        }
    }
}

/// Empty filter (no skipping).
pub const EMPTY_FILTER: FilterRule = FilterRule::new(&[]);

/// Sass deprecation chatter is not actionable per file.
pub const SASS_FILTER: FilterRule = FilterRule::new(&["DEPRECATION WARNING", "More info"]);

/// Format a failed command's exit status and diagnostics.
fn format_error(name: &str, output: &Output, filter: &'static FilterRule) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut msg = format!("`{name}` exited with {}", output.status);

    let detail = filter.keep(&stderr);
    if !detail.is_empty() {
        msg.push('\n');
        msg.push_str(&detail.join("\n"));
    }
    msg
}

// ============================================================================
// Tests
// ============================================================================
