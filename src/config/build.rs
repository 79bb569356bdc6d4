//! `[build]` section configuration.
//!
//! Contains source/output paths and the external compiler commands.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Enums
// ============================================================================

/// When to run stylesheet output through the autoprefixer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Autoprefix {
    /// On in production, off in development (default).
    #[default]
    Auto,
    /// Always autoprefix.
    On,
    /// Never autoprefix.
    Off,
}

// ============================================================================
// Main BuildConfig
// ============================================================================

/// `[build]` section in kiln.toml - build pipeline configuration.
///
/// # Example
/// ```toml
/// [build]
/// source = "src"           # Source directory
/// output = "dist"          # Output directory (wiped on every full build)
/// include_dir = "include"  # shtml fragments pulled in by other pages
///
/// [build.stylesheet]
/// command = ["sass", "--no-source-map"]
/// autoprefix = "auto"
///
/// [build.script]
/// command = ["babel"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Source tree root.
    #[serde(default = "defaults::build::source")]
    #[educe(Default = defaults::build::source())]
    pub source: PathBuf,

    /// Output tree root.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Directory name marking shtml files as include-only.
    #[serde(default = "defaults::build::include_dir")]
    #[educe(Default = defaults::build::include_dir())]
    pub include_dir: String,

    /// Open the output directory in the file browser after a production build.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub open: bool,

    #[serde(default)]
    pub stylesheet: StylesheetConfig,

    #[serde(default)]
    pub script: ScriptConfig,
}

// ============================================================================
// Sub-configurations
// ============================================================================

/// `[build.stylesheet]` - scss compiler and autoprefixer commands.
///
/// The compiler is called as `<command...> <file>` and must print CSS to
/// stdout. The autoprefixer reads CSS on stdin and prints CSS to stdout.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct StylesheetConfig {
    #[serde(default = "defaults::build::stylesheet::command")]
    #[educe(Default = defaults::build::stylesheet::command())]
    pub command: Vec<String>,

    #[serde(default)]
    pub autoprefix: Autoprefix,

    #[serde(default = "defaults::build::stylesheet::autoprefix_command")]
    #[educe(Default = defaults::build::stylesheet::autoprefix_command())]
    pub autoprefix_command: Vec<String>,
}

/// `[build.script]` - script transform command, called as `<command...> <file>`.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptConfig {
    #[serde(default = "defaults::build::script::command")]
    #[educe(Default = defaults::build::script::command())]
    pub command: Vec<String>,
}
