//! Site configuration management for `kiln.toml`.
//!
//! # Sections
//!
//! | Section     | Purpose                                          |
//! |-------------|--------------------------------------------------|
//! | `[build]`   | Source/output roots, compiler commands           |
//! | `[serve]`   | Development server (interface, port)             |
//! | `[watch]`   | Settle delay and retry budget for change events  |
//!
//! The file is optional; every field has a default. After loading, all paths
//! are absolute and the value is shared read-only (`Arc<SiteConfig>`).
//!
//! # Example
//!
//! ```toml
//! [build]
//! source = "src"
//! output = "dist"
//!
//! [build.stylesheet]
//! autoprefix = "on"
//!
//! [serve]
//! port = 3000
//! ```

mod build;
pub mod defaults;
mod error;
mod serve;

pub use build::Autoprefix;
pub use error::ConfigError;

use build::BuildConfig;
use serve::{ServeConfig, WatchConfig};

use crate::{
    cli::{Cli, Mode},
    compiler::path::normalize,
    log,
};
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing kiln.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Run mode, from the CLI / environment
    #[serde(skip)]
    pub mode: Mode,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// Watch reconciliation settings
    #[serde(default)]
    pub watch: WatchConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load from the CLI: read the config file if present, apply CLI values,
    /// resolve paths and validate.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?
        } else {
            Self::default()
        };

        config.mode = cli.mode;
        config.resolve_paths(root, &cli.config);
        config.validate()?;
        Ok(config)
    }

    /// Whether stylesheet output goes through the autoprefixer.
    pub const fn autoprefix(&self) -> bool {
        match self.build.stylesheet.autoprefix {
            Autoprefix::On => true,
            Autoprefix::Off => false,
            Autoprefix::Auto => matches!(self.mode, Mode::Production),
        }
    }

    /// Source root (absolute after loading)
    pub fn source(&self) -> &Path {
        &self.build.source
    }

    /// Output root (absolute after loading)
    pub fn output(&self) -> &Path {
        &self.build.output
    }

    /// Make every path absolute relative to the project root.
    fn resolve_paths(&mut self, root: &Path, config_file: &Path) {
        let root = Self::normalize_path(root);
        self.config_path = Self::normalize_path(&root.join(config_file));
        self.build.source = Self::normalize_path(&root.join(&self.build.source));
        self.build.output = Self::normalize_path(&root.join(&self.build.output));
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            };
            let absolute = normalize(&absolute);
            Self::canonicalize_existing(&absolute).unwrap_or(absolute)
        })
    }

    /// Canonicalize the deepest existing ancestor of `path` and re-append the
    /// missing tail, so a not-yet-created output compares like the source.
    fn canonicalize_existing(path: &Path) -> Option<PathBuf> {
        let mut tail = Vec::new();
        let mut existing = path;
        loop {
            if let Ok(real) = existing.canonicalize() {
                return Some(tail.iter().rev().fold(real, |acc, part| acc.join(part)));
            }
            tail.push(existing.file_name()?);
            existing = existing.parent()?;
        }
    }

    /// Validate configuration after path resolution
    pub fn validate(&self) -> Result<()> {
        let source = self.source();

        if !source.is_dir() {
            bail!(ConfigError::Validation(format!(
                "[build.source] `{}` is not a directory",
                source.display()
            )));
        }

        // Wiping the output tree must never touch the sources
        let (roots_source, roots_output) = (normalize(source), normalize(self.output()));
        if roots_source.starts_with(&roots_output) || roots_output.starts_with(&roots_source) {
            bail!(ConfigError::Validation(
                "[build.source] and [build.output] must not contain each other".into()
            ));
        }

        if self.build.include_dir.is_empty() || self.build.include_dir.contains(['/', '\\']) {
            bail!(ConfigError::Validation(
                "[build.include_dir] must be a single directory name".into()
            ));
        }

        Self::check_command("[build.stylesheet.command]", &self.build.stylesheet.command)?;
        Self::check_command("[build.script.command]", &self.build.script.command)?;
        if self.autoprefix() {
            Self::check_command(
                "[build.stylesheet.autoprefix_command]",
                &self.build.stylesheet.autoprefix_command,
            )?;
        }

        Ok(())
    }

    /// Check a command is non-empty, and warn if it is not on `PATH`.
    ///
    /// A missing tool is only fatal once a file actually needs it.
    fn check_command(field: &str, command: &[String]) -> Result<()> {
        let Some(cmd) = command.first() else {
            bail!(ConfigError::Validation(format!(
                "{field} must have at least one element"
            )));
        };

        if which::which(cmd).is_err() {
            log!("config"; "`{cmd}` from {field} not found in PATH");
        }

        Ok(())
    }

    /// Config rooted at two existing directories, for tests.
    #[cfg(test)]
    pub fn for_roots(source: &Path, output: &Path, mode: Mode) -> Self {
        let mut config = Self::default();
        config.mode = mode;
        config.build.source = source.to_path_buf();
        config.build.output = output.to_path_buf();
        config.watch.settle_ms = 0;
        config
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_from_str_invalid_toml() {
        let result = SiteConfig::from_str("[build\nsource = 1");
        assert!(result.is_err());
    }

    #[test]
    fn test_autoprefix_follows_mode() {
        let mut config = SiteConfig::default();

        config.mode = Mode::Production;
        assert!(config.autoprefix());
        config.mode = Mode::Development;
        assert!(!config.autoprefix());

        config.build.stylesheet.autoprefix = Autoprefix::On;
        assert!(config.autoprefix());
        config.mode = Mode::Production;
        config.build.stylesheet.autoprefix = Autoprefix::Off;
        assert!(!config.autoprefix());
    }

    #[test]
    fn test_load_without_config_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();

        let root = dir.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["kiln", "--root", root, "--mode", "development"]).unwrap();
        let config = SiteConfig::load(&cli).unwrap();

        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.source(), root.join("src"));
        assert_eq!(config.output(), root.join("dist"));
        assert!(config.output().is_absolute());
    }

    #[test]
    fn test_load_reads_config_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("site")).unwrap();
        fs::write(
            dir.path().join("kiln.toml"),
            "[build]\nsource = \"site\"\noutput = \"public\"\n",
        )
        .unwrap();

        let root = dir.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["kiln", "--root", root, "--mode", "production"]).unwrap();
        let config = SiteConfig::load(&cli).unwrap();

        assert!(config.source().ends_with("site"));
        assert!(config.output().ends_with("public"));
        assert!(config.config_path.ends_with("kiln.toml"));
    }

    #[test]
    fn test_load_rejects_output_resolving_to_source() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("kiln.toml"), "[build]\noutput = \"gone/../src\"\n").unwrap();

        let root = dir.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["kiln", "--root", root]).unwrap();
        assert!(SiteConfig::load(&cli).is_err());
        assert!(!dir.path().join("gone").exists());
    }

    #[test]
    fn test_load_folds_missing_output_path() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("kiln.toml"), "[build]\noutput = \"build/../public\"\n").unwrap();

        let root = dir.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["kiln", "--root", root]).unwrap();
        let config = SiteConfig::load(&cli).unwrap();

        assert_eq!(config.output(), dir.path().canonicalize().unwrap().join("public"));
    }

    #[test]
    fn test_validate_missing_source() {
        let dir = TempDir::new().unwrap();
        let config = SiteConfig::for_roots(
            &dir.path().join("missing"),
            &dir.path().join("dist"),
            Mode::Production,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_nested_roots() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        fs::create_dir(&source).unwrap();

        let config = SiteConfig::for_roots(&source, &source.join("dist"), Mode::Production);
        assert!(config.validate().is_err());

        let config = SiteConfig::for_roots(&source, dir.path(), Mode::Production);
        assert!(config.validate().is_err());

        // `..` cannot sneak the output back onto the sources
        let config = SiteConfig::for_roots(&source, &dir.path().join("gone/../src"), Mode::Production);
        assert!(config.validate().is_err());
        let config = SiteConfig::for_roots(&source, &source.join("../src/dist"), Mode::Production);
        assert!(config.validate().is_err());

        // siblings sharing a name prefix are fine
        let config = SiteConfig::for_roots(&source, &dir.path().join("src-dist"), Mode::Production);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_command() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        fs::create_dir(&source).unwrap();

        let mut config = SiteConfig::for_roots(&source, &dir.path().join("dist"), Mode::Production);
        config.build.script.command.clear();
        assert!(config.validate().is_err());
    }
}
