//! Command-line interface definitions.
//!
//! The run mode normally comes from the `KILN_ENV` environment variable;
//! `--mode` overrides it.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Environment variable selecting the run mode.
pub const MODE_ENV: &str = "KILN_ENV";

/// What to do after the initial full build.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Build, then serve the output with live reload and watch for changes
    Development,
    /// Build once and exit
    #[default]
    Production,
}

impl Mode {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Kiln: scss/shtml/js site builder with live reload
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Project root directory
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name, relative to root (optional file)
    #[arg(short = 'C', long, default_value = "kiln.toml")]
    pub config: PathBuf,

    /// Run mode
    #[arg(short, long, value_enum, env = MODE_ENV, default_value_t = Mode::Production)]
    pub mode: Mode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_flag() {
        let cli = Cli::try_parse_from(["kiln", "--mode", "development"]).unwrap();
        assert_eq!(cli.mode, Mode::Development);
        assert_eq!(cli.config, PathBuf::from("kiln.toml"));
    }

    #[test]
    fn test_invalid_mode_rejected() {
        assert!(Cli::try_parse_from(["kiln", "--mode", "staging"]).is_err());
    }

    #[test]
    fn test_root_and_config() {
        let cli = Cli::try_parse_from(["kiln", "-r", "site", "-C", "custom.toml", "-m", "production"])
            .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("site")));
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert_eq!(cli.mode.name(), "production");
    }
}
