//! Per-asset-class compilation.
//!
//! - **path**: Classify sources and map them onto the output tree
//! - **style**: `.scss` → `.css` (external compiler, optional autoprefixer)
//! - **markup**: `.shtml` → `.html` (include expansion)
//! - **script**: `.js` → `.js` (external transpiler)
//! - **assets**: Byte-for-byte copy of everything else
//!
//! # Flow
//!
//! ```text
//! source ──► AssetClass::of ──► partial? ──► Skipped
//!                                  │
//!                                  ▼
//!                     collaborator ──► write_output ──► Written(dest)
//! ```

pub mod assets;
pub mod markup;
pub mod path;
pub mod script;
pub mod style;

pub use path::{AssetClass, PathMapping};

use crate::{
    config::SiteConfig,
    error::{BuildError, BuildResult},
    log,
    utils::{exec::ExecError, fs::write_output},
};
use markup::{IncludeProcessor, MarkupCompiler};
use script::{BabelCommand, ScriptTransform};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use style::{Autoprefixer, PostcssCommand, SassCommand, StyleCompiler};
use tokio::task::JoinSet;

/// Result of compiling one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Output written at this path.
    Written(PathBuf),
    /// Partial: nothing to produce on its own.
    Skipped,
}

/// An external tool failure is a defect in the source, not a transient error.
fn tool_failure(source: &Path, err: ExecError) -> BuildError {
    BuildError::compile(source, err.to_string())
}

// ============================================================================
// Compilers
// ============================================================================

/// The four class compilers plus everything they need, cheap to clone into tasks.
#[derive(Clone)]
pub struct Compilers {
    config: Arc<SiteConfig>,
    mapping: Arc<PathMapping>,
    style: Arc<dyn StyleCompiler>,
    prefixer: Arc<dyn Autoprefixer>,
    markup: Arc<dyn MarkupCompiler>,
    script: Arc<dyn ScriptTransform>,
}

impl Compilers {
    /// Default collaborators, driven by the configured commands.
    pub fn from_config(config: Arc<SiteConfig>) -> Self {
        let build = &config.build;
        Self {
            mapping: Arc::new(PathMapping::from_config(&config)),
            style: Arc::new(SassCommand::new(build.stylesheet.command.clone())),
            prefixer: Arc::new(PostcssCommand::new(build.stylesheet.autoprefix_command.clone())),
            markup: Arc::new(IncludeProcessor::default()),
            script: Arc::new(BabelCommand::new(build.script.command.clone())),
            config,
        }
    }

    #[cfg(test)]
    pub fn with_style(mut self, style: impl StyleCompiler + 'static) -> Self {
        self.style = Arc::new(style);
        self
    }

    #[cfg(test)]
    pub fn with_prefixer(mut self, prefixer: impl Autoprefixer + 'static) -> Self {
        self.prefixer = Arc::new(prefixer);
        self
    }

    #[cfg(test)]
    pub fn with_script(mut self, script: impl ScriptTransform + 'static) -> Self {
        self.script = Arc::new(script);
        self
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn mapping(&self) -> &PathMapping {
        &self.mapping
    }

    /// Compile a single source file of `class` into the output tree.
    pub async fn compile_one(&self, class: AssetClass, source: &Path) -> BuildResult<CompileOutcome> {
        let dest = self
            .mapping
            .destination(source, class)
            .ok_or_else(|| BuildError::PathOutsideSource(source.to_path_buf()))?;

        if self.mapping.is_partial(source, class) {
            return Ok(CompileOutcome::Skipped);
        }

        match class {
            AssetClass::Stylesheet => {
                let css = self.style.compile(source).await?;
                let css = if self.config.autoprefix() {
                    self.prefixer.prefix(css, source).await?
                } else {
                    css
                };
                write_output(&dest, css).await?;
            }
            AssetClass::Markup => {
                self.markup
                    .compile(source, &dest, self.mapping.source_root())
                    .await?;
            }
            AssetClass::Script => {
                let js = self.script.transform(source).await?;
                write_output(&dest, js).await?;
            }
            AssetClass::Opaque => assets::copy_asset(source, &dest).await?,
        }

        Ok(CompileOutcome::Written(dest))
    }

    /// Compile every source concurrently; one failure never affects the others.
    ///
    /// Failures are logged here. Results come back sorted by source path.
    pub async fn compile_many(
        &self,
        class: AssetClass,
        sources: Vec<PathBuf>,
    ) -> Vec<(PathBuf, BuildResult<CompileOutcome>)> {
        let mut tasks = JoinSet::new();
        for source in sources {
            let compilers = self.clone();
            tasks.spawn(async move {
                let result = compilers.compile_one(class, &source).await;
                (source, result)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((source, result)) => {
                    if let Err(err) = &result {
                        log!("error"; "{err}");
                    }
                    results.push((source, result));
                }
                Err(err) => log!("error"; "{class} task failed: {err}"),
            }
        }

        results.sort_by(|(a, _), (b, _)| a.cmp(b));
        results
    }
}

// ============================================================================
// Test Doubles
// ============================================================================
