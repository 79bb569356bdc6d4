//! Markup compilation: `.shtml` → `.html` by expanding server-side includes.
//!
//! Supported directives:
//!
//! ```html
//! <!--#include file="partials/nav.shtml" -->   relative to the including file
//! <!--#include virtual="/include/head.shtml" --> relative to the source root
//! ```
//!
//! A `virtual` path without a leading `/` resolves like `file`.

use super::path::normalize;
use crate::{
    error::{BuildError, BuildResult},
    utils::fs::{BoxFuture, write_output},
};
use regex::Regex;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::LazyLock,
};

/// Compiles one markup source and writes the result to `dest` itself.
pub trait MarkupCompiler: Send + Sync {
    fn compile<'a>(
        &'a self,
        source: &'a Path,
        dest: &'a Path,
        root: &'a Path,
    ) -> BoxFuture<'a, BuildResult<()>>;
}

static INCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<!--#include\s+(file|virtual)\s*=\s*"([^"]+)"\s*-->"#).unwrap()
});

/// Built-in include expander.
pub struct IncludeProcessor {
    max_depth: usize,
}

impl Default for IncludeProcessor {
    fn default() -> Self {
        Self { max_depth: 16 }
    }
}

impl IncludeProcessor {
    /// Expand every include in `file`, recursively.
    ///
    /// `stack` holds the chain of files currently being expanded.
    fn expand<'a>(
        &'a self,
        file: &'a Path,
        root: &'a Path,
        stack: &'a mut Vec<PathBuf>,
    ) -> BoxFuture<'a, BuildResult<String>> {
        Box::pin(async move {
            let content = match tokio::fs::read_to_string(file).await {
                Ok(content) => content,
                // A dangling include is a defect in the including file
                Err(err) if err.kind() == ErrorKind::NotFound && !stack.is_empty() => {
                    let parent = stack.last().map_or(file, PathBuf::as_path);
                    return Err(BuildError::compile(
                        parent,
                        format!("included file `{}` not found", file.display()),
                    ));
                }
                Err(err) => return Err(BuildError::io(file, err)),
            };

            // Collected up front: the match iterator is not held across awaits.
            let directives: Vec<_> = INCLUDE
                .captures_iter(&content)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let target = resolve(file, root, caps.get(1)?.as_str(), caps.get(2)?.as_str());
                    Some((whole.range(), target))
                })
                .collect();

            if directives.is_empty() {
                return Ok(content);
            }

            stack.push(file.to_path_buf());
            let mut html = String::with_capacity(content.len());
            let mut last = 0;

            for (range, target) in directives {
                html.push_str(&content[last..range.start]);
                last = range.end;

                if stack.contains(&target) {
                    return Err(BuildError::compile(
                        file,
                        format!("include cycle through `{}`", target.display()),
                    ));
                }
                if stack.len() >= self.max_depth {
                    return Err(BuildError::compile(
                        file,
                        format!("includes nested deeper than {}", self.max_depth),
                    ));
                }

                html.push_str(&self.expand(&target, root, stack).await?);
            }

            html.push_str(&content[last..]);
            stack.pop();
            Ok(html)
        })
    }
}

impl MarkupCompiler for IncludeProcessor {
    fn compile<'a>(
        &'a self,
        source: &'a Path,
        dest: &'a Path,
        root: &'a Path,
    ) -> BoxFuture<'a, BuildResult<()>> {
        Box::pin(async move {
            let source = normalize(source);
            let html = self.expand(&source, root, &mut Vec::new()).await?;
            write_output(dest, html).await
        })
    }
}

fn resolve(including: &Path, root: &Path, kind: &str, target: &str) -> PathBuf {
    let base = including.parent().unwrap_or(root);
    let joined = match target.strip_prefix('/') {
        Some(rooted) if kind == "virtual" => root.join(rooted),
        _ => base.join(target),
    };
    normalize(&joined)
}
