//! Stylesheet compilation: `.scss` → CSS, with optional autoprefixing.

use super::tool_failure;
use crate::{
    error::BuildResult,
    utils::{
        exec::{EMPTY_FILTER, SASS_FILTER, exec},
        fs::BoxFuture,
    },
};
use std::path::Path;

/// Turns one stylesheet source into CSS text.
pub trait StyleCompiler: Send + Sync {
    fn compile<'a>(&'a self, source: &'a Path) -> BoxFuture<'a, BuildResult<String>>;
}

/// Rewrites compiled CSS with vendor prefixes.
pub trait Autoprefixer: Send + Sync {
    fn prefix<'a>(&'a self, css: String, source: &'a Path) -> BoxFuture<'a, BuildResult<String>>;
}

/// Runs `<command...> <file>` and reads CSS from stdout.
pub struct SassCommand {
    command: Vec<String>,
}

impl SassCommand {
    pub const fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl StyleCompiler for SassCommand {
    fn compile<'a>(&'a self, source: &'a Path) -> BoxFuture<'a, BuildResult<String>> {
        Box::pin(async move {
            exec(&self.command, &[source.as_os_str()], None, &SASS_FILTER)
                .await
                .map_err(|err| tool_failure(source, err))
        })
    }
}

/// Pipes CSS through `<command...>` on stdin, reads the result from stdout.
pub struct PostcssCommand {
    command: Vec<String>,
}

impl PostcssCommand {
    pub const fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Autoprefixer for PostcssCommand {
    fn prefix<'a>(&'a self, css: String, source: &'a Path) -> BoxFuture<'a, BuildResult<String>> {
        Box::pin(async move {
            exec(&self.command, &[], Some(css.as_bytes()), &EMPTY_FILTER)
                .await
                .map_err(|err| tool_failure(source, err))
        })
    }
}
