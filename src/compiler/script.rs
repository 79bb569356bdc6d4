//! Script transformation: `.js` → `.js` through an external transpiler.

use super::tool_failure;
use crate::{
    error::BuildResult,
    utils::{
        exec::{EMPTY_FILTER, exec},
        fs::BoxFuture,
    },
};
use std::path::Path;

pub trait ScriptTransform: Send + Sync {
    fn transform<'a>(&'a self, source: &'a Path) -> BoxFuture<'a, BuildResult<String>>;
}

/// Runs `<command...> <file>` and reads the transformed script from stdout.
pub struct BabelCommand {
    command: Vec<String>,
}

impl BabelCommand {
    pub const fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl ScriptTransform for BabelCommand {
    fn transform<'a>(&'a self, source: &'a Path) -> BoxFuture<'a, BuildResult<String>> {
        Box::pin(async move {
            exec(&self.command, &[source.as_os_str()], None, &EMPTY_FILTER)
                .await
                .map_err(|err| tool_failure(source, err))
        })
    }
}
