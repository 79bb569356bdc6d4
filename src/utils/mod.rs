//! Shared I/O helpers: directory walking, output writing, external commands.

pub mod exec;
pub mod fs;
pub mod walk;
