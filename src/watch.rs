//! Watch-mode reconciliation.
//!
//! Each filesystem change becomes one [`ChangeEvent`], each event is handled
//! in its own task. Handling is split in two so the decision is testable
//! without a filesystem:
//!
//! - [`plan`]: pure, maps an event to an [`Action`]
//! - [`Reconciler::handle`]: waits the settle delay, takes the per-path lock,
//!   executes the action, then asks for a browser reload
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   unbounded   ┌──────────────────────────┐
//! │  notify  │──▶│ translate │──────────────▶│ run(): spawn per event   │
//! │ callback │   │ + filter  │    channel    │  └─ Reconciler::handle   │
//! └──────────┘   └───────────┘               │      settle ▶ lock ▶ plan │
//!                                            │      ▶ execute ▶ reload  │
//!                                            └──────────────────────────┘
//! ```

use crate::{
    build,
    compiler::{AssetClass, CompileOutcome, Compilers, PathMapping},
    error::{BuildError, BuildResult},
    log,
    logger::watch_line,
    utils::{
        fs::{remove_output_dir, remove_output_file, retry},
        walk::walk,
    },
};
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{ModifyKind, RemoveKind, RenameMode},
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::{
    Mutex as AsyncMutex,
    mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};

// =============================================================================
// Events and Actions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
    DeleteDirectory,
}

/// One change to the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// What to do about one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Compile (or copy) this source file.
    Compile(AssetClass, PathBuf),
    /// A partial changed: recompile every file of the class.
    RebuildClass(AssetClass),
    /// Delete this output file.
    RemoveFile(PathBuf),
    /// Recursively delete this output directory.
    RemoveDir(PathBuf),
    Ignore,
}

/// Decide what an event requires.
///
/// Partials are conservative: a modified partial rebuilds its whole class, an
/// added one waits until something includes it, a deleted one leaves the
/// output alone.
pub fn plan(event: &ChangeEvent, mapping: &PathMapping) -> Action {
    let path = &event.path;
    let class = AssetClass::of(path);
    let partial = mapping.is_partial(path, class);

    let action = match event.kind {
        ChangeKind::DeleteDirectory => mapping.output_dir_for(path).map(Action::RemoveDir),
        ChangeKind::Modify if partial => Some(Action::RebuildClass(class)),
        ChangeKind::Add | ChangeKind::Delete if partial => None,
        ChangeKind::Add | ChangeKind::Modify => mapping
            .relative(path)
            .map(|_| Action::Compile(class, path.clone())),
        ChangeKind::Delete => mapping.destination(path, class).map(Action::RemoveFile),
    };

    // Outside the source root is never ours to act on
    match action {
        Some(action) if mapping.relative(path).is_some() => action,
        _ => Action::Ignore,
    }
}

// =============================================================================
// notify Translation
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
///
/// Dotfiles such as `.htaccess` are site content and are not filtered.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "swx" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
}

/// Turn one notify event into zero or more change events.
pub fn translate(event: &Event, mapping: &PathMapping) -> Vec<ChangeEvent> {
    let mut changes = Vec::new();

    match event.kind {
        EventKind::Create(_) => {
            for path in &event.paths {
                appeared(path, &mut changes);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in &event.paths {
                changes.push(vanished(path, mapping));
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in &event.paths {
                appeared(path, &mut changes);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [from, to] = &event.paths[..] {
                changes.push(vanished(from, mapping));
                appeared(to, &mut changes);
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            for path in &event.paths {
                if path.exists() {
                    appeared(path, &mut changes);
                } else {
                    changes.push(vanished(path, mapping));
                }
            }
        }
        // mtime/chmod noise
        EventKind::Modify(ModifyKind::Metadata(_)) => {}
        EventKind::Modify(_) => {
            for path in event.paths.iter().filter(|p| p.is_file()) {
                changes.push(ChangeEvent::new(ChangeKind::Modify, path.clone()));
            }
        }
        EventKind::Remove(RemoveKind::File) => {
            for path in &event.paths {
                changes.push(ChangeEvent::new(ChangeKind::Delete, path.clone()));
            }
        }
        EventKind::Remove(RemoveKind::Folder) => {
            for path in &event.paths {
                changes.push(ChangeEvent::new(ChangeKind::DeleteDirectory, path.clone()));
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                changes.push(vanished(path, mapping));
            }
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }

    changes.retain(|change| {
        change.path.starts_with(mapping.source_root()) && !is_temp_file(&change.path)
    });
    changes
}

/// A path that now exists: one file, or every file of a moved-in tree.
fn appeared(path: &Path, changes: &mut Vec<ChangeEvent>) {
    if path.is_dir() {
        // A walk failure means the tree vanished again; its own events follow
        let _ = walk(path, |file| changes.push(ChangeEvent::new(ChangeKind::Add, file)));
    } else {
        changes.push(ChangeEvent::new(ChangeKind::Add, path));
    }
}

/// A path that no longer exists: file or directory, judged by what it produced.
fn vanished(path: &Path, mapping: &PathMapping) -> ChangeEvent {
    let was_dir = mapping
        .output_dir_for(path)
        .is_some_and(|out| out.is_dir());
    let kind = if was_dir {
        ChangeKind::DeleteDirectory
    } else {
        ChangeKind::Delete
    };
    ChangeEvent::new(kind, path)
}

// =============================================================================
// Reload Notification
// =============================================================================

/// Told after every change that touched the output tree.
///
/// Fire-and-forget: implementations must not block and never fail.
pub trait ReloadNotifier: Send + Sync {
    fn notify_reload(&self);
}

// =============================================================================
// Per-path Serialization
// =============================================================================

/// One async lock per source path, created on demand and dropped when idle.
#[derive(Default)]
struct PathLocks {
    locks: Mutex<FxHashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl PathLocks {
    fn get(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.locks.lock().entry(path.to_path_buf()).or_default())
    }

    /// Forget `path` once nobody else holds or waits for its lock.
    fn release(&self, path: &Path, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.locks.lock();
        // ours plus the map's
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

// =============================================================================
// Reconciler
// =============================================================================

pub struct Reconciler {
    compilers: Compilers,
    reload: Arc<dyn ReloadNotifier>,
    locks: PathLocks,
}

impl Reconciler {
    pub fn new(compilers: Compilers, reload: Arc<dyn ReloadNotifier>) -> Self {
        Self {
            compilers,
            reload,
            locks: PathLocks::default(),
        }
    }

    /// Handle one event end to end. Returns whether the output tree changed.
    ///
    /// Errors are logged here; a failed event never triggers a reload.
    pub async fn handle(&self, event: ChangeEvent) -> bool {
        let delay = self.compilers.config().watch.settle_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let lock = self.locks.get(&event.path);
        let guard = Arc::clone(&lock).lock_owned().await;
        let action = plan(&event, self.compilers.mapping());
        let result = self.execute(&action).await;
        drop(guard);
        self.locks.release(&event.path, lock);

        let label = self.label(&event.path);
        match result {
            Ok(true) => {
                watch_line("ok", &label);
                self.reload.notify_reload();
                true
            }
            Ok(false) => false,
            Err(err) => {
                watch_line("fail", &label);
                log!("error"; "{err}");
                false
            }
        }
    }

    async fn execute(&self, action: &Action) -> BuildResult<bool> {
        match action {
            Action::Ignore => Ok(false),
            Action::Compile(class, path) => {
                let compilers = &self.compilers;
                let retries = compilers.config().watch.retries;
                match retry(retries, move || compilers.compile_one(*class, path)).await? {
                    CompileOutcome::Written(dest) => {
                        let root = compilers.mapping().output_root();
                        let rel = dest.strip_prefix(root).unwrap_or(dest.as_path());
                        log!("watch"; "wrote {}", rel.display());
                        Ok(true)
                    }
                    CompileOutcome::Skipped => Ok(false),
                }
            }
            Action::RebuildClass(class) => {
                log!("watch"; "partial changed, rebuilding every {class}");
                let report = build::rebuild_class(&self.compilers, *class).await?;
                Ok(report.written > 0)
            }
            Action::RemoveFile(dest) => remove_output_file(dest).await,
            Action::RemoveDir(dest) => remove_output_dir(dest).await,
        }
    }

    /// Source path relative to the source root, for log lines.
    fn label(&self, path: &Path) -> String {
        self.compilers
            .mapping()
            .relative(path)
            .unwrap_or_else(|| path.to_path_buf())
            .display()
            .to_string()
    }
}

// =============================================================================
// Watch Session
// =============================================================================

/// A live watcher over the source tree and the events it produces.
pub struct WatchSession {
    // Dropping the watcher stops event delivery.
    _watcher: RecommendedWatcher,
    events: UnboundedReceiver<ChangeEvent>,
}

impl WatchSession {
    /// Start watching the source root recursively.
    pub fn start(mapping: &PathMapping) -> BuildResult<Self> {
        let (tx, events) = unbounded_channel();
        let root = mapping.source_root().to_path_buf();
        let setup_err = |source| BuildError::WatchSetup {
            path: root.clone(),
            source,
        };

        let mut watcher = notify::recommended_watcher(forward(mapping.clone(), tx))
            .map_err(setup_err)?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(setup_err)?;

        log!("watch"; "watching {}", root.display());
        Ok(Self {
            _watcher: watcher,
            events,
        })
    }

    /// Dispatch events until the watcher goes away. Each event runs in its own task.
    pub async fn run(mut self, reconciler: Arc<Reconciler>) {
        while let Some(event) = self.events.recv().await {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move {
                reconciler.handle(event).await;
            });
        }
    }
}

/// The notify callback: translate on the watcher thread, hand off to the runtime.
fn forward(
    mapping: PathMapping,
    tx: UnboundedSender<ChangeEvent>,
) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    move |res| match res {
        Ok(event) => {
            for change in translate(&event, &mapping) {
                // Receiver gone means shutdown
                let _ = tx.send(change);
            }
        }
        Err(err) => log!("watch"; "error: {err}"),
    }
}

// =============================================================================
// Tests
// =============================================================================
