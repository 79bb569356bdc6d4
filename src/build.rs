//! Full-build orchestration.
//!
//! # Architecture
//!
//! ```text
//! full_build()
//!     │
//!     ├── remove_output_dir()        wipe the output tree (fatal on error)
//!     │
//!     ├── collect_files()            walk the source tree once (fatal on error)
//!     │
//!     ├── classify_tree()            bucket by class, drop partials,
//!     │                              reject output collisions
//!     │
//!     └── tokio::join!               four class batches, concurrently
//!           ├── compile_many(Stylesheet)
//!           ├── compile_many(Markup)
//!           ├── compile_many(Script)
//!           └── compile_many(Opaque)
//! ```
//!
//! Per-file failures are logged and counted, they never fail the build.

use crate::{
    compiler::{AssetClass, CompileOutcome, Compilers, PathMapping},
    error::{BuildError, BuildResult},
    log,
    utils::{
        fs::remove_output_dir,
        walk::collect_files,
    },
};
use rustc_hash::FxHashMap;
use std::{path::PathBuf, time::Instant};

// ============================================================================
// Classification
// ============================================================================

/// Source files bucketed by class, ready to compile.
#[derive(Debug, Default)]
pub struct ClassifiedTree {
    pub stylesheets: Vec<PathBuf>,
    pub markup: Vec<PathBuf>,
    pub scripts: Vec<PathBuf>,
    pub opaque: Vec<PathBuf>,
    /// Partials dropped from the buckets.
    pub partials: Vec<PathBuf>,
    /// Sources rejected because an earlier source already claimed their output.
    pub collisions: Vec<BuildError>,
}

impl ClassifiedTree {
    fn bucket(&mut self, class: AssetClass) -> &mut Vec<PathBuf> {
        match class {
            AssetClass::Stylesheet => &mut self.stylesheets,
            AssetClass::Markup => &mut self.markup,
            AssetClass::Script => &mut self.scripts,
            AssetClass::Opaque => &mut self.opaque,
        }
    }

    /// Files that will be compiled.
    pub fn len(&self) -> usize {
        self.stylesheets.len() + self.markup.len() + self.scripts.len() + self.opaque.len()
    }
}

/// Put every file into exactly one bucket (or the partial / collision lists).
///
/// Files outside the source root are dropped; the walker never yields any.
pub fn classify_tree(files: Vec<PathBuf>, mapping: &PathMapping) -> ClassifiedTree {
    let mut tree = ClassifiedTree::default();
    let mut claimed: FxHashMap<PathBuf, PathBuf> = FxHashMap::default();

    for file in files {
        let class = AssetClass::of(&file);
        if mapping.is_partial(&file, class) {
            tree.partials.push(file);
            continue;
        }

        let Some(dest) = mapping.destination(&file, class) else {
            continue;
        };

        // `a.scss` next to `a.css` would both write `a.css`
        if let Some(first) = claimed.get(&dest) {
            tree.collisions.push(BuildError::OutputCollision {
                dest,
                first: first.clone(),
                second: file,
            });
            continue;
        }

        claimed.insert(dest, file.clone());
        tree.bucket(class).push(file);
    }

    tree
}

// ============================================================================
// Build Report
// ============================================================================

/// What a build produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BuildReport {
    fn record(&mut self, results: &[(PathBuf, BuildResult<CompileOutcome>)]) {
        for (_, result) in results {
            match result {
                Ok(CompileOutcome::Written(_)) => self.written += 1,
                Ok(CompileOutcome::Skipped) => self.skipped += 1,
                Err(_) => self.failed += 1,
            }
        }
    }

    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

// ============================================================================
// Builds
// ============================================================================

/// Wipe the output tree and rebuild everything from the source tree.
///
/// Errors only when the output tree cannot be removed or the source tree
/// cannot be walked.
pub async fn full_build(compilers: &Compilers) -> BuildResult<BuildReport> {
    let started = Instant::now();
    let mapping = compilers.mapping();
    let output = mapping.output_root();

    remove_output_dir(output).await?;
    tokio::fs::create_dir_all(output)
        .await
        .map_err(|err| BuildError::io(output, err))?;

    let files = collect_files(mapping.source_root()).await?;
    let tree = classify_tree(files, mapping);
    log!("build"; "{} files ({} partials)", tree.len(), tree.partials.len());

    let mut report = BuildReport {
        skipped: tree.partials.len(),
        failed: tree.collisions.len(),
        ..BuildReport::default()
    };
    for err in &tree.collisions {
        log!("error"; "{err}");
    }

    let (styles, markup, scripts, opaque) = tokio::join!(
        compilers.compile_many(AssetClass::Stylesheet, tree.stylesheets),
        compilers.compile_many(AssetClass::Markup, tree.markup),
        compilers.compile_many(AssetClass::Script, tree.scripts),
        compilers.compile_many(AssetClass::Opaque, tree.opaque),
    );
    for results in [&styles, &markup, &scripts, &opaque] {
        report.record(results);
    }

    log_build_result(&report, started);
    Ok(report)
}

/// Recompile every non-partial file of one class, in place.
///
/// Used when a partial changes and any file of its class may depend on it.
pub async fn rebuild_class(compilers: &Compilers, class: AssetClass) -> BuildResult<BuildReport> {
    let mapping = compilers.mapping();
    let files = collect_files(mapping.source_root()).await?;
    let mut tree = classify_tree(files, mapping);

    let sources = std::mem::take(tree.bucket(class));
    let mut report = BuildReport::default();
    report.record(&compilers.compile_many(class, sources).await);
    Ok(report)
}

fn log_build_result(report: &BuildReport, started: Instant) {
    let elapsed = started.elapsed().as_millis();
    if report.is_clean() {
        log!("build"; "done in {elapsed}ms, {} files written", report.written);
    } else {
        log!("build"; "done in {elapsed}ms, {} written, {} failed", report.written, report.failed);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cli::Mode,
        compiler::testing::{INVALID, fake_compilers},
        config::SiteConfig,
    };
    use std::{fs, path::Path};
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Every file below `root`, relative and sorted.
    fn listing(root: &Path) -> Vec<String> {
        let mut files = Vec::new();
        crate::utils::walk::walk(root, |p| {
            files.push(p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"));
        })
        .unwrap();
        files
    }

    fn scenario() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dist = dir.path().join("dist");
        write(&src, "index.shtml", "<!--#include file=\"include/_header.shtml\" --><main/>");
        write(&src, "include/_header.shtml", "<header/>");
        write(&src, "css/style.scss", "@import 'vars'; a{}");
        write(&src, "css/_vars.scss", "$c: red;");
        write(&src, "js/app.js", "console.log(1)");
        write(&src, "img/logo.png", "PNG");
        (dir, src, dist)
    }

    #[test]
    fn test_classification_is_complete() {
        let mapping = PathMapping::new(Path::new("/s"), Path::new("/d"), "include");
        let files: Vec<PathBuf> = [
            "/s/a.scss",
            "/s/_b.scss",
            "/s/c.shtml",
            "/s/include/d.shtml",
            "/s/e.js",
            "/s/f.png",
            "/s/G.SCSS",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();

        let tree = classify_tree(files.clone(), &mapping);
        assert_eq!(tree.len() + tree.partials.len(), files.len());
        assert_eq!(tree.stylesheets, vec![PathBuf::from("/s/a.scss")]);
        assert_eq!(tree.markup, vec![PathBuf::from("/s/c.shtml")]);
        assert_eq!(tree.scripts, vec![PathBuf::from("/s/e.js")]);
        assert_eq!(tree.opaque, vec![PathBuf::from("/s/f.png"), PathBuf::from("/s/G.SCSS")]);
        assert_eq!(tree.partials.len(), 2);
    }

    #[test]
    fn test_output_collision_is_reported() {
        let mapping = PathMapping::new(Path::new("/s"), Path::new("/d"), "include");
        let files = vec![PathBuf::from("/s/a.css"), PathBuf::from("/s/a.scss")];

        let tree = classify_tree(files, &mapping);
        assert_eq!(tree.opaque, vec![PathBuf::from("/s/a.css")]);
        assert!(tree.stylesheets.is_empty());
        assert!(matches!(
            &tree.collisions[..],
            [BuildError::OutputCollision { second, .. }] if second == Path::new("/s/a.scss")
        ));
    }

    #[tokio::test]
    async fn test_full_build_scenario() {
        let (_dir, src, dist) = scenario();
        let (compilers, _) = fake_compilers(SiteConfig::for_roots(&src, &dist, Mode::Production));

        let report = full_build(&compilers).await.unwrap();

        assert_eq!(
            listing(&dist),
            vec!["css/style.css", "img/logo.png", "index.html", "js/app.js"]
        );
        assert_eq!(fs::read_to_string(dist.join("index.html")).unwrap(), "<header/><main/>");
        assert_eq!(report, BuildReport { written: 4, skipped: 2, failed: 0 });
    }

    #[tokio::test]
    async fn test_full_build_removes_stale_output() {
        let (_dir, src, dist) = scenario();
        write(&dist, "old/stale.html", "stale");
        let (compilers, _) = fake_compilers(SiteConfig::for_roots(&src, &dist, Mode::Production));

        full_build(&compilers).await.unwrap();
        assert!(!dist.join("old").exists());
    }

    #[tokio::test]
    async fn test_full_build_is_idempotent() {
        let (_dir, src, dist) = scenario();
        let (compilers, _) = fake_compilers(SiteConfig::for_roots(&src, &dist, Mode::Production));

        full_build(&compilers).await.unwrap();
        let first: Vec<_> = listing(&dist)
            .into_iter()
            .map(|rel| (fs::read(dist.join(&rel)).unwrap(), rel))
            .collect();

        full_build(&compilers).await.unwrap();
        let second: Vec<_> = listing(&dist)
            .into_iter()
            .map(|rel| (fs::read(dist.join(&rel)).unwrap(), rel))
            .collect();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_rest() {
        let (_dir, src, dist) = scenario();
        write(&src, "js/broken.js", INVALID);
        let (compilers, _) = fake_compilers(SiteConfig::for_roots(&src, &dist, Mode::Production));

        let report = full_build(&compilers).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.written, 4);
        assert!(!dist.join("js/broken.js").exists());
        assert!(dist.join("js/app.js").is_file());
    }

    #[tokio::test]
    async fn test_missing_source_is_fatal() {
        let dir = TempDir::new().unwrap();
        let (compilers, _) = fake_compilers(SiteConfig::for_roots(
            &dir.path().join("missing"),
            &dir.path().join("dist"),
            Mode::Production,
        ));

        assert!(matches!(full_build(&compilers).await, Err(BuildError::Io { .. })));
    }

    #[tokio::test]
    async fn test_rebuild_class_touches_only_that_class() {
        let (_dir, src, dist) = scenario();
        let (compilers, calls) = fake_compilers(SiteConfig::for_roots(&src, &dist, Mode::Development));
        write(&src, "css/print.scss", "b{}");

        let report = rebuild_class(&compilers, AssetClass::Stylesheet).await.unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(calls.style(), 2);
        assert_eq!(calls.script(), 0);
        assert_eq!(listing(&dist), vec!["css/print.css", "css/style.css"]);
    }
}
