//! Asset classification and source → output path mapping.
//!
//! Mapping is purely lexical and component-wise, so `src/` and `src` are the
//! same root and `src2/a.js` is never mistaken for a file under `src`.

use crate::config::SiteConfig;
use std::{
    ffi::{OsStr, OsString},
    path::{Component, Path, PathBuf},
};

// ============================================================================
// Asset Class
// ============================================================================

/// How a source file is turned into output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetClass {
    /// `.scss` → `.css`
    Stylesheet,
    /// `.shtml` → `.html`
    Markup,
    /// `.js` → `.js`
    Script,
    /// Everything else, copied byte-for-byte.
    Opaque,
}

impl AssetClass {
    /// Classify by extension. Matching is case-sensitive: `STYLE.SCSS` is opaque.
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(OsStr::to_str) {
            Some("scss") => Self::Stylesheet,
            Some("shtml") => Self::Markup,
            Some("js") => Self::Script,
            _ => Self::Opaque,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Stylesheet => "stylesheet",
            Self::Markup => "markup",
            Self::Script => "script",
            Self::Opaque => "opaque",
        }
    }

    /// Extension of the produced file, when it differs from the source.
    const fn output_extension(self) -> Option<&'static str> {
        match self {
            Self::Stylesheet => Some("css"),
            Self::Markup => Some("html"),
            Self::Script | Self::Opaque => None,
        }
    }
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Path Mapping
// ============================================================================

/// Maps source paths onto the output tree.
#[derive(Debug, Clone)]
pub struct PathMapping {
    source: PathBuf,
    output: PathBuf,
    include_dir: OsString,
}

impl PathMapping {
    pub fn new(source: &Path, output: &Path, include_dir: impl Into<OsString>) -> Self {
        Self {
            source: lexical(source),
            output: lexical(output),
            include_dir: include_dir.into(),
        }
    }

    pub fn from_config(config: &SiteConfig) -> Self {
        Self::new(config.source(), config.output(), &config.build.include_dir)
    }

    pub fn source_root(&self) -> &Path {
        &self.source
    }

    pub fn output_root(&self) -> &Path {
        &self.output
    }

    /// Path of `path` below the source root.
    ///
    /// `None` for the root itself, for anything outside it, and for paths
    /// that climb back out with `..`.
    pub fn relative(&self, path: &Path) -> Option<PathBuf> {
        let rel = lexical(path).strip_prefix(&self.source).ok()?.to_path_buf();
        let inside = rel.components().all(|c| matches!(c, Component::Normal(_)));
        (inside && !rel.as_os_str().is_empty()).then_some(rel)
    }

    /// Output file for a source file of the given class.
    pub fn destination(&self, path: &Path, class: AssetClass) -> Option<PathBuf> {
        let mut dest = self.output.join(self.relative(path)?);
        if let Some(ext) = class.output_extension() {
            dest.set_extension(ext);
        }
        Some(dest)
    }

    /// Output directory mirroring a source directory.
    pub fn output_dir_for(&self, dir: &Path) -> Option<PathBuf> {
        Some(self.output.join(self.relative(dir)?))
    }

    /// Whether `path` is an include-only partial of `class`.
    ///
    /// Stylesheets: file name starts with `_`. Markup: file name starts with
    /// `_`, or some directory between the source root and the file is the
    /// include directory.
    pub fn is_partial(&self, path: &Path, class: AssetClass) -> bool {
        let underscored = path
            .file_name()
            .is_some_and(|name| name.as_encoded_bytes().starts_with(b"_"));

        match class {
            AssetClass::Stylesheet => underscored,
            AssetClass::Markup => underscored || self.in_include_dir(path),
            AssetClass::Script | AssetClass::Opaque => false,
        }
    }

    fn in_include_dir(&self, path: &Path) -> bool {
        let Some(rel) = self.relative(path) else {
            return false;
        };
        rel.parent()
            .is_some_and(|dirs| dirs.iter().any(|dir| dir == self.include_dir))
    }
}

/// Drop `.` components and trailing separators.
fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Fold `.` and `..` lexically so paths written differently compare alike.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> PathMapping {
        PathMapping::new(Path::new("/site/src"), Path::new("/site/dist"), "include")
    }

    fn output_for(m: &PathMapping, path: &Path) -> Option<PathBuf> {
        m.destination(path, AssetClass::of(path))
    }

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(AssetClass::of(Path::new("a/style.scss")), AssetClass::Stylesheet);
        assert_eq!(AssetClass::of(Path::new("index.shtml")), AssetClass::Markup);
        assert_eq!(AssetClass::of(Path::new("app.js")), AssetClass::Script);
        assert_eq!(AssetClass::of(Path::new("logo.png")), AssetClass::Opaque);
        assert_eq!(AssetClass::of(Path::new("README")), AssetClass::Opaque);
        assert_eq!(AssetClass::of(Path::new("app.min.js")), AssetClass::Script);
    }

    #[test]
    fn test_classify_is_case_sensitive() {
        assert_eq!(AssetClass::of(Path::new("STYLE.SCSS")), AssetClass::Opaque);
        assert_eq!(AssetClass::of(Path::new("App.JS")), AssetClass::Opaque);
    }

    #[test]
    fn test_destination_rewrites_extension() {
        let m = mapping();
        assert_eq!(
            output_for(&m, Path::new("/site/src/css/style.scss")),
            Some(PathBuf::from("/site/dist/css/style.css"))
        );
        assert_eq!(
            output_for(&m, Path::new("/site/src/index.shtml")),
            Some(PathBuf::from("/site/dist/index.html"))
        );
        assert_eq!(
            output_for(&m, Path::new("/site/src/js/app.js")),
            Some(PathBuf::from("/site/dist/js/app.js"))
        );
        assert_eq!(
            output_for(&m, Path::new("/site/src/img/logo.png")),
            Some(PathBuf::from("/site/dist/img/logo.png"))
        );
    }

    #[test]
    fn test_destination_stays_under_output_root() {
        let m = mapping();
        for path in ["/site/src/a.scss", "/site/src/x/y/z.bin", "/site/src/./b/c.js"] {
            let dest = output_for(&m, Path::new(path)).unwrap();
            assert!(dest.starts_with("/site/dist"), "{}", dest.display());
        }
    }

    #[test]
    fn test_outside_source_is_rejected() {
        let m = mapping();
        assert_eq!(output_for(&m, Path::new("/site/src2/a.js")), None);
        assert_eq!(output_for(&m, Path::new("/elsewhere/a.js")), None);
        assert_eq!(output_for(&m, Path::new("/site/src/../secret.js")), None);
        assert_eq!(m.relative(Path::new("/site/src")), None);
    }

    #[test]
    fn test_trailing_slash_and_curdir_roots() {
        let m = PathMapping::new(Path::new("/site/src/"), Path::new("/site/./dist/"), "include");
        assert_eq!(
            output_for(&m, Path::new("/site/src/a.js")),
            Some(PathBuf::from("/site/dist/a.js"))
        );
        assert_eq!(
            m.output_dir_for(Path::new("/site/src/images/")),
            Some(PathBuf::from("/site/dist/images"))
        );
    }

    #[test]
    fn test_normalize_folds_parent_dirs() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("/site/gone/../src")), PathBuf::from("/site/src"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_stylesheet_partials() {
        let m = mapping();
        assert!(m.is_partial(Path::new("/site/src/css/_vars.scss"), AssetClass::Stylesheet));
        assert!(!m.is_partial(Path::new("/site/src/css/style.scss"), AssetClass::Stylesheet));
        // the include directory only applies to markup
        assert!(!m.is_partial(
            Path::new("/site/src/include/style.scss"),
            AssetClass::Stylesheet
        ));
    }

    #[test]
    fn test_markup_partials() {
        let m = mapping();
        assert!(m.is_partial(Path::new("/site/src/include/header.shtml"), AssetClass::Markup));
        assert!(m.is_partial(Path::new("/site/src/a/include/b/nav.shtml"), AssetClass::Markup));
        assert!(m.is_partial(Path::new("/site/src/_footer.shtml"), AssetClass::Markup));
        assert!(!m.is_partial(Path::new("/site/src/index.shtml"), AssetClass::Markup));
        assert!(!m.is_partial(Path::new("/site/src/includes/x.shtml"), AssetClass::Markup));
    }

    #[test]
    fn test_scripts_and_opaque_never_partial() {
        let m = mapping();
        assert!(!m.is_partial(Path::new("/site/src/_private.js"), AssetClass::Script));
        assert!(!m.is_partial(Path::new("/site/src/include/_x.png"), AssetClass::Opaque));
    }
}
