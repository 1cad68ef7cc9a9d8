//! File pipelines
//!
//! Each task body reads a [`FileSet`], runs its files through a fixed chain
//! of steps and writes the result. This module holds the shared pieces:
//! file set expansion, concatenation and output writing.

pub mod files;
pub mod lint;
pub mod scripts;
pub mod shrinkwrap;
pub mod styles;
pub mod template;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::FileSet;

/// Separator placed between concatenated files
pub const CONCAT_SEPARATOR: &str = "\n";

/// Errors shared by the file pipelines
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source file not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lint found {violations} problem(s) in {files} file(s)")]
    LintFailed { violations: usize, files: usize },

    #[error("{file}: template references undefined variable '{name}'")]
    UndefinedVariable { file: String, name: String },

    #[error("{path}: {message}")]
    Manifest { path: String, message: String },
}

impl PipelineError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Whether a pattern contains glob syntax
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

/// Compile a single pattern. `*` does not cross directory separators.
pub fn compile_glob(pattern: &str) -> Result<Glob, PipelineError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|source| PipelineError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Compile every pattern of a file set into one matcher
pub fn compile_globset(files: &FileSet) -> Result<GlobSet, PipelineError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in files.patterns() {
        builder.add(compile_glob(pattern)?);
    }
    builder.build().map_err(|source| PipelineError::InvalidPattern {
        pattern: files.patterns().join(", "),
        source,
    })
}

/// Directory part of a pattern that contains no glob syntax
fn static_base(pattern: &str) -> &str {
    let mut end = 0;
    for (offset, segment) in segments(pattern) {
        if is_glob(segment) {
            break;
        }
        end = offset + segment.len();
    }
    pattern[..end].trim_end_matches('/')
}

fn segments(pattern: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    pattern.split('/').map(move |segment| {
        let start = offset;
        offset += segment.len() + 1;
        (start, segment)
    })
}

/// Convert a path under `root` to a `/`-separated relative string
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root).ok().map(|relative| {
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    })
}

/// Expand a file set relative to `root`.
///
/// Matches keep the order of the patterns; matches of one glob are sorted.
/// A file matched by several patterns is kept at its first position. A
/// literal path that does not exist is an error.
pub fn expand(root: &Path, files: &FileSet) -> Result<Vec<PathBuf>, PipelineError> {
    expand_excluding(root, files, &FileSet::default())
}

/// Expand a file set, dropping anything matched by `exclude`
pub fn expand_excluding(root: &Path, files: &FileSet, exclude: &FileSet) -> Result<Vec<PathBuf>, PipelineError> {
    let excluded = compile_globset(exclude)?;
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for pattern in files.patterns() {
        let matches = if is_glob(pattern) {
            expand_glob(root, pattern)?
        } else {
            let path = root.join(pattern);
            if !path.is_file() {
                return Err(PipelineError::MissingSource(path));
            }
            vec![path]
        };

        for path in matches {
            let key = relative_key(root, &path).unwrap_or_default();
            if excluded.is_match(&key) {
                continue;
            }
            if seen.insert(path.clone()) {
                result.push(path);
            }
        }
    }

    Ok(result)
}

fn expand_glob(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let matcher = compile_glob(pattern)?.compile_matcher();
    let base = root.join(static_base(pattern));

    if !base.is_dir() {
        debug!("Pattern base {} does not exist", base.display());
        return Ok(Vec::new());
    }

    let mut matches = Vec::new();
    for entry in WalkDir::new(&base).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(&base).to_path_buf();
            PipelineError::io(&path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(key) = relative_key(root, entry.path()) {
            if matcher.is_match(&key) {
                matches.push(entry.into_path());
            }
        }
    }

    Ok(matches)
}

/// Read and join files in order
pub fn concat(paths: &[PathBuf]) -> Result<String, PipelineError> {
    let mut parts = Vec::with_capacity(paths.len());
    for path in paths {
        parts.push(fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?);
    }
    Ok(parts.join(CONCAT_SEPARATOR))
}

/// Write a file, creating parent directories
pub fn write_output(path: &Path, contents: &str) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| PipelineError::io(path, e))
}


#[cfg(test)]
mod tests {
    use super::test_support::touch;
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(root: &Path, paths: &[PathBuf]) -> Vec<String> {
        paths.iter().filter_map(|p| relative_key(root, p)).collect()
    }

    #[test]
    fn test_static_base() {
        assert_eq!(static_base("src/img/**/*.png"), "src/img");
        assert_eq!(static_base("src/*.{php,css}"), "src");
        assert_eq!(static_base("*.js"), "");
        assert_eq!(static_base("src/js/lib/**"), "src/js/lib");
    }

    #[test]
    fn test_expand_keeps_pattern_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/css/banner.css", "/* banner */");
        touch(root, "src/css/style.css", "a{}");
        touch(root, "src/vendor/b.css", "");
        touch(root, "src/vendor/a.css", "");

        let files = FileSet::new(["src/css/style.css", "src/vendor/*.css", "src/css/banner.css", "src/css/*.css"]);
        let expanded = expand(root, &files).unwrap();

        assert_eq!(
            names(root, &expanded),
            vec![
                "src/css/style.css",
                "src/vendor/a.css",
                "src/vendor/b.css",
                "src/css/banner.css",
            ]
        );
    }

    #[test]
    fn test_star_does_not_cross_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/index.php", "");
        touch(root, "src/modules/nav.php", "");

        let expanded = expand(root, &FileSet::new(["src/*.{php,png,css}"])).unwrap();
        assert_eq!(names(root, &expanded), vec!["src/index.php"]);
    }

    #[test]
    fn test_missing_literal_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = expand(dir.path(), &FileSet::new(["src/js/scripts.js"])).unwrap_err();
        assert!(matches!(err, PipelineError::MissingSource(_)));
    }

    #[test]
    fn test_exclude() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/js/scripts.js", "");
        touch(root, "src/js/lib/jquery.js", "");
        touch(root, "src/js/parts/menu.js", "");

        let expanded = expand_excluding(
            root,
            &FileSet::new(["src/js/**/*.js"]),
            &FileSet::new(["src/js/lib/**"]),
        )
        .unwrap();
        assert_eq!(names(root, &expanded), vec!["src/js/parts/menu.js", "src/js/scripts.js"]);
    }

    #[test]
    fn test_concat_joins_with_newline() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "a.js", "var a;");
        touch(root, "b.js", "var b;");

        let joined = concat(&[root.join("a.js"), root.join("b.js")]).unwrap();
        assert_eq!(joined, "var a;\nvar b;");
    }
}
