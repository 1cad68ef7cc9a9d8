//! Copy and clean steps

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{expand, PipelineError};
use crate::config::Config;

/// Copy every file of the copy set into the destination tree, keeping its
/// path relative to the copy base. Returns the written paths.
pub fn copy_assets(config: &Config) -> Result<Vec<PathBuf>, PipelineError> {
    let base = config.path(&config.copy.base);
    let dest = config.path(&config.copy.dest);
    let sources = expand(&config.root, &config.copy.files)?;

    let mut written = Vec::with_capacity(sources.len());
    for source in sources {
        let relative = source
            .strip_prefix(&base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| source.file_name().map(PathBuf::from).unwrap_or_default());
        let target = dest.join(relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        fs::copy(&source, &target).map_err(|e| PipelineError::io(&source, e))?;
        debug!("Copied {} -> {}", source.display(), target.display());
        written.push(target);
    }

    Ok(written)
}

/// Remove the scratch and output directories. Missing ones are skipped.
pub fn clean(config: &Config) -> Result<Vec<PathBuf>, PipelineError> {
    let mut removed = Vec::new();
    for dir in [config.path(&config.paths.tmp), config.dist_dir()] {
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
            removed.push(dir);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::touch;

    #[test]
    fn test_copy_mirrors_source_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/index.php", "<?php");
        touch(root, "src/screenshot.png", "png");
        touch(root, "src/modules/nav.php", "<?php");
        touch(root, "src/img/icons/home.svg", "<svg/>");
        touch(root, "src/fonts/theme.woff2", "font");
        touch(root, "src/languages/fr.po", "msgid");
        touch(root, "src/js/scripts.js", "skipped");

        let config = Config::default_config(root);
        let written = copy_assets(&config).unwrap();

        assert_eq!(written.len(), 6);
        assert!(root.join("dist/index.php").is_file());
        assert!(root.join("dist/modules/nav.php").is_file());
        assert!(root.join("dist/img/icons/home.svg").is_file());
        assert!(root.join("dist/fonts/theme.woff2").is_file());
        assert!(root.join("dist/languages/fr.po").is_file());
        assert!(!root.join("dist/js/scripts.js").exists());
    }

    #[test]
    fn test_clean_removes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "dist/js/scripts.min.js", "");
        touch(root, "src/style.css", "");

        let config = Config::default_config(root);
        let removed = clean(&config).unwrap();

        assert_eq!(removed, vec![root.join("dist")]);
        assert!(!root.join("dist").exists());
        assert!(root.join("src/style.css").exists());
        assert!(clean(&config).unwrap().is_empty());
    }
}
