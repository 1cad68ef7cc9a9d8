//! Configuration handling for themeforge
//!
//! Parses and manages `themeforge.toml`. Every section is optional; the
//! defaults describe the standard theme layout (`src/` in, `dist/` out).

mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::mode::Mode;

pub use schema::*;

/// Default configuration file name
pub const CONFIG_FILE: &str = "themeforge.toml";

/// Errors raised by configuration lookups
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no CSS file set registered for mode '{0}'")]
    UnknownMode(String),

    #[error("file set '{0}' is empty")]
    EmptyFileSet(String),

    #[error("invalid browser target {name} = \"{version}\"")]
    InvalidBrowser { name: String, version: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub scripts: ScriptsConfig,

    #[serde(default)]
    pub styles: StylesConfig,

    #[serde(default)]
    pub copy: CopyConfig,

    #[serde(default)]
    pub lint: LintConfig,

    #[serde(default)]
    pub template: TemplateConfig,

    #[serde(default)]
    pub livereload: LiveReloadConfig,

    #[serde(default = "default_watches", rename = "watch")]
    pub watches: Vec<WatchConfig>,

    #[serde(default)]
    pub shrinkwrap: ShrinkwrapConfig,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// A missing file is not an error: the defaults are used with the
    /// file's directory as project root.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        if !canonical_path.exists() {
            debug!("No config at {}, using defaults", canonical_path.display());
            return Ok(Self::default_config(root));
        }

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        let mut config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse {}", canonical_path.display()))?;
        config.root = root;

        Ok(config)
    }

    /// Parse and validate a configuration document. The root is left empty.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create the default configuration rooted at `root`
    pub fn default_config<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            paths: PathsConfig::default(),
            scripts: ScriptsConfig::default(),
            styles: StylesConfig::default(),
            copy: CopyConfig::default(),
            lint: LintConfig::default(),
            template: TemplateConfig::default(),
            livereload: LiveReloadConfig::default(),
            watches: default_watches(),
            shrinkwrap: ShrinkwrapConfig::default(),
            root: root.into(),
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.scripts.files.is_empty() {
            return Err(ConfigError::EmptyFileSet("scripts.files".to_string()));
        }

        for (mode, files) in &self.styles.files {
            if files.is_empty() {
                return Err(ConfigError::EmptyFileSet(format!("styles.files.{}", mode)));
            }
        }

        for (name, version) in &self.styles.browsers {
            if crate::pipeline::styles::parse_browser_version(version).is_none() {
                return Err(ConfigError::InvalidBrowser {
                    name: name.clone(),
                    version: version.clone(),
                });
            }
        }

        Ok(())
    }

    /// Resolve a project-relative path
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn src_dir(&self) -> PathBuf {
        self.path(&self.paths.src)
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.path(&self.paths.dist)
    }

    /// CSS bundle file set for a mode. Unregistered modes are an error.
    pub fn css_files(&self, mode: &Mode) -> Result<&FileSet, ConfigError> {
        self.styles
            .files
            .get(mode.as_str())
            .ok_or_else(|| ConfigError::UnknownMode(mode.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_production_css_adds_normalize_only() {
        let config = Config::default_config(".");
        let dev = config.css_files(&Mode::Development).unwrap();
        let prod = config.css_files(&Mode::Production).unwrap();

        assert_eq!(prod.len(), dev.len() + 1);
        assert_eq!(
            prod.patterns(),
            &[
                "src/css/banner.css".to_string(),
                "src/bower_components/normalize.css/normalize.css".to_string(),
                "src/css/style.css".to_string(),
            ]
        );
        let without_normalize: Vec<&String> = prod
            .patterns()
            .iter()
            .filter(|p| !p.contains("normalize"))
            .collect();
        assert_eq!(without_normalize, dev.patterns().iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_unknown_mode_lookup_fails() {
        let config = Config::default_config(".");
        let err = config.css_files(&Mode::parse("XYZ")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMode(ref m) if m == "XYZ"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
[scripts]
output = "public/app.min.js"

[livereload]
port = 4000
"#,
        )
        .unwrap();

        assert_eq!(config.scripts.output, "public/app.min.js");
        assert_eq!(config.scripts.files.len(), 4);
        assert_eq!(config.livereload.port, 4000);
        assert_eq!(config.watches.len(), 3);
        assert_eq!(config.styles.entry, "src/css/styles/style.css");
    }

    #[test]
    fn test_invalid_browser_rejected() {
        let err = Config::from_toml(
            r#"
[styles.browsers]
ie = "eight"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid browser target"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.root, dir.path());
        assert_eq!(config.dist_dir(), dir.path().join("dist"));
    }
}
