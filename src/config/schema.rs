//! Configuration schema definitions

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An ordered list of path patterns, relative to the project root.
///
/// Order matters: bundles concatenate matches in pattern order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSet(pub Vec<String>);

impl FileSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(patterns.into_iter().map(Into::into).collect())
    }

    pub fn patterns(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Source and output roots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Source tree
    #[serde(default = "default_src")]
    pub src: String,

    /// Build artifacts
    #[serde(default = "default_dist")]
    pub dist: String,

    /// Scratch directory, removed by `clean`
    #[serde(default = "default_tmp")]
    pub tmp: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            src: default_src(),
            dist: default_dist(),
            tmp: default_tmp(),
        }
    }
}

fn default_src() -> String {
    "src".to_string()
}

fn default_dist() -> String {
    "dist".to_string()
}

fn default_tmp() -> String {
    ".tmp".to_string()
}

/// JS bundle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Sources concatenated into the bundle, in order
    #[serde(default = "default_script_files")]
    pub files: FileSet,

    /// Bundle output path
    #[serde(default = "default_script_output")]
    pub output: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            files: default_script_files(),
            output: default_script_output(),
        }
    }
}

fn default_script_files() -> FileSet {
    FileSet::new([
        "src/bower_components/modernizr/modernizr.js",
        "src/js/lib/conditionizr-4.3.0.min.js",
        "src/bower_components/jquery/dist/jquery.js",
        "src/js/scripts.js",
    ])
}

fn default_script_output() -> String {
    "dist/js/scripts.min.js".to_string()
}

/// Style transform and CSS bundle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Entry stylesheet of the transform chain
    #[serde(default = "default_style_entry")]
    pub entry: String,

    /// Where the transformed stylesheet is written
    #[serde(default = "default_style_compiled")]
    pub compiled: String,

    /// Emit an inline source map after the transformed stylesheet
    #[serde(default = "default_true")]
    pub source_map: bool,

    /// Theme stylesheet produced by the `styles` bundle
    #[serde(default = "default_style_output")]
    pub output: String,

    /// Bundle file sets keyed by mode name
    #[serde(default = "default_style_files")]
    pub files: HashMap<String, FileSet>,

    /// Minimum browser versions for prefixing and syntax lowering
    #[serde(default = "default_browsers")]
    pub browsers: HashMap<String, String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            entry: default_style_entry(),
            compiled: default_style_compiled(),
            source_map: true,
            output: default_style_output(),
            files: default_style_files(),
            browsers: default_browsers(),
        }
    }
}

fn default_style_entry() -> String {
    "src/css/styles/style.css".to_string()
}

fn default_style_compiled() -> String {
    "src/css/style.css".to_string()
}

fn default_style_output() -> String {
    "src/style.css".to_string()
}

fn default_style_files() -> HashMap<String, FileSet> {
    let mut files = HashMap::new();
    files.insert(
        "development".to_string(),
        FileSet::new(["src/css/banner.css", "src/css/style.css"]),
    );
    files.insert(
        "production".to_string(),
        FileSet::new([
            "src/css/banner.css",
            "src/bower_components/normalize.css/normalize.css",
            "src/css/style.css",
        ]),
    );
    files
}

fn default_browsers() -> HashMap<String, String> {
    [
        ("ie", "8"),
        ("safari", "5"),
        ("opera", "12"),
        ("android", "2.3"),
        ("ios_saf", "6"),
    ]
    .into_iter()
    .map(|(name, version)| (name.to_string(), version.to_string()))
    .collect()
}

fn default_true() -> bool {
    true
}

/// Static asset copy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Directory the destination tree mirrors
    #[serde(default = "default_src")]
    pub base: String,

    /// Assets to copy
    #[serde(default = "default_copy_files")]
    pub files: FileSet,

    /// Destination root
    #[serde(default = "default_dist")]
    pub dest: String,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            base: default_src(),
            files: default_copy_files(),
            dest: default_dist(),
        }
    }
}

fn default_copy_files() -> FileSet {
    FileSet::new([
        "src/*.{php,png,css}",
        "src/modules/*.php",
        "src/img/**/*.{jpg,png,svg,gif,webp,ico}",
        "src/fonts/*.{woff,woff2,ttf,otf,eot,svg}",
        "src/languages/*.{po,mo,pot}",
    ])
}

/// Script lint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintConfig {
    /// Scripts to check
    #[serde(default = "default_lint_include")]
    pub include: FileSet,

    /// Third-party scripts that are never checked
    #[serde(default = "default_lint_exclude")]
    pub exclude: FileSet,

    /// Maximum line length, unchecked when unset
    #[serde(default)]
    pub max_line_length: Option<usize>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            include: default_lint_include(),
            exclude: default_lint_exclude(),
            max_line_length: None,
        }
    }
}

fn default_lint_include() -> FileSet {
    FileSet::new(["src/js/**/*.js"])
}

fn default_lint_exclude() -> FileSet {
    FileSet::new(["src/js/lib/**"])
}

/// Debug-flag template configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Template source
    #[serde(default = "default_template_source")]
    pub source: String,

    /// Directory the rendered template is written to
    #[serde(default = "default_template_dest")]
    pub dest: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            source: default_template_source(),
            dest: default_template_dest(),
        }
    }
}

fn default_template_source() -> String {
    "src/dev-templates/is-debug.php".to_string()
}

fn default_template_dest() -> String {
    "src/modules".to_string()
}

/// Live-reload server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveReloadConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    35729
}

/// A set of watched paths and what a change to them triggers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Paths to watch
    pub patterns: FileSet,

    /// Paths matched by `patterns` that are ignored
    #[serde(default)]
    pub exclude: FileSet,

    /// Tasks to rerun on change
    #[serde(default)]
    pub tasks: Vec<String>,

    /// Notify live-reload clients on change
    #[serde(default)]
    pub reload: bool,
}

pub(crate) fn default_watches() -> Vec<WatchConfig> {
    vec![
        WatchConfig {
            patterns: FileSet::new([
                "src/js/**/*.js",
                "src/*.php",
                "src/css/styles/**/*.css",
            ]),
            exclude: FileSet::default(),
            tasks: Vec::new(),
            reload: true,
        },
        WatchConfig {
            patterns: FileSet::new(["src/css/styles/**/*.css"]),
            exclude: FileSet::default(),
            tasks: vec!["styles".to_string()],
            reload: false,
        },
        WatchConfig {
            patterns: default_lint_include(),
            exclude: default_lint_exclude(),
            tasks: vec!["jshint".to_string()],
            reload: false,
        },
    ]
}

/// Dependency pinning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShrinkwrapConfig {
    /// Manifest rewritten in place
    #[serde(default = "default_manifest")]
    pub manifest: String,

    /// Installed packages, consulted for exact versions
    #[serde(default = "default_modules_dir")]
    pub modules_dir: String,
}

impl Default for ShrinkwrapConfig {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            modules_dir: default_modules_dir(),
        }
    }
}

fn default_manifest() -> String {
    "package.json".to_string()
}

fn default_modules_dir() -> String {
    "node_modules".to_string()
}
