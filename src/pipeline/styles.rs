//! Stylesheet steps: the transform chain and the theme stylesheet bundle
//!
//! The transform chain runs on one entry stylesheet, in this order:
//! import resolution, nesting flattening and vendor prefixing for the
//! configured browsers. The result is written beside the sources with an
//! inline source map.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use base64::Engine as _;
use lightningcss::bundler::{Bundler, FileProvider, ResolveResult, SourceProvider};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use thiserror::Error;
use tracing::{debug, info};

use super::{concat, expand, write_output, PipelineError};
use crate::config::{Config, ConfigError};
use crate::mode::Mode;

/// Errors raised by the style transform chain
#[derive(Debug, Error)]
pub enum StyleError {
    #[error("{0}")]
    Bundle(String),

    #[error("{0}")]
    Transform(String),

    #[error("failed to print stylesheet: {0}")]
    Print(String),

    #[error("failed to encode source map: {0}")]
    SourceMap(String),

    #[error(transparent)]
    Io(#[from] PipelineError),
}

/// Parse a `major[.minor[.patch]]` browser version into the packed form
/// lightningcss expects.
pub fn parse_browser_version(version: &str) -> Option<u32> {
    let mut parts = version.trim().split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().map_or(Ok(0), str::parse).ok()?;
    let patch: u32 = parts.next().map_or(Ok(0), str::parse).ok()?;
    if parts.next().is_some() || major > 0xff_ff || minor > 0xff || patch > 0xff {
        return None;
    }
    Some(major << 16 | minor << 8 | patch)
}

/// Build browser targets from `name = "version"` pairs
pub fn browser_targets(browsers: &HashMap<String, String>) -> Result<Browsers, ConfigError> {
    let mut targets = Browsers::default();

    for (name, version) in browsers {
        let invalid = || ConfigError::InvalidBrowser {
            name: name.clone(),
            version: version.clone(),
        };
        let packed = parse_browser_version(version).ok_or_else(invalid)?;
        let slot = match name.as_str() {
            "android" => &mut targets.android,
            "chrome" => &mut targets.chrome,
            "edge" => &mut targets.edge,
            "firefox" => &mut targets.firefox,
            "ie" => &mut targets.ie,
            "ios" | "ios_saf" => &mut targets.ios_saf,
            "opera" => &mut targets.opera,
            "safari" => &mut targets.safari,
            "samsung" => &mut targets.samsung,
            _ => return Err(invalid()),
        };
        // Oldest version wins when a browser is listed twice
        *slot = Some(slot.map_or(packed, |current| current.min(packed)));
    }

    Ok(targets)
}

fn targets(config: &Config) -> Result<Targets, StyleError> {
    let browsers = browser_targets(&config.styles.browsers).map_err(|e| StyleError::Transform(e.to_string()))?;
    Ok(Targets::from(browsers))
}

/// Run the transform chain on the entry stylesheet and write the result.
pub fn compile(config: &Config) -> Result<PathBuf, StyleError> {
    let entry = config.path(&config.styles.entry);
    let output = config.path(&config.styles.compiled);

    if !entry.is_file() {
        return Err(PipelineError::MissingSource(entry).into());
    }

    let css = transform(config, &entry)?;
    write_output(&output, &css)?;
    info!("Compiled {}", output.display());

    Ok(output)
}

/// Reads stylesheets for the bundler and rejects suffix nesting such as
/// `&__elem`, which CSS nesting does not concatenate onto the parent
struct CheckedProvider {
    files: FileProvider,
}

impl SourceProvider for CheckedProvider {
    type Error = io::Error;

    fn read<'a>(&'a self, file: &Path) -> Result<&'a str, Self::Error> {
        let source = self.files.read(file)?;
        if let Some((line, selector)) = find_suffix_nesting(source) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}:{}: unsupported suffix nesting `{}`", file.display(), line, selector),
            ));
        }
        Ok(source)
    }

    fn resolve(&self, specifier: &str, originating_file: &Path) -> Result<ResolveResult, Self::Error> {
        self.files.resolve(specifier, originating_file)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// First `&` glued to an identifier, outside comments and strings
fn find_suffix_nesting(source: &str) -> Option<(usize, String)> {
    let mut line = 1;
    let mut quote: Option<char> = None;
    let mut in_comment = false;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
        }
        if in_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_comment = false;
            }
            continue;
        }
        if let Some(q) = quote {
            if c == '\\' {
                chars.next();
            } else if c == q || c == '\n' {
                quote = None;
            }
            continue;
        }
        match c {
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                in_comment = true;
            }
            '"' | '\'' => quote = Some(c),
            '&' if chars.peek().copied().is_some_and(is_ident_char) => {
                let suffix: String = chars.clone().take_while(|&n| is_ident_char(n)).collect();
                return Some((line, format!("&{}", suffix)));
            }
            _ => {}
        }
    }

    None
}

fn transform(config: &Config, entry: &Path) -> Result<String, StyleError> {
    let provider = CheckedProvider {
        files: FileProvider::new(),
    };
    let mut source_map = SourceMap::new(&config.root.to_string_lossy());

    let mut stylesheet = {
        let mut bundler = Bundler::new(&provider, Some(&mut source_map), ParserOptions::default());
        bundler
            .bundle(entry)
            .map_err(|e| StyleError::Bundle(e.to_string()))?
    };

    stylesheet
        .minify(MinifyOptions {
            targets: targets(config)?,
            ..MinifyOptions::default()
        })
        .map_err(|e| StyleError::Transform(e.to_string()))?;

    let with_map = config.styles.source_map;
    let printed = stylesheet
        .to_css(PrinterOptions {
            targets: targets(config)?,
            source_map: if with_map { Some(&mut source_map) } else { None },
            ..PrinterOptions::default()
        })
        .map_err(|e| StyleError::Print(e.to_string()))?;

    let mut css = printed.code;
    if with_map {
        let json = source_map
            .to_json(None)
            .map_err(|e| StyleError::SourceMap(format!("{:?}", e)))?;
        css.push_str(&inline_source_map(&json));
    }

    Ok(css)
}

/// Source map comment carrying the map itself
fn inline_source_map(json: &str) -> String {
    format!(
        "\n/*# sourceMappingURL=data:application/json;charset=utf-8;base64,{} */\n",
        base64::engine::general_purpose::STANDARD.encode(json)
    )
}

/// Minify a stylesheet
pub fn minify_css(source: &str, filename: &str) -> Result<String, StyleError> {
    let mut stylesheet = StyleSheet::parse(
        source,
        ParserOptions {
            filename: filename.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| StyleError::Transform(e.to_string()))?;

    stylesheet
        .minify(MinifyOptions::default())
        .map_err(|e| StyleError::Transform(e.to_string()))?;

    let printed = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| StyleError::Print(e.to_string()))?;

    Ok(printed.code)
}

/// Concatenate the mode's CSS file set into the theme stylesheet,
/// minifying it in production.
pub fn bundle(config: &Config, mode: &Mode) -> Result<PathBuf> {
    let files = config.css_files(mode)?;
    let sources = expand(&config.root, files)?;
    debug!("Bundling {} stylesheet(s)", sources.len());

    let mut css = concat(&sources)?;
    if mode.is_production() {
        css = minify_css(&css, &config.styles.output)?;
    }

    let output = config.path(&config.styles.output);
    write_output(&output, &css)?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::touch;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_browser_version() {
        assert_eq!(parse_browser_version("8"), Some(8 << 16));
        assert_eq!(parse_browser_version("2.3"), Some(2 << 16 | 3 << 8));
        assert_eq!(parse_browser_version("4.4.3"), Some(4 << 16 | 4 << 8 | 3));
        assert_eq!(parse_browser_version("last 2"), None);
        assert_eq!(parse_browser_version("1.2.3.4"), None);
    }

    #[test]
    fn test_browser_targets_keep_oldest() {
        let mut browsers = HashMap::new();
        browsers.insert("ios".to_string(), "6".to_string());
        browsers.insert("ie".to_string(), "8".to_string());
        let targets = browser_targets(&browsers).unwrap();

        assert_eq!(targets.ie, Some(8 << 16));
        assert_eq!(targets.ios_saf, Some(6 << 16));
        assert_eq!(targets.chrome, None);

        browsers.insert("netscape".to_string(), "4".to_string());
        assert!(browser_targets(&browsers).is_err());
    }

    #[test]
    fn test_compile_resolves_imports_and_flattens_nesting() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/css/styles/partials/base.css", ".base { margin: 0; }\n");
        touch(
            root,
            "src/css/styles/style.css",
            "@import \"partials/base.css\";\n.nav { user-select: none; & a { color: red; } }\n",
        );

        let config = Config::default_config(root);
        let output = compile(&config).unwrap();

        assert_eq!(output, root.join("src/css/style.css"));
        let css = fs::read_to_string(output).unwrap();
        assert!(css.contains(".base"));
        assert!(css.contains(".nav a"));
        assert!(!css.contains('&'));
        assert!(css.contains("-webkit-user-select"));
        assert!(css.contains("sourceMappingURL=data:application/json;charset=utf-8;base64,"));
    }

    #[test]
    fn test_compile_reports_broken_import() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/css/styles/style.css", "@import \"missing.css\";\n.a { color: red; }\n");

        let config = Config::default_config(root);
        let err = compile(&config).unwrap_err();

        assert!(matches!(err, StyleError::Bundle(_)));
        assert!(!root.join("src/css/style.css").exists());
    }

    fn theme(root: &Path) {
        touch(root, "src/css/banner.css", "/*\nTheme Name: Test\n*/");
        touch(root, "src/bower_components/normalize.css/normalize.css", "html { line-height: 1.15; }");
        touch(root, "src/css/style.css", ".site-header {\n  color: #ff0000;\n}");
    }

    #[test]
    fn test_compile_rejects_suffix_nesting() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/css/styles/style.css", "@import \"partials/block.css\";");
        touch(
            root,
            "src/css/styles/partials/block.css",
            "/* &ignored */\n.block {\n  color: blue;\n  &__elem { color: red; }\n}\n",
        );

        let config = Config::default_config(root);
        assert!(matches!(compile(&config), Err(StyleError::Bundle(_))));
        assert!(!root.join("src/css/style.css").exists());
    }

    #[test]
    fn test_find_suffix_nesting() {
        assert_eq!(
            find_suffix_nesting(".block {\n  &-mod { color: red; }\n}"),
            Some((2, "&-mod".to_string()))
        );
        assert_eq!(find_suffix_nesting(".a { & .b {} &:hover {} &.c {} }"), None);
        assert_eq!(find_suffix_nesting(".a::after { content: \"&amp\"; } /* &x */"), None);
    }

    #[test]
    fn test_development_bundle_is_plain_concatenation() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        theme(root);

        let config = Config::default_config(root);
        let output = bundle(&config, &Mode::Development).unwrap();
        let css = fs::read_to_string(output).unwrap();

        assert_eq!(css, "/*\nTheme Name: Test\n*/\n.site-header {\n  color: #ff0000;\n}");
    }

    #[test]
    fn test_production_bundle_includes_normalize_and_minifies() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        theme(root);

        let config = Config::default_config(root);
        let css = fs::read_to_string(bundle(&config, &Mode::Production).unwrap()).unwrap();

        let normalize = css.find("html").unwrap();
        let header = css.find(".site-header").unwrap();
        assert!(normalize < header);
        assert!(css.contains("color:red"));
        assert!(!css.contains("\n  "));
    }

    #[test]
    fn test_unknown_mode_bundle_fails() {
        let dir = tempfile::tempdir().unwrap();
        theme(dir.path());

        let config = Config::default_config(dir.path());
        let err = bundle(&config, &Mode::parse("staging")).unwrap_err();
        assert_eq!(err.to_string(), "no CSS file set registered for mode 'staging'");
    }
}
