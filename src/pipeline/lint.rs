//! Script lint
//!
//! A small set of correctness and style rules over the project's own
//! scripts. Third-party code under the excluded paths is never checked.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use colored::Colorize;
use once_cell::sync::Lazy;
use regex::Regex;

use super::scripts::regex_allowed;
use super::{expand_excluding, relative_key, PipelineError};
use crate::config::{Config, LintConfig};

static DEBUGGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bdebugger\b").expect("valid regex"));

/// A single rule violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub line: usize,
    pub column: usize,
    pub rule: &'static str,
    pub message: String,
}

/// Violations of one file
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub violations: Vec<Violation>,
}

/// Result of linting a file set
#[derive(Debug, Clone, Default)]
pub struct LintReport {
    /// Number of files checked
    pub checked: usize,

    /// Files with at least one violation
    pub files: Vec<FileReport>,
}

impl LintReport {
    pub fn violation_count(&self) -> usize {
        self.files.iter().map(|f| f.violations.len()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.files.is_empty()
    }

    /// Turn the report into the task result: any violation fails
    pub fn into_result(self) -> Result<Self, PipelineError> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(PipelineError::LintFailed {
                violations: self.violation_count(),
                files: self.files.len(),
            })
        }
    }

    /// Human-readable report grouped by file
    pub fn stylish(&self, root: &Path) -> String {
        let mut out = String::new();
        for file in &self.files {
            let name = relative_key(root, &file.path).unwrap_or_else(|| file.path.display().to_string());
            let _ = writeln!(out, "\n{}", name.underline());
            for v in &file.violations {
                let _ = writeln!(
                    out,
                    "  {}  {}  {}",
                    format!("line {} col {}", v.line, v.column).dimmed(),
                    v.message,
                    format!("({})", v.rule).dimmed()
                );
            }
        }
        if !self.is_clean() {
            let _ = writeln!(
                out,
                "\n{} {} problem(s)",
                "✖".red(),
                self.violation_count()
            );
        }
        out
    }
}

/// Lint every configured script
pub fn lint(config: &Config) -> Result<LintReport, PipelineError> {
    let files = expand_excluding(&config.root, &config.lint.include, &config.lint.exclude)?;
    let mut report = LintReport {
        checked: files.len(),
        files: Vec::new(),
    };

    for path in files {
        let source = fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
        let violations = check_source(&source, &config.lint);
        if !violations.is_empty() {
            report.files.push(FileReport { path, violations });
        }
    }

    Ok(report)
}

/// Check one script
pub fn check_source(source: &str, rules: &LintConfig) -> Vec<Violation> {
    let masked = mask(source);
    let mut violations = Vec::new();

    for (index, (raw, code)) in source.lines().zip(masked.lines()).enumerate() {
        let line = index + 1;

        let indent: String = raw.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
        if indent.contains(' ') && indent.contains('\t') {
            violations.push(Violation {
                line,
                column: 1,
                rule: "mixed-indent",
                message: "Mixed spaces and tabs.".to_string(),
            });
        }

        let trimmed = raw.trim_end_matches([' ', '\t']);
        if trimmed.len() != raw.len() {
            violations.push(Violation {
                line,
                column: trimmed.chars().count() + 1,
                rule: "trailing-whitespace",
                message: "Trailing whitespace.".to_string(),
            });
        }

        for (column, op) in loose_equality(code) {
            violations.push(Violation {
                line,
                column,
                rule: "eqeqeq",
                message: format!("Expected '{}=' and instead saw '{}'.", op, op),
            });
        }

        for m in DEBUGGER.find_iter(code) {
            violations.push(Violation {
                line,
                column: code[..m.start()].chars().count() + 1,
                rule: "no-debugger",
                message: "Forgotten 'debugger' statement?".to_string(),
            });
        }

        if let Some(max) = rules.max_line_length {
            let length = raw.chars().count();
            if length > max {
                violations.push(Violation {
                    line,
                    column: max + 1,
                    rule: "max-len",
                    message: format!("Line is too long ({} > {}).", length, max),
                });
            }
        }
    }

    violations.sort_by_key(|v| (v.line, v.column));
    violations
}

/// Positions of `==` and `!=` that are not part of `===`/`!==`
fn loose_equality(code: &str) -> Vec<(usize, &'static str)> {
    let chars: Vec<char> = code.chars().collect();
    let mut found = Vec::new();
    let mut i = 0;

    while i + 1 < chars.len() {
        let pair = (chars[i], chars[i + 1]);
        let strict = chars.get(i + 2) == Some(&'=');
        match pair {
            ('=', '=') | ('!', '=') if !strict => {
                let preceded = i > 0 && "=!<>".contains(chars[i - 1]) && pair.0 == '=';
                if !preceded {
                    found.push((i + 1, if pair.0 == '=' { "==" } else { "!=" }));
                }
                i += 2;
            }
            ('=', '=') | ('!', '=') => i += 3,
            _ => i += 1,
        }
    }

    found
}

/// Blank out comments and the contents of string, template and regular
/// expression literals so rules only see code. Line breaks are kept.
fn mask(source: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Quoted(char),
        Regex { in_class: bool },
    }

    let mut out = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    state = State::LineComment;
                    out.push(' ');
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = State::BlockComment;
                    chars.next();
                    out.push_str("  ");
                }
                '"' | '\'' | '`' => {
                    state = State::Quoted(c);
                    out.push(c);
                }
                '/' if regex_allowed(&out) => {
                    state = State::Regex { in_class: false };
                    out.push(c);
                }
                _ => out.push(c),
            },
            State::Regex { in_class } => match c {
                '\\' => {
                    out.push(' ');
                    if let Some(escaped) = chars.next() {
                        out.push(if escaped == '\n' { '\n' } else { ' ' });
                    }
                }
                '[' => {
                    state = State::Regex { in_class: true };
                    out.push(' ');
                }
                ']' => {
                    state = State::Regex { in_class: false };
                    out.push(' ');
                }
                '/' if !in_class => {
                    state = State::Code;
                    out.push(c);
                }
                '\n' => {
                    state = State::Code;
                    out.push(c);
                }
                _ => out.push(' '),
            },
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                    out.push_str("  ");
                } else {
                    out.push(if c == '\n' { '\n' } else { ' ' });
                }
            }
            State::Quoted(quote) => {
                if c == '\\' {
                    out.push(' ');
                    if let Some(escaped) = chars.next() {
                        out.push(if escaped == '\n' { '\n' } else { ' ' });
                    }
                } else if c == quote {
                    state = State::Code;
                    out.push(c);
                } else if c == '\n' {
                    // Unterminated string literals end at the line break
                    if quote != '`' {
                        state = State::Code;
                    }
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::touch;
    use pretty_assertions::assert_eq;

    fn rules() -> LintConfig {
        LintConfig::default()
    }

    fn rule_names(source: &str) -> Vec<&'static str> {
        check_source(source, &rules()).into_iter().map(|v| v.rule).collect()
    }

    #[test]
    fn test_clean_source() {
        let source = "var a = 1;\nif (a === 1 && a !== 2) {\n\tconsole.log(\"a == b\"); // a != b\n}\n";
        assert!(check_source(source, &rules()).is_empty());
    }

    #[test]
    fn test_loose_equality() {
        let violations = check_source("if (a == b || c != d) {}\n", &rules());
        assert_eq!(
            violations,
            vec![
                Violation {
                    line: 1,
                    column: 7,
                    rule: "eqeqeq",
                    message: "Expected '===' and instead saw '=='.".to_string(),
                },
                Violation {
                    line: 1,
                    column: 17,
                    rule: "eqeqeq",
                    message: "Expected '!==' and instead saw '!='.".to_string(),
                },
            ]
        );
        assert!(rule_names("a <= b; a >= b;").is_empty());
    }

    #[test]
    fn test_whitespace_rules() {
        assert_eq!(rule_names("var a = 1; \n"), vec!["trailing-whitespace"]);
        assert_eq!(rule_names(" \tvar a = 1;\n"), vec!["mixed-indent"]);
    }

    #[test]
    fn test_debugger_outside_comments_only() {
        assert_eq!(rule_names("debugger;\n"), vec!["no-debugger"]);
        assert!(rule_names("/* debugger; */\nvar s = 'debugger';\n").is_empty());
    }

    #[test]
    fn test_quotes_inside_regex_literals() {
        assert_eq!(
            rule_names("var q = /'/g; if (a == b) { debugger; }\n"),
            vec!["eqeqeq", "no-debugger"]
        );
        assert!(rule_names("var q = /[\"/]==/.test(s) ? 'debugger' : total / 2;\n").is_empty());
    }

    #[test]
    fn test_max_line_length() {
        let config = LintConfig {
            max_line_length: Some(10),
            ..LintConfig::default()
        };
        let violations = check_source("var short;\nvar much_longer = 1;\n", &config);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line, 2);
        assert_eq!(violations[0].rule, "max-len");
    }

    #[test]
    fn test_library_directory_is_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/js/scripts.js", "var ok = 1;\n");
        touch(root, "src/js/parts/menu.js", "var open = false;\n");
        touch(root, "src/js/lib/vendor.js", "if (a == b) { debugger; }\n");

        let config = Config::default_config(root);
        let report = lint(&config).unwrap();
        assert_eq!(report.checked, 2);
        assert!(report.is_clean());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_violation_fails_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/js/scripts.js", "if (a == b) {}\n");
        touch(root, "src/js/lib/vendor.js", "if (a == b) {}\n");

        let config = Config::default_config(root);
        let report = lint(&config).unwrap();
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].path, root.join("src/js/scripts.js"));
        assert!(report.stylish(root).contains("src/js/scripts.js"));

        let err = report.into_result().unwrap_err();
        assert!(matches!(err, PipelineError::LintFailed { violations: 1, files: 1 }));
    }
}
