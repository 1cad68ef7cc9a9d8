//! Script bundle: concatenate and minify

use std::path::PathBuf;

use tracing::debug;

use super::{concat, expand, write_output, PipelineError};
use crate::config::Config;

/// Concatenate the script sources in order, minify and write the bundle
pub fn bundle(config: &Config) -> Result<PathBuf, PipelineError> {
    let sources = expand(&config.root, &config.scripts.files)?;
    debug!("Bundling {} script(s)", sources.len());

    let code = concat(&sources)?;
    let minified = minify(&code);

    let output = config.path(&config.scripts.output);
    write_output(&output, &minified)?;

    Ok(output)
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Keywords after which a `/` starts a regular expression literal
const REGEX_KEYWORDS: [&str; 14] = [
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do", "else",
    "yield", "await",
];

/// Whether a `/` following the code in `before` starts a regular
/// expression literal rather than a division
pub(crate) fn regex_allowed(before: &str) -> bool {
    let before = before.trim_end();
    let Some(last) = before.chars().last() else {
        return true;
    };

    if !is_word(last) {
        return "(,=:[!&|?{};+-*%<>~^".contains(last);
    }

    let start = before
        .char_indices()
        .rev()
        .take_while(|&(_, c)| is_word(c))
        .last()
        .map_or(0, |(i, _)| i);
    // `a.return / 2` is a member access
    !before[..start].trim_end().ends_with('.') && REGEX_KEYWORDS.contains(&&before[start..])
}

/// Minify JavaScript by dropping comments and collapsing whitespace.
///
/// Strings, template literals and regular expression literals are copied
/// verbatim. A line break is kept where removing it could change how
/// statements are split.
pub fn minify(code: &str) -> String {
    let mut result = String::with_capacity(code.len());
    let chars: Vec<char> = code.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        // Comments
        if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && next == Some('*') {
            i += 2;
            let mut newline = false;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                newline |= chars[i] == '\n';
                i += 1;
            }
            i += 2;
            // A block comment spanning lines still separates statements
            push_break(&mut result, &chars, i, newline);
            continue;
        }

        // Strings and template literals
        if c == '"' || c == '\'' || c == '`' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i += 1;
            result.extend(&chars[start..i.min(chars.len())]);
            continue;
        }

        // Regular expression literals
        if c == '/' && regex_allowed(&result) {
            let start = i;
            let mut in_class = false;
            i += 1;
            while i < chars.len() && chars[i] != '\n' {
                match chars[i] {
                    '\\' => i += 1,
                    '[' => in_class = true,
                    ']' => in_class = false,
                    '/' if !in_class => break,
                    _ => {}
                }
                i += 1;
            }
            i += 1;
            // Flags
            while i < chars.len() && is_word(chars[i]) {
                i += 1;
            }
            result.extend(&chars[start..i.min(chars.len())]);
            continue;
        }

        if c.is_whitespace() {
            let mut newline = false;
            while i < chars.len() && chars[i].is_whitespace() {
                newline |= chars[i] == '\n';
                i += 1;
            }
            push_break(&mut result, &chars, i, newline);
            continue;
        }

        result.push(c);
        i += 1;
    }

    result.trim().to_string()
}

/// Emit the smallest separator that keeps the tokens around position `at` apart
fn push_break(result: &mut String, chars: &[char], at: usize, newline: bool) {
    let (Some(prev), Some(next)) = (result.chars().last(), chars.get(at).copied()) else {
        return;
    };
    if prev == ' ' || prev == '\n' {
        return;
    }

    if newline && !"{;,(".contains(prev) && !"});,.".contains(next) {
        result.push('\n');
    } else if (is_word(prev) && is_word(next)) || (prev == '+' && next == '+') || (prev == '-' && next == '-') {
        result.push(' ');
    }
}
