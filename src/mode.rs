//! Build mode resolution
//!
//! The mode decides which CSS file set is bundled, whether bundles are
//! minified and how templates are rendered. It is resolved once per
//! invocation and then passed by value to every task.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Only plain alphabetic names are accepted from `--env=<name>`
static ENV_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]+$").expect("valid regex"));

/// Build mode of a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Development,
    Production,
    /// Any other name given on the command line, kept verbatim
    Other(String),
}

impl Mode {
    /// Map a mode name to a mode. Unknown names are not rejected.
    pub fn parse(name: &str) -> Self {
        match name {
            "development" => Mode::Development,
            "production" => Mode::Production,
            other => Mode::Other(other.to_string()),
        }
    }

    /// Resolve the mode from the values of every `--env` flag, in command-line order.
    ///
    /// The first value that looks like a mode name wins; without one the
    /// mode is `development`.
    pub fn from_env_flags<S: AsRef<str>>(values: &[S]) -> Self {
        values
            .iter()
            .map(AsRef::as_ref)
            .find(|value| ENV_NAME.is_match(value))
            .map(Mode::parse)
            .unwrap_or_default()
    }

    /// Resolve the mode by scanning raw process arguments for `--env=<name>`
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: Vec<String> = args
            .into_iter()
            .filter_map(|arg| arg.as_ref().strip_prefix("--env=").map(str::to_string))
            .collect();
        Self::from_env_flags(&values)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
            Mode::Other(name) => name,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
