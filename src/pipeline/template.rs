//! Template rendering for the debug-flag partial

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{write_output, PipelineError};
use crate::config::Config;
use crate::mode::Mode;

/// `<%= name %>` and `<%- name %>` interpolations
static INTERPOLATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<%[=-]\s*([A-Za-z_$][\w$]*)\s*%>").expect("valid regex"));

/// Variables available to the debug template
pub fn variables(mode: &Mode) -> HashMap<&'static str, String> {
    let is_debug = if mode.is_production() { "false" } else { "true" };
    HashMap::from([("is_debug", is_debug.to_string())])
}

/// Substitute every interpolation. Undefined variables are an error.
pub fn render(template: &str, vars: &HashMap<&str, String>, file: &str) -> Result<String, PipelineError> {
    let mut missing = None;
    let rendered = INTERPOLATION.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match vars.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(PipelineError::UndefinedVariable {
            file: file.to_string(),
            name,
        }),
        None => Ok(rendered.into_owned()),
    }
}

/// Render the configured template for a mode and write it to the destination
pub fn render_debug_template(config: &Config, mode: &Mode) -> Result<PathBuf, PipelineError> {
    let source = config.path(&config.template.source);
    let template = fs::read_to_string(&source).map_err(|e| PipelineError::io(&source, e))?;

    let rendered = render(&template, &variables(mode), &config.template.source)?;

    let file_name = source.file_name().unwrap_or_default();
    let output = config.path(&config.template.dest).join(file_name);
    write_output(&output, &rendered)?;

    Ok(output)
}
