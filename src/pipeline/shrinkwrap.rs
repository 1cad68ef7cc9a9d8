//! Pin package manifest dependencies to exact versions

use std::fs;
use std::path::{Path, PathBuf};

use semver::{Op, Version, VersionReq};
use serde_json::Value;
use tracing::{debug, warn};

use super::PipelineError;
use crate::config::Config;

const SECTIONS: [&str; 2] = ["dependencies", "devDependencies"];

/// A dependency whose specifier was rewritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pinned {
    pub name: String,
    pub from: String,
    pub to: String,
}

/// Version of an installed package, if it is installed
fn installed_version(modules_dir: &Path, name: &str) -> Option<String> {
    let manifest = modules_dir.join(name).join("package.json");
    let content = fs::read_to_string(manifest).ok()?;
    let value: Value = serde_json::from_str(&content).ok()?;
    let version = value.get("version")?.as_str()?;
    Version::parse(version).ok().map(|v| v.to_string())
}

/// Exact version implied by a single `^x.y.z`, `~x.y.z` or `=x.y.z` range
fn range_base(spec: &str) -> Option<String> {
    if let Ok(version) = Version::parse(spec) {
        return Some(version.to_string());
    }

    let req = VersionReq::parse(spec).ok()?;
    let [comparator] = req.comparators.as_slice() else {
        return None;
    };
    if !matches!(comparator.op, Op::Caret | Op::Tilde | Op::Exact) {
        return None;
    }
    let version = Version {
        major: comparator.major,
        minor: comparator.minor?,
        patch: comparator.patch?,
        pre: comparator.pre.clone(),
        build: Default::default(),
    };
    Some(version.to_string())
}

/// Rewrite the dependency sections of a manifest document in place
pub fn pin_manifest(manifest: &mut Value, modules_dir: &Path) -> Vec<Pinned> {
    let mut pinned = Vec::new();

    for section in SECTIONS {
        let Some(deps) = manifest.get_mut(section).and_then(Value::as_object_mut) else {
            continue;
        };

        for (name, spec) in deps.iter_mut() {
            let Some(current) = spec.as_str().map(str::to_string) else {
                continue;
            };

            let exact = installed_version(modules_dir, name).or_else(|| range_base(&current));
            match exact {
                Some(exact) if exact != current => {
                    debug!("Pinned {} {} -> {}", name, current, exact);
                    *spec = Value::String(exact.clone());
                    pinned.push(Pinned {
                        name: name.clone(),
                        from: current,
                        to: exact,
                    });
                }
                Some(_) => {}
                None => warn!("Leaving {} at '{}': no exact version known", name, current),
            }
        }
    }

    pinned
}

/// Pin the configured manifest and write it back
pub fn shrinkwrap(config: &Config) -> Result<(PathBuf, Vec<Pinned>), PipelineError> {
    let path = config.path(&config.shrinkwrap.manifest);
    let manifest_error = |message: String| PipelineError::Manifest {
        path: config.shrinkwrap.manifest.clone(),
        message,
    };

    let content = fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
    let mut manifest: Value = serde_json::from_str(&content).map_err(|e| manifest_error(e.to_string()))?;
    if !manifest.is_object() {
        return Err(manifest_error("expected a JSON object".to_string()));
    }

    let pinned = pin_manifest(&mut manifest, &config.path(&config.shrinkwrap.modules_dir));

    let mut output = serde_json::to_string_pretty(&manifest).map_err(|e| manifest_error(e.to_string()))?;
    output.push('\n');
    fs::write(&path, output).map_err(|e| PipelineError::io(&path, e))?;

    Ok((path, pinned))
}
