use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use regex::Regex;
use serde_json::Value;

use super::Detector;
use crate::purl::Purl;

/// npm packages from `package-lock.json`, `yarn.lock`, or as a last resort
/// the direct dependencies in `package.json`.
pub struct NpmDetector;

impl Detector for NpmDetector {
    fn name(&self) -> &'static str {
        "npm"
    }

    fn detect(&self, dir: &Path) -> Result<Vec<Purl>> {
        let mut purls: Vec<Purl> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut push_all = |parsed: Vec<Purl>| {
            for purl in parsed {
                if seen.insert(purl.to_string()) {
                    purls.push(purl);
                }
            }
        };

        let lock = dir.join("package-lock.json");
        if lock.exists() {
            push_all(parse_package_lock_json(&std::fs::read_to_string(&lock)?)?);
        }

        let yarn = dir.join("yarn.lock");
        if yarn.exists() {
            push_all(parse_yarn_lock(&std::fs::read_to_string(&yarn)?)?);
        }

        let manifest = dir.join("package.json");
        if manifest.exists() && !lock.exists() && !yarn.exists() {
            push_all(parse_package_json(&std::fs::read_to_string(&manifest)?)?);
        }

        Ok(purls)
    }
}

/// `@scope/name` → (`@scope`, `name`).
fn npm_purl(full_name: &str, version: Option<&str>) -> Purl {
    match full_name.rsplit_once('/') {
        Some((scope, name)) if scope.starts_with('@') => Purl::new("npm", Some(scope), name, version),
        _ => Purl::new("npm", None, full_name, version),
    }
}

/// `package-lock.json` v2/v3 (the `packages` map), falling back to the v1
/// `dependencies` map.
fn parse_package_lock_json(content: &str) -> Result<Vec<Purl>> {
    let json: Value = serde_json::from_str(content)?;
    let mut purls = Vec::new();

    if let Some(packages) = json.get("packages").and_then(|v| v.as_object()) {
        for (pkg_path, info) in packages {
            // The root project has an empty key; symlinked workspace members are not published.
            if pkg_path.is_empty() || info.get("link").and_then(|v| v.as_bool()).unwrap_or(false) {
                continue;
            }
            let Some(version) = info.get("version").and_then(|v| v.as_str()) else {
                continue;
            };
            // "node_modules/a/node_modules/@scope/b" → "@scope/b"
            let name = match pkg_path.rfind("node_modules/") {
                Some(idx) => &pkg_path[idx + "node_modules/".len()..],
                None => pkg_path.as_str(),
            };
            purls.push(npm_purl(name, Some(version)));
        }
    } else if let Some(deps) = json.get("dependencies").and_then(|v| v.as_object()) {
        for (name, info) in deps {
            let version = info.get("version").and_then(|v| v.as_str());
            purls.push(npm_purl(name, version));
        }
    }

    Ok(purls)
}

/// `yarn.lock` v1, a custom line-based format.
fn parse_yarn_lock(content: &str) -> Result<Vec<Purl>> {
    let mut purls = Vec::new();
    let mut lines = content.lines().peekable();

    // Header like: "foo@^1.0.0:" or "@scope/foo@^1.0.0, @scope/foo@^1.1.0:"
    let header_re = Regex::new(r#"^"?(@?[^@"]+)@[^:"]+"?:$"#)?;
    let version_re = Regex::new(r#"^\s+version\s+"([^"]+)""#)?;

    while let Some(line) = lines.next() {
        if line.is_empty() || line.starts_with('#') || line.starts_with(' ') || line.starts_with('\t') {
            continue;
        }

        let trimmed = line.trim_end_matches(':').trim_matches('"');
        let first_spec = trimmed.split(", ").next().unwrap_or(trimmed).trim_matches('"');
        let header = format!("{}:", first_spec);
        let Some(caps) = header_re.captures(&header) else {
            continue;
        };
        let name = caps[1].to_string();

        while let Some(next) = lines.peek() {
            if next.is_empty() {
                break;
            }
            if let Some(vcaps) = version_re.captures(next) {
                purls.push(npm_purl(&name, Some(&vcaps[1])));
                lines.next();
                break;
            }
            lines.next();
        }
    }

    Ok(purls)
}

/// `package.json` `dependencies`. Only exact versions are kept; ranges
/// resolve to the latest release.
fn parse_package_json(content: &str) -> Result<Vec<Purl>> {
    let json: Value = serde_json::from_str(content)?;
    let mut purls = Vec::new();

    if let Some(deps) = json.get("dependencies").and_then(|v| v.as_object()) {
        for (name, range) in deps {
            let range = range.as_str().unwrap_or("");
            let exact = !range.is_empty()
                && range
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'));
            purls.push(npm_purl(name, exact.then_some(range)));
        }
    }

    Ok(purls)
}
