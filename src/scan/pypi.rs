use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;

use super::Detector;
use crate::purl::Purl;

/// Python packages from `Pipfile.lock`, `requirements.txt` and
/// `pyproject.toml`, in that priority order. Names are deduplicated after
/// normalization, so the first (most precise) source wins.
pub struct PypiDetector;

impl Detector for PypiDetector {
    fn name(&self) -> &'static str {
        "pypi"
    }

    fn detect(&self, dir: &Path) -> Result<Vec<Purl>> {
        let mut purls: Vec<Purl> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let sources: [(&str, fn(&str) -> Result<Vec<Purl>>); 3] = [
            ("Pipfile.lock", parse_pipfile_lock),
            ("requirements.txt", parse_requirements_txt),
            ("pyproject.toml", parse_pyproject_toml),
        ];
        for (file, parse) in sources {
            let path = dir.join(file);
            if !path.exists() {
                continue;
            }
            for purl in parse(&std::fs::read_to_string(&path)?)? {
                if seen.insert(purl.name.clone()) {
                    purls.push(purl);
                }
            }
        }

        Ok(purls)
    }
}

/// PyPI names are case-insensitive and treat `_` and `.` like `-`.
fn pypi_purl(name: &str, version: Option<&str>) -> Purl {
    let normalized = name.to_lowercase().replace(['_', '.'], "-");
    Purl::new("pypi", None, &normalized, version)
}

/// `name==version` lines; anything not pinned exactly is skipped.
fn parse_requirements_txt(content: &str) -> Result<Vec<Purl>> {
    let re = Regex::new(r"^([A-Za-z0-9_\-\.]+)(?:\[[^\]]*\])?\s*==\s*([^\s;#]+)")?;
    let mut purls = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            continue;
        }
        if let Some(caps) = re.captures(line) {
            purls.push(pypi_purl(&caps[1], Some(&caps[2])));
        }
    }

    Ok(purls)
}

/// `Pipfile.lock`: JSON with `default` and `develop` sections.
fn parse_pipfile_lock(content: &str) -> Result<Vec<Purl>> {
    let json: serde_json::Value = serde_json::from_str(content)?;
    let mut purls = Vec::new();

    for section in &["default", "develop"] {
        if let Some(pkgs) = json.get(section).and_then(|v| v.as_object()) {
            for (name, info) in pkgs {
                let version = info
                    .get("version")
                    .and_then(|v| v.as_str())
                    .map(|v| v.trim_start_matches("=="));
                purls.push(pypi_purl(name, version));
            }
        }
    }

    Ok(purls)
}

#[derive(Debug, Deserialize)]
struct Pyproject {
    project: Option<PyprojectProject>,
}

#[derive(Debug, Deserialize)]
struct PyprojectProject {
    #[serde(default)]
    dependencies: Vec<String>,
}

/// `[project].dependencies`; unpinned entries get no version.
fn parse_pyproject_toml(content: &str) -> Result<Vec<Purl>> {
    let pyproject: Pyproject = toml::from_str(content)?;

    let re = Regex::new(r"^([A-Za-z0-9_\-\.]+)(?:\[[^\]]*\])?\s*(?:==\s*([^\s;,\[]+))?")?;
    let mut purls = Vec::new();

    if let Some(project) = pyproject.project {
        for dep in &project.dependencies {
            if let Some(caps) = re.captures(dep.trim()) {
                purls.push(pypi_purl(&caps[1], caps.get(2).map(|m| m.as_str())));
            }
        }
    }

    Ok(purls)
}
