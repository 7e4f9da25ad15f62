use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use walkdir::WalkDir;

use super::EvidenceProvider;
use crate::license::spdx::normalize;
use crate::models::{ExtractionResult, ExtractionSource, LicenseRecord, Metadata, NOASSERTION};
use crate::registry::maven::parse_pom;

/// Manifest file names in lookup priority order.
const MANIFESTS: &[&str] = &[
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "PKG-INFO",
    "METADATA",
    "pom.xml",
];

/// Deep enough for `META-INF/maven/<group>/<artifact>/pom.xml` inside a jar.
const SEARCH_DEPTH: usize = 5;

/// Reads declared package metadata (name, version, license, authors) from
/// the manifest shipped inside an artifact.
#[derive(Default)]
pub struct ManifestProvider;

impl ManifestProvider {
    pub fn new() -> Self {
        Self
    }
}

/// What one manifest declares.
#[derive(Debug, Default, PartialEq)]
struct Declared {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    homepage: Option<String>,
    repository: Option<String>,
    licenses: Vec<String>,
    authors: Vec<String>,
}

#[async_trait]
impl EvidenceProvider for ManifestProvider {
    fn name(&self) -> &'static str {
        "manifest"
    }

    fn source(&self) -> ExtractionSource {
        ExtractionSource::Manifest
    }

    async fn extract_from_identifier(&self, _id: &str) -> ExtractionResult {
        ExtractionResult::failure(self.source(), "manifest provider requires a local package artifact")
    }

    async fn extract_from_local_artifact(&self, path: &Path) -> ExtractionResult {
        let path = path.to_path_buf();
        // Manifest discovery walks the filesystem; keep it off the async workers.
        let outcome = tokio::task::spawn_blocking(move || inspect(&path)).await;
        match outcome {
            Ok(Ok(Some((manifest, declared)))) => {
                tracing::debug!("read manifest {}", manifest.display());
                declared_to_result(declared)
            }
            Ok(Ok(None)) => ExtractionResult::failure(self.source(), "No package manifest found"),
            Ok(Err(e)) => ExtractionResult::failure(self.source(), format!("Failed to read manifest: {}", e)),
            Err(e) => ExtractionResult::failure(self.source(), format!("Manifest inspection aborted: {}", e)),
        }
    }
}

fn inspect(path: &Path) -> Result<Option<(PathBuf, Declared)>> {
    let Some(manifest) = find_manifest(path) else {
        return Ok(None);
    };
    let content = std::fs::read_to_string(&manifest)?;
    let file_name = manifest.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let declared = match file_name {
        "package.json" => parse_package_json(&content)?,
        "Cargo.toml" => parse_cargo_toml(&content)?,
        "pyproject.toml" => parse_pyproject_toml(&content)?,
        "PKG-INFO" | "METADATA" => parse_core_metadata(&content),
        "pom.xml" => {
            let pom = parse_pom(&content);
            Declared {
                name: pom.artifact_id,
                version: pom.version,
                description: pom.description,
                homepage: pom.url,
                repository: pom.scm_url,
                licenses: pom.licenses,
                authors: Vec::new(),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some((manifest, declared)))
}

/// The shallowest manifest wins; ties go to the earlier entry in [`MANIFESTS`].
fn find_manifest(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        let name = path.file_name()?.to_str()?;
        return MANIFESTS.contains(&name).then(|| path.to_path_buf());
    }

    WalkDir::new(path)
        .max_depth(SEARCH_DEPTH)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0
                || !matches!(name.as_ref(), "node_modules" | ".git" | "test" | "tests")
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let rank = MANIFESTS.iter().position(|m| e.file_name() == *m)?;
            Some((e.depth(), rank, e.into_path()))
        })
        .min_by_key(|(depth, rank, _)| (*depth, *rank))
        .map(|(_, _, path)| path)
}

fn declared_to_result(declared: Declared) -> ExtractionResult {
    let mut result = ExtractionResult::success(ExtractionSource::Manifest);

    for raw in &declared.licenses {
        let spdx_id = normalize(raw);
        if spdx_id == NOASSERTION {
            continue;
        }
        result
            .licenses
            .push(LicenseRecord::new(spdx_id, raw.trim(), ExtractionSource::Manifest));
    }

    let mut metadata = Metadata::new();
    let fields = [
        ("package_name", declared.name),
        ("package_version", declared.version),
        ("description", declared.description),
        ("homepage", declared.homepage),
        ("repository", declared.repository),
    ];
    for (key, value) in fields {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            metadata.insert(key.to_string(), value.into());
        }
    }
    if !declared.authors.is_empty() {
        metadata.insert("authors".to_string(), declared.authors.into());
    }
    result.metadata = metadata;
    result
}

fn str_field(value: Option<&Value>) -> Option<String> {
    value.and_then(|v| v.as_str()).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_package_json(content: &str) -> Result<Declared> {
    let json: Value = serde_json::from_str(content)?;

    let mut licenses = Vec::new();
    match json.get("license") {
        Some(Value::String(s)) => licenses.push(s.clone()),
        Some(obj @ Value::Object(_)) => licenses.extend(str_field(obj.get("type"))),
        _ => {}
    }
    if let Some(list) = json.get("licenses").and_then(|v| v.as_array()) {
        licenses.extend(list.iter().filter_map(|l| str_field(l.get("type"))));
    }

    let person = |v: &Value| match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => str_field(v.get("name")),
        _ => None,
    };
    let mut authors: Vec<String> = json.get("author").and_then(person).into_iter().collect();
    if let Some(list) = json.get("contributors").and_then(|v| v.as_array()) {
        authors.extend(list.iter().filter_map(person));
    }

    let repository = match json.get("repository") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(obj @ Value::Object(_)) => str_field(obj.get("url")),
        _ => None,
    };

    Ok(Declared {
        name: str_field(json.get("name")),
        version: str_field(json.get("version")),
        description: str_field(json.get("description")),
        homepage: str_field(json.get("homepage")),
        repository,
        licenses,
        authors,
    })
}

fn toml_str(table: Option<&toml::Value>, key: &str) -> Option<String> {
    table
        .and_then(|t| t.get(key))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_cargo_toml(content: &str) -> Result<Declared> {
    let doc: toml::Value = toml::from_str(content)?;
    let package = doc.get("package");

    let authors = package
        .and_then(|p| p.get("authors"))
        .and_then(|a| a.as_array())
        .map(|list| list.iter().filter_map(|a| a.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    Ok(Declared {
        name: toml_str(package, "name"),
        version: toml_str(package, "version"),
        description: toml_str(package, "description"),
        homepage: toml_str(package, "homepage"),
        repository: toml_str(package, "repository"),
        licenses: toml_str(package, "license").into_iter().collect(),
        authors,
    })
}

fn parse_pyproject_toml(content: &str) -> Result<Declared> {
    let doc: toml::Value = toml::from_str(content)?;
    let project = doc.get("project");
    let poetry = doc.get("tool").and_then(|t| t.get("poetry"));

    // PEP 621 `license` is a string (PEP 639) or `{ text = "..." }`.
    let license = match project.and_then(|p| p.get("license")) {
        Some(toml::Value::String(s)) => Some(s.clone()),
        Some(toml::Value::Table(t)) => t.get("text").and_then(|v| v.as_str()).map(str::to_string),
        _ => toml_str(poetry, "license"),
    };

    let authors = project
        .and_then(|p| p.get("authors"))
        .and_then(|a| a.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|a| a.get("name").and_then(|n| n.as_str()).map(str::to_string))
                .collect()
        })
        .or_else(|| {
            poetry
                .and_then(|p| p.get("authors"))
                .and_then(|a| a.as_array())
                .map(|list| list.iter().filter_map(|a| a.as_str().map(str::to_string)).collect())
        })
        .unwrap_or_default();

    Ok(Declared {
        name: toml_str(project, "name").or_else(|| toml_str(poetry, "name")),
        version: toml_str(project, "version").or_else(|| toml_str(poetry, "version")),
        description: toml_str(project, "description").or_else(|| toml_str(poetry, "description")),
        homepage: toml_str(poetry, "homepage"),
        repository: toml_str(poetry, "repository"),
        licenses: license.into_iter().collect(),
        authors,
    })
}

/// Parse Python core metadata (`PKG-INFO` in sdists, `METADATA` in wheels).
fn parse_core_metadata(content: &str) -> Declared {
    let mut declared = Declared::default();
    let mut expression = None;
    let mut license_field = None;
    let mut classifiers = Vec::new();

    for line in content.lines() {
        // Headers end at the first blank line; the body is the long description.
        if line.trim().is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        if value.is_empty() || value == "UNKNOWN" {
            continue;
        }
        match key {
            "Name" => declared.name = Some(value),
            "Version" => declared.version = Some(value),
            "Summary" => declared.description = Some(value),
            "Home-page" => declared.homepage = Some(value),
            "Author" => declared.authors.push(value),
            "License-Expression" => expression = Some(value),
            "License" => license_field = Some(value),
            "Classifier" => {
                if let Some(rest) = value.strip_prefix("License ::") {
                    if let Some(name) = rest.rsplit("::").next() {
                        classifiers.push(name.trim().to_string());
                    }
                }
            }
            _ => {}
        }
    }

    declared.licenses = match (expression, license_field) {
        (Some(expr), _) => vec![expr],
        (None, Some(lic)) if lic.len() <= 100 => vec![lic],
        _ => classifiers,
    };
    declared
}
