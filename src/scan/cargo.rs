use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

use super::Detector;
use crate::purl::Purl;

#[derive(Debug, Deserialize)]
struct CargoLock {
    #[serde(default)]
    package: Vec<CargoLockPackage>,
}

#[derive(Debug, Deserialize)]
struct CargoLockPackage {
    name: String,
    version: String,
    /// Packages without a `source` field are local workspace members.
    source: Option<String>,
}

/// Crates pinned in `Cargo.lock`.
pub struct CargoDetector;

impl Detector for CargoDetector {
    fn name(&self) -> &'static str {
        "cargo"
    }

    fn detect(&self, dir: &Path) -> Result<Vec<Purl>> {
        let lock_path = dir.join("Cargo.lock");
        if !lock_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&lock_path)?;
        parse_cargo_lock(&content)
    }
}

fn parse_cargo_lock(content: &str) -> Result<Vec<Purl>> {
    let lock: CargoLock = toml::from_str(content)?;

    let purls = lock
        .package
        .into_iter()
        // git and path sources are not on crates.io
        .filter(|p| p.source.as_deref().is_some_and(|s| s.starts_with("registry+")))
        .map(|p| Purl::new("cargo", None, &p.name, Some(&p.version)))
        .collect();

    Ok(purls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cargo_lock() {
        let content = r#"
version = 3

[[package]]
name = "my-app"
version = "0.1.0"

[[package]]
name = "serde"
version = "1.0.150"
source = "registry+https://github.com/rust-lang/crates.io-index"
checksum = "abc123"

[[package]]
name = "patched"
version = "0.2.0"
source = "git+https://github.com/example/patched#0123abc"

[[package]]
name = "tokio"
version = "1.25.0"
source = "registry+https://github.com/rust-lang/crates.io-index"
checksum = "def456"
"#;

        let purls: Vec<String> = parse_cargo_lock(content)
            .unwrap()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(purls, vec!["pkg:cargo/serde@1.0.150", "pkg:cargo/tokio@1.25.0"]);
    }

    #[test]
    fn test_missing_lockfile_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CargoDetector.detect(dir.path()).unwrap().is_empty());
    }
}
