//! Input handling: which mode a run uses and how a package URL list file
//! (KissBOM) is read.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Detect the mode from the input
    Auto,
    /// One package URL
    Single,
    /// A file with one package URL per line
    Kissbom,
    /// A project directory
    Scan,
    /// A previously saved cache file
    Cache,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Auto => write!(f, "auto"),
            Mode::Single => write!(f, "single"),
            Mode::Kissbom => write!(f, "kissbom"),
            Mode::Scan => write!(f, "scan"),
            Mode::Cache => write!(f, "cache"),
        }
    }
}

/// Work out the concrete mode for `input`.
///
/// With no input, an existing cache file is used. Otherwise a `pkg:` string
/// is a single package, a directory is scanned, a JSON document with a
/// `packages` array is a cache, and any other readable file is a KissBOM.
pub fn detect_mode(input: Option<&str>, cache_file: Option<&Path>) -> Result<Mode> {
    let Some(input) = input else {
        return match cache_file {
            Some(cache) if cache.is_file() => Ok(Mode::Cache),
            _ => bail!("no input provided and no cache file found"),
        };
    };

    if input.trim_start().starts_with("pkg:") {
        return Ok(Mode::Single);
    }
    let path = Path::new(input);
    if path.is_dir() {
        return Ok(Mode::Scan);
    }
    if path.is_file() {
        return Ok(if looks_like_cache(path) { Mode::Cache } else { Mode::Kissbom });
    }
    bail!("could not detect input type for: {}", input)
}

fn looks_like_cache(path: &Path) -> bool {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if !is_json {
        return false;
    }
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .is_some_and(|doc| doc.get("packages").is_some_and(|p| p.is_array()))
}

/// Read a KissBOM: one package URL per line, blank lines and `#` comments
/// ignored, anything after the first whitespace on a line ignored.
/// Duplicates are dropped, keeping the first occurrence.
pub fn read_kissbom(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read package list {}", path.display()))?;
    let purls = parse_kissbom(&content);
    if purls.is_empty() {
        bail!("no package URLs found in {}", path.display());
    }
    Ok(purls)
}

fn parse_kissbom(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .filter(|purl| seen.insert(purl.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kissbom() {
        let content = "# dependencies\n\npkg:npm/demo@1.0.0\n  pkg:pypi/requests@2.31.0   # http\npkg:npm/demo@1.0.0\nnot-a-purl\n";
        assert_eq!(
            parse_kissbom(content),
            vec!["pkg:npm/demo@1.0.0", "pkg:pypi/requests@2.31.0", "not-a-purl"]
        );
    }

    #[test]
    fn test_read_kissbom_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("purls.txt");
        std::fs::write(&path, "# nothing here\n").unwrap();
        assert!(read_kissbom(&path).is_err());
        assert!(read_kissbom(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_detect_mode() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("purls.txt");
        std::fs::write(&list, "pkg:npm/demo@1.0.0\n").unwrap();
        let cache = dir.path().join("project.cache.json");
        std::fs::write(&cache, r#"{"version": 1, "packages": []}"#).unwrap();
        let other_json = dir.path().join("other.json");
        std::fs::write(&other_json, r#"{"name": "x"}"#).unwrap();

        let dir_str = dir.path().to_string_lossy().to_string();
        assert_eq!(detect_mode(Some("pkg:npm/demo@1.0.0"), None).unwrap(), Mode::Single);
        assert_eq!(detect_mode(Some(&dir_str), None).unwrap(), Mode::Scan);
        assert_eq!(detect_mode(Some(list.to_str().unwrap()), None).unwrap(), Mode::Kissbom);
        assert_eq!(detect_mode(Some(cache.to_str().unwrap()), None).unwrap(), Mode::Cache);
        assert_eq!(detect_mode(Some(other_json.to_str().unwrap()), None).unwrap(), Mode::Kissbom);
        assert!(detect_mode(Some("/definitely/not/here"), None).is_err());
    }

    #[test]
    fn test_detect_mode_without_input_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join(".purl-notices.cache.json");
        assert!(detect_mode(None, Some(&cache)).is_err());
        std::fs::write(&cache, r#"{"version": 1, "packages": []}"#).unwrap();
        assert_eq!(detect_mode(None, Some(&cache)).unwrap(), Mode::Cache);
        assert!(detect_mode(None, None).is_err());
    }
}
