//! Directory scanning: find lockfiles and manifests under a project tree and
//! turn the dependencies they pin into package URLs.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use walkdir::WalkDir;

use crate::purl::Purl;

pub mod cargo;
pub mod npm;
pub mod pypi;

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &["node_modules", ".git", "target", ".venv", "venv", "__pycache__", ".tox"];

pub trait Detector {
    fn name(&self) -> &'static str;

    /// Dependencies declared directly in `dir`. A directory without the
    /// detector's files yields an empty list, not an error.
    fn detect(&self, dir: &Path) -> Result<Vec<Purl>>;
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub max_depth: usize,
    /// Path substrings excluded from the walk.
    pub exclude: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            exclude: Vec::new(),
        }
    }
}

fn detectors() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(cargo::CargoDetector),
        Box::new(npm::NpmDetector),
        Box::new(pypi::PypiDetector),
    ]
}

/// Walk `root` and collect the unique package URLs of every dependency found,
/// in discovery order.
pub fn detect_purls(root: &Path, options: &ScanOptions) -> Result<Vec<String>> {
    if !root.is_dir() {
        anyhow::bail!("not a directory: {}", root.display());
    }

    let detectors = detectors();
    let mut seen: HashSet<String> = HashSet::new();
    let mut purls = Vec::new();

    let walker = WalkDir::new(root)
        .max_depth(options.max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            let path = entry.path().to_string_lossy();
            !SKIP_DIRS.contains(&name.as_ref()) && !options.exclude.iter().any(|ex| path.contains(ex.as_str()))
        });

    for entry in walker.filter_map(|e| e.ok()).filter(|e| e.file_type().is_dir()) {
        for detector in &detectors {
            match detector.detect(entry.path()) {
                Ok(found) => {
                    if !found.is_empty() {
                        tracing::debug!(
                            "{} detector found {} packages in {}",
                            detector.name(),
                            found.len(),
                            entry.path().display()
                        );
                    }
                    for purl in found {
                        let purl = purl.to_string();
                        if seen.insert(purl.clone()) {
                            purls.push(purl);
                        }
                    }
                }
                Err(e) => tracing::warn!(
                    "{} detector failed in {}: {}",
                    detector.name(),
                    entry.path().display(),
                    e
                ),
            }
        }
    }

    tracing::info!("detected {} packages under {}", purls.len(), root.display());
    Ok(purls)
}
