use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Root configuration structure, deserialized from `.purl-notices/config.toml`.
///
/// Every section and key is optional; missing values fall back to the
/// built-in defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub general: GeneralConfig,
    pub cache: CacheConfig,
    pub licenses: LicensesConfig,
    pub providers: ProvidersConfig,
    pub scanning: ScanningConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralConfig {
    /// Maximum number of packages reconciled at once.
    pub parallel: usize,
    /// Deadline for a single provider call.
    pub timeout_secs: u64,
    /// Deadline for downloading and unpacking one artifact.
    pub download_timeout_secs: u64,
    /// Where downloaded artifacts are unpacked. System temp dir when unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            parallel: 4,
            timeout_secs: 30,
            download_timeout_secs: 60,
            work_dir: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    pub location: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            location: PathBuf::from(".purl-notices.cache.json"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LicensesConfig {
    /// Directory of reference texts named `<SPDX-ID>.txt`.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvidersConfig {
    /// Artifact-inspecting providers, in the order they run.
    pub inspectors: Vec<String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            inspectors: vec!["manifest".to_string(), "scanner".to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanningConfig {
    pub max_depth: usize,
    /// Path substrings skipped when scanning directories.
    pub exclude: Vec<String>,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            exclude: Vec::new(),
        }
    }
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!("loaded configuration from {}", path.display());
    Ok(config)
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`, the path passed via `--config`
/// 2. `<project_path>/.purl-notices/config.toml`
/// 3. `~/.config/purl-notices/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(project_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return read_config(path);
    }

    let project_config = project_path.join(".purl-notices").join("config.toml");
    if project_config.exists() {
        return read_config(&project_config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".config").join("purl-notices").join("config.toml");
        if home_config.exists() {
            return read_config(&home_config);
        }
    }

    Ok(Config::default())
}
