//! Async HTTP clients that resolve a package identifier against its upstream
//! registry.
//!
//! Each module exposes `resolve(client, purl)` returning `Ok(Some(resolution))`
//! when the registry knows the package, `Ok(None)` when it does not (404 or
//! missing fields), and `Err` on network or decoding failures.

use anyhow::Result;
use reqwest::Client;

use crate::purl::Purl;

pub mod crates_io;
pub mod maven;
pub mod npm;
pub mod pypi;
pub mod rubygems;

pub(crate) const USER_AGENT: &str = concat!("purl-notices/", env!("CARGO_PKG_VERSION"));

/// What a registry told us about one package version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub download_url: Option<String>,
    /// Declared licenses, raw as the registry reports them.
    pub licenses: Vec<String>,
    pub homepage_url: Option<String>,
    pub repository_url: Option<String>,
    pub description: Option<String>,
}

/// Package types with a registry client.
pub fn supports(package_type: &str) -> bool {
    matches!(package_type, "npm" | "pypi" | "cargo" | "maven" | "gem")
}

pub async fn resolve(client: &Client, purl: &Purl) -> Result<Option<Resolution>> {
    match purl.package_type.as_str() {
        "npm" => npm::resolve(client, purl).await,
        "pypi" => pypi::resolve(client, purl).await,
        "cargo" => crates_io::resolve(client, purl).await,
        "maven" => maven::resolve(client, purl).await,
        "gem" => rubygems::resolve(client, purl).await,
        other => anyhow::bail!("unsupported package type '{}'", other),
    }
}

/// Pull a non-empty string out of a JSON value.
pub(crate) fn json_str(value: Option<&serde_json::Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
