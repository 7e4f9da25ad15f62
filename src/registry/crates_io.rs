use anyhow::Result;
use reqwest::Client;
use serde_json::Value;

use super::{json_str, Resolution, USER_AGENT};
use crate::purl::Purl;

/// Resolve a crate version against crates.io.
pub async fn resolve(client: &Client, purl: &Purl) -> Result<Option<Resolution>> {
    let Some(version) = purl.version.as_deref() else {
        return Ok(None);
    };
    let url = format!("https://crates.io/api/v1/crates/{}/{}", purl.name, version);

    let response = client
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Ok(None);
    }

    let data: Value = response.json().await?;
    Ok(Some(parse_version_document(&data, &purl.name, version)))
}

fn parse_version_document(data: &Value, name: &str, version: &str) -> Resolution {
    let v = data.get("version");
    let download_url = json_str(v.and_then(|v| v.get("dl_path")))
        .map(|path| format!("https://crates.io{}", path))
        .unwrap_or_else(|| format!("https://static.crates.io/crates/{0}/{0}-{1}.crate", name, version));

    Resolution {
        download_url: Some(download_url),
        licenses: json_str(v.and_then(|v| v.get("license"))).into_iter().collect(),
        homepage_url: json_str(v.and_then(|v| v.get("homepage"))),
        repository_url: json_str(v.and_then(|v| v.get("repository"))),
        description: json_str(v.and_then(|v| v.get("description"))),
    }
}
