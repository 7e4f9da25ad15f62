use anyhow::Result;
use reqwest::Client;
use serde_json::Value;

use super::{json_str, Resolution, USER_AGENT};
use crate::purl::Purl;

/// Resolve a gem version against the RubyGems v2 API.
pub async fn resolve(client: &Client, purl: &Purl) -> Result<Option<Resolution>> {
    let Some(version) = purl.version.as_deref() else {
        return Ok(None);
    };
    let url = format!(
        "https://rubygems.org/api/v2/rubygems/{}/versions/{}.json",
        purl.name, version
    );

    let response = client
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Ok(None);
    }

    let data: Value = response.json().await?;
    let licenses = data
        .get("licenses")
        .and_then(|l| l.as_array())
        .map(|list| list.iter().filter_map(|l| json_str(Some(l))).collect())
        .unwrap_or_default();

    Ok(Some(Resolution {
        download_url: Some(format!("https://rubygems.org/downloads/{}-{}.gem", purl.name, version)),
        licenses,
        homepage_url: json_str(data.get("homepage_uri")),
        repository_url: json_str(data.get("source_code_uri")),
        description: json_str(data.get("info")),
    }))
}
