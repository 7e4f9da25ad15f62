use anyhow::Result;
use reqwest::Client;
use serde_json::Value;

use super::{json_str, Resolution, USER_AGENT};
use crate::purl::Purl;

/// Resolve an npm package version against the npm registry.
pub async fn resolve(client: &Client, purl: &Purl) -> Result<Option<Resolution>> {
    // Scoped packages need URL encoding: @scope/pkg → %40scope%2Fpkg
    let encoded_name = purl.full_name().replace('@', "%40").replace('/', "%2F");
    let url = match purl.version.as_deref() {
        Some(version) => format!("https://registry.npmjs.org/{}/{}", encoded_name, version),
        None => format!("https://registry.npmjs.org/{}/latest", encoded_name),
    };

    let response = client
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        return Ok(None);
    }

    let data: Value = response.json().await?;
    Ok(Some(parse_version_document(&data)))
}

/// Parse the document served at `/{name}/{version}`.
fn parse_version_document(data: &Value) -> Resolution {
    // `license` is usually a string, older packages use `{ "type": ... }`
    // or a `licenses` array of such objects.
    let mut licenses = Vec::new();
    match data.get("license") {
        Some(Value::String(s)) if !s.trim().is_empty() => licenses.push(s.trim().to_string()),
        Some(obj @ Value::Object(_)) => licenses.extend(json_str(obj.get("type"))),
        _ => {}
    }
    if licenses.is_empty() {
        if let Some(list) = data.get("licenses").and_then(|v| v.as_array()) {
            licenses.extend(list.iter().filter_map(|l| json_str(l.get("type")).or_else(|| json_str(Some(l)))));
        }
    }

    let repository_url = match data.get("repository") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(obj @ Value::Object(_)) => json_str(obj.get("url")),
        _ => None,
    };

    Resolution {
        download_url: json_str(data.get("dist").and_then(|d| d.get("tarball"))),
        licenses,
        homepage_url: json_str(data.get("homepage")),
        repository_url,
        description: json_str(data.get("description")),
    }
}
