use anyhow::Result;
use reqwest::Client;
use serde_json::Value;

use super::{json_str, Resolution, USER_AGENT};
use crate::purl::Purl;

/// Resolve a Python package release against PyPI's JSON API.
pub async fn resolve(client: &Client, purl: &Purl) -> Result<Option<Resolution>> {
    let url = match purl.version.as_deref() {
        Some(version) => format!("https://pypi.org/pypi/{}/{}/json", purl.name, version),
        None => format!("https://pypi.org/pypi/{}/json", purl.name),
    };

    let response = client
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Ok(None);
    }

    let data: Value = response.json().await?;
    Ok(Some(parse_release_document(&data)))
}

fn parse_release_document(data: &Value) -> Resolution {
    let info = data.get("info");

    // PEP 639 `license_expression` wins over the free-form `license` field,
    // which some projects fill with the whole license text.
    let license = json_str(info.and_then(|i| i.get("license_expression"))).or_else(|| {
        json_str(info.and_then(|i| i.get("license"))).filter(|l| l.len() <= 100 && !l.contains('\n'))
    });

    // Prefer the source distribution: it carries LICENSE files more reliably than wheels.
    let files = data.get("urls").and_then(|u| u.as_array());
    let pick = |kind: &str| {
        files.and_then(|fs| {
            fs.iter()
                .find(|f| f.get("packagetype").and_then(|t| t.as_str()) == Some(kind))
                .and_then(|f| json_str(f.get("url")))
        })
    };
    let download_url = pick("sdist").or_else(|| pick("bdist_wheel"));

    let project_urls = info.and_then(|i| i.get("project_urls"));
    let repository_url = ["Source", "Source Code", "Repository", "Code"]
        .iter()
        .find_map(|k| json_str(project_urls.and_then(|p| p.get(*k))));

    Resolution {
        download_url,
        licenses: license.into_iter().collect(),
        homepage_url: json_str(info.and_then(|i| i.get("home_page")))
            .or_else(|| json_str(project_urls.and_then(|p| p.get("Homepage")))),
        repository_url,
        description: json_str(info.and_then(|i| i.get("summary"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_release_prefers_sdist() {
        let doc: Value = serde_json::from_str(
            r#"{
  "info": {
    "license": "Apache 2.0",
    "summary": "Python HTTP for Humans.",
    "home_page": "https://requests.readthedocs.io",
    "project_urls": { "Source": "https://github.com/psf/requests" }
  },
  "urls": [
    { "packagetype": "bdist_wheel", "url": "https://files/requests-2.31.0-py3-none-any.whl" },
    { "packagetype": "sdist", "url": "https://files/requests-2.31.0.tar.gz" }
  ]
}"#,
        )
        .unwrap();
        let res = parse_release_document(&doc);
        assert_eq!(res.download_url.as_deref(), Some("https://files/requests-2.31.0.tar.gz"));
        assert_eq!(res.licenses, vec!["Apache 2.0".to_string()]);
        assert_eq!(res.repository_url.as_deref(), Some("https://github.com/psf/requests"));
    }

    #[test]
    fn test_license_text_in_license_field_is_ignored() {
        let doc: Value = serde_json::from_str(
            r#"{ "info": { "license": "Copyright (c) 2020\nPermission is hereby granted..." }, "urls": [] }"#,
        )
        .unwrap();
        let res = parse_release_document(&doc);
        assert!(res.licenses.is_empty());
        assert_eq!(res.download_url, None);
    }
}
