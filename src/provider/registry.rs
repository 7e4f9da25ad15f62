use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;

use super::EvidenceProvider;
use crate::license::spdx::normalize;
use crate::models::{ExtractionResult, ExtractionSource, LicenseRecord, NOASSERTION};
use crate::purl::Purl;
use crate::registry::{self, Resolution};

/// Identifier-resolution provider backed by the upstream package registries.
pub struct RegistryResolver {
    client: Client,
}

impl RegistryResolver {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EvidenceProvider for RegistryResolver {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn source(&self) -> ExtractionSource {
        ExtractionSource::Registry
    }

    async fn extract_from_identifier(&self, id: &str) -> ExtractionResult {
        let purl = match Purl::parse(id) {
            Ok(purl) => purl,
            Err(e) => return ExtractionResult::failure(self.source(), format!("Invalid PURL {}: {}", id, e)),
        };
        if !registry::supports(&purl.package_type) {
            return ExtractionResult::failure(
                self.source(),
                format!("No registry resolver for package type '{}' ({})", purl.package_type, id),
            );
        }

        tracing::debug!("resolving {} against its registry", id);
        match registry::resolve(&self.client, &purl).await {
            Ok(Some(resolution)) => resolution_to_result(resolution),
            Ok(None) => ExtractionResult::failure(self.source(), format!("No download URL found for {}", id)),
            Err(e) => ExtractionResult::failure(self.source(), format!("Registry lookup failed for {}: {}", id, e)),
        }
    }

    async fn extract_from_local_artifact(&self, _path: &Path) -> ExtractionResult {
        ExtractionResult::failure(
            self.source(),
            "registry resolver only works with package identifiers, not local paths",
        )
    }
}

fn resolution_to_result(resolution: Resolution) -> ExtractionResult {
    let mut result = ExtractionResult::success(ExtractionSource::Registry);

    for raw in &resolution.licenses {
        let spdx_id = normalize(raw);
        if spdx_id == NOASSERTION {
            continue;
        }
        result
            .licenses
            .push(LicenseRecord::new(spdx_id, raw.trim(), ExtractionSource::Registry));
    }

    let fields = [
        ("download_url", resolution.download_url),
        ("homepage_url", resolution.homepage_url),
        ("repository_url", resolution.repository_url),
        ("description", resolution.description),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            result.metadata.insert(key.to_string(), value.into());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_to_result() {
        let result = resolution_to_result(Resolution {
            download_url: Some("https://example.com/demo-1.0.0.tgz".to_string()),
            licenses: vec!["MIT License".to_string(), "UNKNOWN".to_string()],
            description: Some("demo".to_string()),
            ..Default::default()
        });
        assert!(result.success);
        assert_eq!(result.licenses.len(), 1);
        assert_eq!(result.licenses[0].spdx_id, "MIT");
        assert_eq!(result.licenses[0].display_name, "MIT License");
        assert_eq!(result.licenses[0].confidence, 1.0);
        assert_eq!(
            result.metadata.get("download_url").and_then(|v| v.as_str()),
            Some("https://example.com/demo-1.0.0.tgz")
        );
        assert!(!result.metadata.contains_key("homepage_url"));
    }

    #[tokio::test]
    async fn test_unsupported_type_is_a_failed_result() {
        let resolver = RegistryResolver::new(Duration::from_secs(1)).unwrap();
        let result = resolver.extract_from_identifier("pkg:deb/debian/curl@7.50.3").await;
        assert!(!result.success);
        assert!(result.errors[0].contains("deb"));

        let local = resolver.extract_from_local_artifact(Path::new("/tmp")).await;
        assert!(!local.success);
    }
}
