//! Evidence providers: independent sources of license and copyright evidence.
//!
//! - [`registry`]: resolves a package identifier against its upstream registry
//!   (download location plus registry-declared license).
//! - [`manifest`]: reads declared metadata from a package manifest inside an artifact.
//! - [`scanner`]: walks an artifact for license/notice files and copyright statements.
//!
//! Providers never fail across the trait boundary: every failure mode is
//! reported as an [`ExtractionResult`] with `success == false`.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{ExtractionResult, ExtractionSource};

pub mod manifest;
pub mod registry;
pub mod scanner;

#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    /// Short, stable name used in configuration and diagnostics.
    fn name(&self) -> &'static str;

    fn source(&self) -> ExtractionSource;

    /// Resolve a package identifier. Providers that only inspect local
    /// artifacts report "not applicable" as a failed result.
    async fn extract_from_identifier(&self, id: &str) -> ExtractionResult;

    /// Inspect a file, directory or unpacked archive on disk.
    async fn extract_from_local_artifact(&self, path: &Path) -> ExtractionResult;
}

/// Run a provider call under a deadline. A call that overruns is reported
/// as a failed result from that provider.
pub async fn with_timeout<F>(
    source: ExtractionSource,
    timeout: Duration,
    call: F,
) -> ExtractionResult
where
    F: Future<Output = ExtractionResult>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.validated(),
        Err(_) => ExtractionResult::failure(
            source,
            format!("{} provider timed out after {}s", source, timeout.as_secs()),
        ),
    }
}

/// Build the artifact-inspecting providers in the configured order.
///
/// Order is significant: later providers overwrite earlier metadata keys.
pub fn build_inspectors(names: &[String], max_depth: usize) -> Result<Vec<Arc<dyn EvidenceProvider>>> {
    let mut providers: Vec<Arc<dyn EvidenceProvider>> = Vec::new();
    for name in names {
        let provider: Arc<dyn EvidenceProvider> = match name.as_str() {
            "manifest" => Arc::new(manifest::ManifestProvider::new()),
            "scanner" => Arc::new(scanner::ScannerProvider::new(max_depth)),
            other => bail!("unknown provider '{}' (expected 'manifest' or 'scanner')", other),
        };
        if providers.iter().any(|p| p.name() == provider.name()) {
            bail!("provider '{}' listed more than once", name);
        }
        providers.push(provider);
    }
    if providers.is_empty() {
        bail!("at least one artifact provider must be configured");
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_reports_overrun_as_failure() {
        let result = with_timeout(ExtractionSource::Scanner, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ExtractionResult::success(ExtractionSource::Scanner)
        })
        .await;
        assert!(!result.success);
        assert!(result.errors[0].contains("timed out"));
    }

    #[test]
    fn test_build_inspectors_keeps_configured_order() {
        let names = vec!["scanner".to_string(), "manifest".to_string()];
        let providers = build_inspectors(&names, 4).unwrap();
        let order: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(order, vec!["scanner", "manifest"]);
    }

    #[test]
    fn test_build_inspectors_rejects_unknown_and_duplicates() {
        assert!(build_inspectors(&["oracle".to_string()], 4).is_err());
        assert!(build_inspectors(&["scanner".to_string(), "scanner".to_string()], 4).is_err());
        assert!(build_inspectors(&[], 4).is_err());
    }
}
