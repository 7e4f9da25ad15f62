//! Reconciliation engine: runs the provider pipeline for one package and
//! merges every provider's evidence into a single canonical record.
//!
//! Provider order is fixed: the identifier resolver runs first, then the
//! artifact inspectors in their configured order. Later metadata overwrites
//! earlier metadata, so the order is part of the result.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::acquire::{AcquireError, ArtifactFetcher};
use crate::batch::ErrorLog;
use crate::models::{
    CopyrightRecord, ExtractionResult, LicenseRecord, Metadata, Package, PackageStatus,
};
use crate::provider::{with_timeout, EvidenceProvider};
use crate::purl::Purl;

/// Merged evidence for one package, before state assignment.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Evidence {
    pub licenses: Vec<LicenseRecord>,
    pub copyrights: Vec<CopyrightRecord>,
    pub metadata: Metadata,
}

/// Deduplicate license records by `(spdx_id, display_name)`.
///
/// Within a key the strictly more confident record wins. On a confidence tie
/// a record carrying text replaces one without; when both carry text only the
/// longer text is taken over. Output keeps the order of first occurrence.
pub fn merge_licenses(records: impl IntoIterator<Item = LicenseRecord>) -> Vec<LicenseRecord> {
    let mut merged: Vec<LicenseRecord> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for record in records {
        let (spdx_id, display_name) = record.key();
        let key = (spdx_id.to_string(), display_name.to_string());
        let Some(&pos) = index.get(&key) else {
            index.insert(key, merged.len());
            merged.push(record);
            continue;
        };

        let kept = &mut merged[pos];
        if record.confidence > kept.confidence {
            *kept = record;
        } else if record.confidence == kept.confidence {
            match (kept.text_len(), record.text_len()) {
                (None, Some(_)) => *kept = record,
                (Some(old), Some(new)) if new > old => kept.text = record.text,
                _ => {}
            }
        }
    }

    merged
}

/// Deduplicate copyright records by normalized statement, keeping the first
/// record seen for each statement untouched.
pub fn merge_copyrights(records: impl IntoIterator<Item = CopyrightRecord>) -> Vec<CopyrightRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.key()))
        .collect()
}

/// Combine metadata maps in order; later keys overwrite earlier ones.
pub fn merge_metadata<'a>(maps: impl IntoIterator<Item = &'a Metadata>) -> Metadata {
    let mut merged = Metadata::new();
    for map in maps {
        for (key, value) in map {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Merge the successful results, in provider order. Failed results
/// contribute nothing.
pub fn merge_evidence(results: &[ExtractionResult]) -> Evidence {
    let successful = || results.iter().filter(|r| r.success);
    Evidence {
        licenses: merge_licenses(successful().flat_map(|r| r.licenses.iter().cloned())),
        copyrights: merge_copyrights(successful().flat_map(|r| r.copyrights.iter().cloned())),
        metadata: merge_metadata(successful().map(|r| &r.metadata)),
    }
}

/// The ordered set of collaborators one reconciliation runs through.
pub struct Pipeline {
    pub resolver: Arc<dyn EvidenceProvider>,
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub inspectors: Vec<Arc<dyn EvidenceProvider>>,
}

pub struct Reconciler {
    pipeline: Pipeline,
    timeout: Duration,
    download_timeout: Duration,
}

impl Reconciler {
    pub fn new(pipeline: Pipeline, timeout: Duration, download_timeout: Duration) -> Self {
        Self {
            pipeline,
            timeout,
            download_timeout,
        }
    }

    /// Reconcile one package identifier into a package in a terminal state.
    pub async fn reconcile_identifier(&self, id: &str, log: &ErrorLog) -> Package {
        let purl = match Purl::parse(id) {
            Ok(purl) => purl,
            Err(e) => {
                log.push(format!("PURL validation failed: {} - {}", id, e));
                return Package::failed(id, format!("Invalid PURL: {}", e));
            }
        };
        let mut package = package_for(&purl, id);

        let resolver = &self.pipeline.resolver;
        let resolved = with_timeout(
            resolver.source(),
            self.timeout,
            resolver.extract_from_identifier(id),
        )
        .await;
        if !resolved.success {
            let reason = resolved.errors.join("; ");
            log.push(format!("Resolution failed for {}: {}", id, reason));
            package.metadata = resolved.metadata;
            return unavailable(package, reason);
        }

        let download_url = resolved
            .metadata
            .get("download_url")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let Some(download_url) = download_url else {
            log.push(format!("No download URL found for {}", id));
            package.metadata = resolved.metadata;
            return unavailable(package, "No download URL found".to_string());
        };

        let fetched = tokio::time::timeout(
            self.download_timeout,
            self.pipeline.fetcher.fetch(&download_url, &purl),
        )
        .await
        .unwrap_or_else(|_| Err(AcquireError::Timeout(self.download_timeout.as_secs())));
        let artifact = match fetched {
            Ok(artifact) => artifact,
            Err(e) => {
                log.push(format!("Download failed for {}: {}", id, e));
                package.metadata = resolved.metadata;
                return unavailable(package, format!("Failed to download package: {}", e));
            }
        };

        let mut results = vec![resolved];
        results.extend(self.inspect(&artifact.path).await);
        drop(artifact);

        finish(package, &results, id, log)
    }

    /// Reconcile a local directory or file with no identifier of its own.
    pub async fn reconcile_path(&self, path: &Path, log: &ErrorLog) -> Package {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let mut package = Package::new(name);
        package.source_path = Some(path.display().to_string());

        let results = self.inspect(path).await;
        let label = path.display().to_string();
        let mut package = finish(package, &results, &label, log);

        // A path package takes its identity from the manifest when one exists.
        if let Some(name) = package.metadata.get("package_name").and_then(|v| v.as_str()) {
            package.name = name.to_string();
        }
        if let Some(version) = package.metadata.get("package_version").and_then(|v| v.as_str()) {
            package.version = version.to_string();
        }
        package
    }

    async fn inspect(&self, path: &Path) -> Vec<ExtractionResult> {
        let mut results = Vec::with_capacity(self.pipeline.inspectors.len());
        for provider in &self.pipeline.inspectors {
            tracing::debug!("running {} provider on {}", provider.name(), path.display());
            let result = with_timeout(
                provider.source(),
                self.timeout,
                provider.extract_from_local_artifact(path),
            )
            .await;
            results.push(result);
        }
        results
    }
}

fn package_for(purl: &Purl, id: &str) -> Package {
    let mut package = Package::new(purl.name.clone());
    package.purl = Some(id.to_string());
    package.version = purl.version.clone().unwrap_or_default();
    package.package_type = Some(purl.package_type.clone());
    package.namespace = purl.namespace.clone();
    package
}

fn unavailable(mut package: Package, reason: String) -> Package {
    package.status = PackageStatus::Unavailable;
    package.error_message = Some(reason);
    package
}

/// Merge the provider results into the package and assign its final state.
fn finish(mut package: Package, results: &[ExtractionResult], label: &str, log: &ErrorLog) -> Package {
    let failures: Vec<&ExtractionResult> = results.iter().filter(|r| !r.success).collect();

    if !results.is_empty() && failures.len() == results.len() {
        let errors: Vec<&str> = failures
            .iter()
            .flat_map(|r| r.errors.iter().map(String::as_str))
            .collect();
        log.push(format!("All providers failed for {}: {}", label, errors.join("; ")));
        package.status = PackageStatus::Failed;
        package.error_message = Some(errors.join("; "));
        return package;
    }

    for result in results {
        for error in &result.errors {
            if result.success {
                log.push(format!("{} provider reported for {}: {}", result.source, label, error));
            } else {
                log.push(format!("{} provider failed for {}: {}", result.source, label, error));
            }
        }
    }

    let evidence = merge_evidence(results);
    package.licenses = evidence.licenses;
    package.copyrights = evidence.copyrights;
    package.metadata.extend(evidence.metadata);
    package.status = PackageStatus::from_evidence(package.licenses.len(), package.copyrights.len());

    if package.status == PackageStatus::NoLicense && !failures.is_empty() {
        let errors: Vec<&str> = failures
            .iter()
            .flat_map(|r| r.errors.iter().map(String::as_str))
            .collect();
        package.error_message = Some(errors.join("; "));
    }

    tracing::info!(
        "{}: {} ({} licenses, {} copyrights)",
        label,
        package.status,
        package.licenses.len(),
        package.copyrights.len()
    );
    package
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::acquire::Artifact;
    use crate::models::ExtractionSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn license(id: &str, confidence: f64, text: Option<&str>, source: ExtractionSource) -> LicenseRecord {
        let record = LicenseRecord::new(id, id, source).with_confidence(confidence);
        match text {
            Some(text) => record.with_text(text),
            None => record,
        }
    }

    /// Provider stub returning a fixed result for both operations.
    pub(crate) struct StubProvider {
        pub source: ExtractionSource,
        pub result: ExtractionResult,
        pub calls: AtomicUsize,
    }

    impl StubProvider {
        pub(crate) fn new(result: ExtractionResult) -> Arc<Self> {
            Arc::new(Self {
                source: result.source,
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EvidenceProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn source(&self) -> ExtractionSource {
            self.source
        }

        async fn extract_from_identifier(&self, _id: &str) -> ExtractionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }

        async fn extract_from_local_artifact(&self, _path: &Path) -> ExtractionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    /// Fetcher stub handing out an empty temporary directory.
    pub(crate) struct StubFetcher {
        pub fail: bool,
    }

    #[async_trait]
    impl ArtifactFetcher for StubFetcher {
        async fn fetch(&self, _url: &str, _purl: &Purl) -> Result<Artifact, AcquireError> {
            if self.fail {
                return Err(AcquireError::Status(404));
            }
            let dir = tempfile::tempdir()?;
            Ok(Artifact::in_workdir(dir.path().to_path_buf(), dir))
        }
    }

    pub(crate) fn resolved_with_url() -> ExtractionResult {
        let mut result = ExtractionResult::success(ExtractionSource::Registry);
        result.metadata.insert(
            "download_url".to_string(),
            "https://example.com/demo-1.0.0.tgz".into(),
        );
        result
    }

    fn reconciler(
        resolver: Arc<dyn EvidenceProvider>,
        inspectors: Vec<Arc<dyn EvidenceProvider>>,
        fetch_fails: bool,
    ) -> Reconciler {
        Reconciler::new(
            Pipeline {
                resolver,
                fetcher: Arc::new(StubFetcher { fail: fetch_fails }),
                inspectors,
            },
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_merge_licenses_confidence_dominates_text() {
        let merged = merge_licenses(vec![
            license("MIT", 0.9, None, ExtractionSource::Registry),
            license("MIT", 0.6, Some("MIT License full text"), ExtractionSource::Scanner),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].confidence, 0.9);
        assert_eq!(merged[0].source, ExtractionSource::Registry);
        assert_eq!(merged[0].text, None);

        // The same holds with the order reversed.
        let merged = merge_licenses(vec![
            license("MIT", 0.6, Some("MIT License full text"), ExtractionSource::Scanner),
            license("MIT", 0.9, None, ExtractionSource::Registry),
        ]);
        assert_eq!(merged[0].confidence, 0.9);
        assert_eq!(merged[0].text, None);
    }

    #[test]
    fn test_merge_licenses_tie_prefers_text() {
        let merged = merge_licenses(vec![
            license("MIT", 0.8, None, ExtractionSource::Manifest),
            license("MIT", 0.8, Some("MIT License"), ExtractionSource::Scanner),
        ]);
        assert_eq!(merged[0].text.as_deref(), Some("MIT License"));
        assert_eq!(merged[0].source, ExtractionSource::Scanner);

        // An empty text counts as no text.
        let merged = merge_licenses(vec![
            license("MIT", 0.8, Some(""), ExtractionSource::Manifest),
            license("MIT", 0.8, None, ExtractionSource::Scanner),
        ]);
        assert_eq!(merged[0].source, ExtractionSource::Manifest);
    }

    #[test]
    fn test_merge_licenses_tie_with_texts_keeps_longer_text_only() {
        let merged = merge_licenses(vec![
            license("MIT", 0.8, Some("short"), ExtractionSource::Manifest),
            license("MIT", 0.8, Some("a much longer text"), ExtractionSource::Scanner),
            license("MIT", 0.8, Some("mid text"), ExtractionSource::Registry),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text.as_deref(), Some("a much longer text"));
        assert_eq!(merged[0].source, ExtractionSource::Manifest);
    }

    #[test]
    fn test_merge_licenses_dedup_and_first_occurrence_order() {
        let mut records = vec![
            license("Apache-2.0", 0.5, None, ExtractionSource::Manifest),
            license("MIT", 0.5, None, ExtractionSource::Manifest),
            license("Apache-2.0", 0.9, None, ExtractionSource::Scanner),
            license("BSD-3-Clause", 0.3, None, ExtractionSource::Scanner),
            license("MIT", 0.1, None, ExtractionSource::Scanner),
        ];
        // Same id, different display name: a separate identity.
        records.push(LicenseRecord::new("MIT", "The MIT License", ExtractionSource::Scanner));

        let merged = merge_licenses(records);
        let keys: Vec<(&str, &str)> = merged.iter().map(|l| l.key()).collect();
        assert_eq!(
            keys,
            vec![
                ("Apache-2.0", "Apache-2.0"),
                ("MIT", "MIT"),
                ("BSD-3-Clause", "BSD-3-Clause"),
                ("MIT", "The MIT License"),
            ]
        );
        assert_eq!(merged[0].confidence, 0.9);
        assert_eq!(merged[1].confidence, 0.5);
    }

    #[test]
    fn test_merge_copyrights_keeps_first_verbatim() {
        let mut first = CopyrightRecord::new("Copyright 2024 Demo", ExtractionSource::Manifest);
        first.holders = vec!["Demo".to_string()];
        let merged = merge_copyrights(vec![
            first.clone(),
            CopyrightRecord::new("  COPYRIGHT 2024 demo ", ExtractionSource::Scanner),
            CopyrightRecord::new("Copyright 2023 Other", ExtractionSource::Scanner),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], first);
        assert_eq!(merged[1].statement, "Copyright 2023 Other");
    }

    #[test]
    fn test_merge_evidence_metadata_last_write_wins() {
        let mut registry = ExtractionResult::success(ExtractionSource::Registry);
        registry.metadata.insert("description".to_string(), "from registry".into());
        registry.metadata.insert("homepage".to_string(), "https://a".into());
        let mut manifest = ExtractionResult::success(ExtractionSource::Manifest);
        manifest.metadata.insert("description".to_string(), "from manifest".into());
        let mut failed = ExtractionResult::failure(ExtractionSource::Scanner, "boom");
        failed.metadata.insert("description".to_string(), "ignored".into());

        let evidence = merge_evidence(&[registry, manifest, failed]);
        assert_eq!(evidence.metadata["description"], "from manifest");
        assert_eq!(evidence.metadata["homepage"], "https://a");
    }

    #[tokio::test]
    async fn test_reconcile_demo_package() {
        let mut resolved = resolved_with_url();
        resolved
            .licenses
            .push(license("MIT", 1.0, None, ExtractionSource::Registry));

        let mut scanned = ExtractionResult::success(ExtractionSource::Scanner);
        scanned
            .licenses
            .push(license("MIT", 0.8, Some("MIT License..."), ExtractionSource::Scanner));
        scanned
            .copyrights
            .push(CopyrightRecord::new("Copyright 2024 Demo", ExtractionSource::Scanner));

        let engine = reconciler(StubProvider::new(resolved), vec![StubProvider::new(scanned)], false);
        let log = ErrorLog::new();
        let package = engine.reconcile_identifier("pkg:npm/demo@1.0.0", &log).await;

        assert_eq!(package.status, PackageStatus::Success);
        assert_eq!(package.name, "demo");
        assert_eq!(package.version, "1.0.0");
        assert_eq!(package.package_type.as_deref(), Some("npm"));
        assert_eq!(package.licenses.len(), 1);
        assert_eq!(package.licenses[0].spdx_id, "MIT");
        assert_eq!(package.licenses[0].confidence, 1.0);
        assert_eq!(package.licenses[0].text, None);
        assert_eq!(package.copyrights.len(), 1);
        assert_eq!(package.copyrights[0].statement, "Copyright 2024 Demo");
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_purl_never_reaches_providers() {
        let resolver = StubProvider::new(resolved_with_url());
        let engine = reconciler(resolver.clone(), vec![], false);
        let log = ErrorLog::new();
        let package = engine.reconcile_identifier("npm/demo", &log).await;

        assert_eq!(package.status, PackageStatus::Failed);
        assert!(package.error_message.unwrap().starts_with("Invalid PURL"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
        assert_eq!(log.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_failure_short_circuits_to_unavailable() {
        let mut resolved = ExtractionResult::failure(ExtractionSource::Registry, "registry down");
        resolved.metadata.insert("homepage_url".to_string(), "https://demo".into());
        let inspector = StubProvider::new(ExtractionResult::success(ExtractionSource::Scanner));
        let engine = reconciler(StubProvider::new(resolved), vec![inspector.clone()], false);
        let log = ErrorLog::new();
        let package = engine.reconcile_identifier("pkg:npm/demo@1.0.0", &log).await;

        assert_eq!(package.status, PackageStatus::Unavailable);
        assert_eq!(package.error_message.as_deref(), Some("registry down"));
        assert_eq!(package.metadata["homepage_url"], "https://demo");
        assert_eq!(inspector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_url_and_download_failure_are_unavailable() {
        let inspector = StubProvider::new(ExtractionResult::success(ExtractionSource::Scanner));
        let engine = reconciler(
            StubProvider::new(ExtractionResult::success(ExtractionSource::Registry)),
            vec![inspector.clone()],
            false,
        );
        let log = ErrorLog::new();
        let package = engine.reconcile_identifier("pkg:npm/demo@1.0.0", &log).await;
        assert_eq!(package.status, PackageStatus::Unavailable);
        assert_eq!(package.error_message.as_deref(), Some("No download URL found"));

        let engine = reconciler(StubProvider::new(resolved_with_url()), vec![inspector.clone()], true);
        let package = engine.reconcile_identifier("pkg:npm/demo@1.0.0", &log).await;
        assert_eq!(package.status, PackageStatus::Unavailable);
        assert!(package
            .error_message
            .unwrap()
            .starts_with("Failed to download package"));
        assert!(package.metadata.contains_key("download_url"));
        assert_eq!(inspector.calls.load(Ordering::SeqCst), 0);
        assert_eq!(log.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_mixed_failures_go_to_the_log_only() {
        let mut scanned = ExtractionResult::success(ExtractionSource::Scanner);
        scanned
            .licenses
            .push(license("MIT", 0.8, Some("MIT License"), ExtractionSource::Scanner));
        let engine = reconciler(
            StubProvider::new(resolved_with_url()),
            vec![
                StubProvider::new(ExtractionResult::failure(ExtractionSource::Manifest, "no manifest")),
                StubProvider::new(scanned),
            ],
            false,
        );
        let log = ErrorLog::new();
        let package = engine.reconcile_identifier("pkg:npm/demo@1.0.0", &log).await;

        assert_eq!(package.status, PackageStatus::NoCopyright);
        assert_eq!(package.error_message, None);
        assert_eq!(log.entries().len(), 1);
        assert!(log.entries()[0].contains("no manifest"));
    }

    #[tokio::test]
    async fn test_partial_errors_of_successful_providers_are_logged() {
        let mut scanned = ExtractionResult::success(ExtractionSource::Scanner);
        scanned
            .licenses
            .push(license("MIT", 0.8, Some("MIT License"), ExtractionSource::Scanner));
        scanned.errors.push("Failed to read NOTICE: permission denied".to_string());
        let engine = reconciler(StubProvider::new(resolved_with_url()), vec![StubProvider::new(scanned)], false);
        let log = ErrorLog::new();
        let package = engine.reconcile_identifier("pkg:npm/demo@1.0.0", &log).await;

        assert_eq!(package.status, PackageStatus::NoCopyright);
        assert_eq!(package.licenses.len(), 1);
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("scanner provider reported for pkg:npm/demo@1.0.0"));
        assert!(entries[0].contains("permission denied"));
    }

    #[tokio::test]
    async fn test_all_inspectors_failing_on_path_is_failed() {
        let engine = reconciler(
            StubProvider::new(resolved_with_url()),
            vec![
                StubProvider::new(ExtractionResult::failure(ExtractionSource::Manifest, "no manifest")),
                StubProvider::new(ExtractionResult::failure(ExtractionSource::Scanner, "no files")),
            ],
            false,
        );
        let log = ErrorLog::new();
        let dir = tempfile::tempdir().unwrap();
        let package = engine.reconcile_path(dir.path(), &log).await;

        assert_eq!(package.status, PackageStatus::Failed);
        assert_eq!(package.error_message.as_deref(), Some("no manifest; no files"));
        assert!(package.source_path.is_some());
    }

    #[tokio::test]
    async fn test_path_package_takes_manifest_identity() {
        let mut manifest = ExtractionResult::success(ExtractionSource::Manifest);
        manifest.metadata.insert("package_name".to_string(), "widget".into());
        manifest.metadata.insert("package_version".to_string(), "2.1.0".into());
        let engine = reconciler(
            StubProvider::new(resolved_with_url()),
            vec![StubProvider::new(manifest)],
            false,
        );
        let dir = tempfile::tempdir().unwrap();
        let package = engine.reconcile_path(dir.path(), &ErrorLog::new()).await;

        assert_eq!(package.name, "widget");
        assert_eq!(package.version, "2.1.0");
        assert_eq!(package.status, PackageStatus::NoLicense);
    }
}
