use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Placeholder SPDX id for "no license could be determined".
pub const NOASSERTION: &str = "NOASSERTION";

/// Free-form metadata attached to results and packages. Ordered so that
/// serialized output is stable across runs.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Which provider produced a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    /// Identifier resolution against an upstream package registry.
    Registry,
    /// Declared metadata read from a package manifest inside the artifact.
    Manifest,
    /// License and copyright files found by walking the artifact.
    Scanner,
    Unknown,
}

impl std::fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionSource::Registry => write!(f, "registry"),
            ExtractionSource::Manifest => write!(f, "manifest"),
            ExtractionSource::Scanner => write!(f, "scanner"),
            ExtractionSource::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub spdx_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub source: ExtractionSource,
    pub confidence: f64,
}

impl LicenseRecord {
    pub fn new(spdx_id: impl Into<String>, display_name: impl Into<String>, source: ExtractionSource) -> Self {
        Self {
            spdx_id: spdx_id.into(),
            display_name: display_name.into(),
            text: None,
            source,
            confidence: 1.0,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Dedup identity: `(spdx_id, display_name)`.
    pub fn key(&self) -> (&str, &str) {
        (&self.spdx_id, &self.display_name)
    }

    /// Length of the attached text, treating an empty string as absent.
    pub fn text_len(&self) -> Option<usize> {
        self.text.as_deref().filter(|t| !t.is_empty()).map(str::len)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyrightRecord {
    pub statement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_start: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_end: Option<i32>,
    #[serde(default)]
    pub holders: Vec<String>,
    pub source: ExtractionSource,
    pub confidence: f64,
}

impl CopyrightRecord {
    pub fn new(statement: impl Into<String>, source: ExtractionSource) -> Self {
        Self {
            statement: statement.into(),
            year_start: None,
            year_end: None,
            holders: Vec::new(),
            source,
            confidence: 1.0,
        }
    }

    /// Dedup identity: the statement trimmed and lower-cased.
    pub fn key(&self) -> String {
        self.statement.trim().to_lowercase()
    }
}

/// Output of a single provider call. Built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub success: bool,
    pub licenses: Vec<LicenseRecord>,
    pub copyrights: Vec<CopyrightRecord>,
    pub metadata: Metadata,
    pub errors: Vec<String>,
    pub source: ExtractionSource,
}

impl ExtractionResult {
    pub fn success(source: ExtractionSource) -> Self {
        Self {
            success: true,
            licenses: Vec::new(),
            copyrights: Vec::new(),
            metadata: Metadata::new(),
            errors: Vec::new(),
            source,
        }
    }

    pub fn failure(source: ExtractionSource, error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            ..Self::success(source)
        }
    }

    /// Check the provider's output before it reaches the merge step.
    ///
    /// A successful result carrying out-of-range confidences or blank license
    /// ids is turned into a failure so ill-typed evidence never gets merged.
    pub fn validated(self) -> Self {
        if !self.success {
            return self;
        }
        let bad_confidence = self
            .licenses
            .iter()
            .map(|l| l.confidence)
            .chain(self.copyrights.iter().map(|c| c.confidence))
            .any(|c| !(0.0..=1.0).contains(&c));
        if bad_confidence {
            return Self::failure(
                self.source,
                format!("{} provider returned a confidence outside [0, 1]", self.source),
            );
        }
        if self.licenses.iter().any(|l| l.spdx_id.trim().is_empty()) {
            return Self::failure(
                self.source,
                format!("{} provider returned a license without an id", self.source),
            );
        }
        self
    }
}

/// Lifecycle of one package. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Pending,
    Success,
    NoLicense,
    NoCopyright,
    Unavailable,
    Failed,
}

impl PackageStatus {
    /// Terminal status for a package whose reconciliation ran to completion.
    ///
    /// The license check precedes the copyright check.
    pub fn from_evidence(licenses: usize, copyrights: usize) -> Self {
        if licenses == 0 {
            PackageStatus::NoLicense
        } else if copyrights == 0 {
            PackageStatus::NoCopyright
        } else {
            PackageStatus::Success
        }
    }

    pub fn is_terminal(self) -> bool {
        self != PackageStatus::Pending
    }
}

impl std::fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageStatus::Pending => write!(f, "pending"),
            PackageStatus::Success => write!(f, "success"),
            PackageStatus::NoLicense => write!(f, "no license"),
            PackageStatus::NoCopyright => write!(f, "no copyright"),
            PackageStatus::Unavailable => write!(f, "unavailable"),
            PackageStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Canonical reconciled record for one unit of software.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub purl: Option<String>,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, rename = "type")]
    pub package_type: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub licenses: Vec<LicenseRecord>,
    #[serde(default)]
    pub copyrights: Vec<CopyrightRecord>,
    #[serde(default)]
    pub metadata: Metadata,
    pub status: PackageStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub source_path: Option<String>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            purl: None,
            name: name.into(),
            version: String::new(),
            package_type: None,
            namespace: None,
            licenses: Vec::new(),
            copyrights: Vec::new(),
            metadata: Metadata::new(),
            status: PackageStatus::Pending,
            error_message: None,
            source_path: None,
        }
    }

    /// A package for an identifier that could not be processed at all.
    pub fn failed(purl: &str, message: impl Into<String>) -> Self {
        Self {
            purl: Some(purl.to_string()),
            status: PackageStatus::Failed,
            error_message: Some(message.into()),
            ..Self::new(purl)
        }
    }

    /// `namespace/name@version`, falling back to whatever identity is known.
    pub fn display_name(&self) -> String {
        let base = match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, self.name),
            _ => self.name.clone(),
        };
        if self.version.is_empty() {
            base
        } else {
            format!("{}@{}", base, self.version)
        }
    }

    /// Unique SPDX ids in first-seen order.
    pub fn license_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for license in &self.licenses {
            if !ids.contains(&license.spdx_id.as_str()) {
                ids.push(&license.spdx_id);
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_license_check_precedes_copyright_check() {
        assert_eq!(PackageStatus::from_evidence(2, 0), PackageStatus::NoCopyright);
        assert_eq!(PackageStatus::from_evidence(0, 5), PackageStatus::NoLicense);
        assert_eq!(PackageStatus::from_evidence(0, 0), PackageStatus::NoLicense);
        assert_eq!(PackageStatus::from_evidence(1, 1), PackageStatus::Success);
    }

    #[test]
    fn test_copyright_key_is_case_and_whitespace_insensitive() {
        let a = CopyrightRecord::new("  Copyright 2024 Demo ", ExtractionSource::Scanner);
        let b = CopyrightRecord::new("copyright 2024 demo", ExtractionSource::Manifest);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_validated_rejects_out_of_range_confidence() {
        let mut result = ExtractionResult::success(ExtractionSource::Scanner);
        result
            .licenses
            .push(LicenseRecord::new("MIT", "MIT License", ExtractionSource::Scanner).with_confidence(1.5));
        let checked = result.validated();
        assert!(!checked.success);
        assert!(checked.licenses.is_empty());
        assert_eq!(checked.errors.len(), 1);
    }

    #[test]
    fn test_display_name() {
        let mut pkg = Package::new("core");
        pkg.namespace = Some("@angular".to_string());
        pkg.version = "17.0.0".to_string();
        assert_eq!(pkg.display_name(), "@angular/core@17.0.0");
    }

    #[test]
    fn test_license_ids_are_unique_in_order() {
        let mut pkg = Package::new("demo");
        pkg.licenses = vec![
            LicenseRecord::new("MIT", "MIT", ExtractionSource::Registry),
            LicenseRecord::new("Apache-2.0", "Apache", ExtractionSource::Scanner),
            LicenseRecord::new("MIT", "MIT License", ExtractionSource::Scanner),
        ];
        assert_eq!(pkg.license_ids(), vec!["MIT", "Apache-2.0"]);
    }

    #[test]
    fn test_unknown_license_placeholder() {
        let rec = LicenseRecord::new(NOASSERTION, "Unknown", ExtractionSource::Unknown);
        assert_eq!(rec.key(), ("NOASSERTION", "Unknown"));
        assert_eq!(rec.text_len(), None);
    }
}
