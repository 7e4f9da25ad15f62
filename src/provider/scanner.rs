use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use walkdir::WalkDir;

use super::EvidenceProvider;
use crate::models::{CopyrightRecord, ExtractionResult, ExtractionSource, LicenseRecord, NOASSERTION};

/// Confidence for a license identified from the text of a license file.
const TEXT_MATCH_CONFIDENCE: f64 = 0.8;
/// Confidence for an explicit `SPDX-License-Identifier:` tag.
const TAG_CONFIDENCE: f64 = 0.9;
/// Confidence for a license file whose text matched nothing we know.
const UNIDENTIFIED_CONFIDENCE: f64 = 0.3;
/// Files larger than this are not license files.
const MAX_FILE_BYTES: u64 = 512 * 1024;

lazy_static! {
    static ref SPDX_TAG: Regex =
        Regex::new(r"(?m)SPDX-License-Identifier:\s*([A-Za-z0-9.+\- ()]+?)\s*(?:\*/|-->|$)").unwrap();
    static ref COPYRIGHT_MARK: Regex = Regex::new(r"(?i)(copyright\b|\(c\)|©)").unwrap();
    static ref YEAR: Regex = Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap();
    // Everything before the holder: markers, years, separators and an optional "by".
    static ref HOLDER_PREFIX: Regex =
        Regex::new(r"(?i)^(?:copyright|\(c\)|©|[0-9]{4}|[\s,\-–:])+(?:by\s+)?").unwrap();
}

const LEGAL_FILE_PREFIXES: &[&str] = &["license", "licence", "copying", "notice", "copyright", "unlicense"];

/// Known license texts, most specific first: `(spdx id, display name, phrases)`.
/// Every phrase must occur in the whitespace-collapsed, lower-cased text.
const SIGNATURES: &[(&str, &str, &[&str])] = &[
    ("AGPL-3.0-only", "GNU Affero General Public License v3.0", &["gnu affero general public license", "version 3"]),
    ("LGPL-3.0-only", "GNU Lesser General Public License v3.0", &["gnu lesser general public license", "version 3"]),
    ("LGPL-2.1-only", "GNU Lesser General Public License v2.1", &["gnu lesser general public license", "version 2.1"]),
    ("GPL-3.0-only", "GNU General Public License v3.0", &["gnu general public license", "version 3"]),
    ("GPL-2.0-only", "GNU General Public License v2.0", &["gnu general public license", "version 2"]),
    ("Apache-2.0", "Apache License 2.0", &["apache license", "version 2.0"]),
    ("MPL-2.0", "Mozilla Public License 2.0", &["mozilla public license", "version 2.0"]),
    ("BSL-1.0", "Boost Software License 1.0", &["boost software license - version 1.0"]),
    ("Unlicense", "The Unlicense", &["this is free and unencumbered software released into the public domain"]),
    ("CC0-1.0", "Creative Commons Zero v1.0 Universal", &["cc0 1.0 universal"]),
    ("BSD-3-Clause", "BSD 3-Clause License", &["redistribution and use in source and binary forms", "neither the name"]),
    ("BSD-2-Clause", "BSD 2-Clause License", &["redistribution and use in source and binary forms", "this list of conditions"]),
    ("ISC", "ISC License", &["permission to use, copy, modify, and", "distribute this software for any purpose with or without fee is hereby granted"]),
    ("Zlib", "zlib License", &["this software is provided 'as-is'", "altered source versions must be plainly marked"]),
    ("MIT", "MIT License", &["permission is hereby granted, free of charge", "the above copyright notice and this permission notice shall be included"]),
];

/// Walks an artifact for license, notice and copyright files and extracts
/// the license they carry and every copyright statement in them.
pub struct ScannerProvider {
    max_depth: usize,
}

impl ScannerProvider {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth: max_depth.max(1) }
    }
}

#[async_trait]
impl EvidenceProvider for ScannerProvider {
    fn name(&self) -> &'static str {
        "scanner"
    }

    fn source(&self) -> ExtractionSource {
        ExtractionSource::Scanner
    }

    async fn extract_from_identifier(&self, _id: &str) -> ExtractionResult {
        ExtractionResult::failure(self.source(), "scanner requires local files or directories")
    }

    async fn extract_from_local_artifact(&self, path: &Path) -> ExtractionResult {
        let path = path.to_path_buf();
        let max_depth = self.max_depth;
        match tokio::task::spawn_blocking(move || scan(&path, max_depth)).await {
            Ok(result) => result,
            Err(e) => ExtractionResult::failure(self.source(), format!("Scan aborted: {}", e)),
        }
    }
}

fn scan(root: &Path, max_depth: usize) -> ExtractionResult {
    let files = legal_files(root, max_depth);
    if files.is_empty() {
        return ExtractionResult::failure(
            ExtractionSource::Scanner,
            format!("No license or copyright files found in {}", root.display()),
        );
    }

    let mut result = ExtractionResult::success(ExtractionSource::Scanner);
    for file in &files {
        let text = match std::fs::read(file) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                result.errors.push(format!("Failed to read {}: {}", file.display(), e));
                continue;
            }
        };
        tracing::debug!("scanning {}", file.display());

        let is_notice = file_stem_lower(file).starts_with("notice") || file_stem_lower(file).starts_with("copyright");
        if let Some(license) = identify_license(&text) {
            result.licenses.push(license);
        } else if !is_notice {
            result.licenses.push(
                LicenseRecord::new(NOASSERTION, "Unidentified license file", ExtractionSource::Scanner)
                    .with_text(text.clone())
                    .with_confidence(UNIDENTIFIED_CONFIDENCE),
            );
        }
        result.copyrights.extend(extract_copyrights(&text));
    }

    if result.licenses.is_empty() && result.copyrights.is_empty() {
        let mut failed = ExtractionResult::failure(
            ExtractionSource::Scanner,
            format!("No license or copyright information found in {}", root.display()),
        );
        failed.errors.extend(result.errors);
        return failed;
    }
    result
}

fn file_stem_lower(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default()
}

/// License-like files, shallowest first, then by path for stable ordering.
fn legal_files(root: &Path, max_depth: usize) -> Vec<PathBuf> {
    let is_legal = |p: &Path| {
        let name = file_stem_lower(p);
        LEGAL_FILE_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
    };

    if root.is_file() {
        return if is_legal(root) { vec![root.to_path_buf()] } else { Vec::new() };
    }

    let mut found: Vec<(usize, PathBuf)> = WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !matches!(e.file_name().to_str(), Some("node_modules" | ".git")))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.metadata().map(|m| m.len() <= MAX_FILE_BYTES).unwrap_or(false))
        .filter(|e| is_legal(e.path()))
        .map(|e| (e.depth(), e.into_path()))
        .collect();
    found.sort();
    found.into_iter().map(|(_, p)| p).collect()
}

/// Identify the license carried by a file's text.
pub fn identify_license(text: &str) -> Option<LicenseRecord> {
    if let Some(caps) = SPDX_TAG.captures(text) {
        let id = caps[1].trim().to_string();
        return Some(
            LicenseRecord::new(id.clone(), id, ExtractionSource::Scanner)
                .with_text(text)
                .with_confidence(TAG_CONFIDENCE),
        );
    }

    let haystack = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    SIGNATURES
        .iter()
        .find(|(_, _, phrases)| phrases.iter().all(|p| haystack.contains(p)))
        .map(|(id, name, _)| {
            LicenseRecord::new(*id, *name, ExtractionSource::Scanner)
                .with_text(text)
                .with_confidence(TEXT_MATCH_CONFIDENCE)
        })
}

/// Boilerplate that mentions copyright without being a statement.
const NOT_A_STATEMENT: &[&str] = &[
    "copyright notice",
    "copyright holder",
    "copyright owner",
    "copyright law",
    "copyright and license",
    "copyright (c) <year>",
    "copyright [yyyy]",
];

/// Extract copyright statements, one per line, with year range and holder.
pub fn extract_copyrights(text: &str) -> Vec<CopyrightRecord> {
    let mut records = Vec::new();
    for raw in text.lines() {
        let line = raw
            .trim()
            .trim_start_matches(|c: char| matches!(c, '#' | '/' | '*' | ';' | '-' | '!' | '<'))
            .trim();
        if line.is_empty() || !COPYRIGHT_MARK.is_match(line) {
            continue;
        }
        let lower = line.to_lowercase();
        if NOT_A_STATEMENT.iter().any(|b| lower.contains(b)) {
            continue;
        }
        let starts_like_statement =
            lower.starts_with("copyright") || lower.starts_with("(c)") || lower.starts_with('©');
        let years: Vec<i32> = YEAR
            .find_iter(line)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        if !starts_like_statement && years.is_empty() {
            continue;
        }

        let holder = HOLDER_PREFIX.replace(line, "");
        let holder = holder
            .split("All rights reserved")
            .next()
            .unwrap_or_default()
            .trim()
            .trim_end_matches(['.', ','])
            .trim();

        let mut record = CopyrightRecord::new(line, ExtractionSource::Scanner);
        record.year_start = years.iter().min().copied();
        record.year_end = years.iter().max().copied();
        if !holder.is_empty() {
            record.holders.push(holder.to_string());
        }
        records.push(record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIT_TEXT: &str = "MIT License\n\nCopyright (c) 2019-2024 Demo Authors\n\n\
        Permission is hereby granted, free of charge, to any person obtaining a copy\n\
        of this software... The above copyright notice and this permission notice shall be\n\
        included in all copies or substantial portions of the Software.";

    #[test]
    fn test_identify_mit() {
        let license = identify_license(MIT_TEXT).unwrap();
        assert_eq!(license.spdx_id, "MIT");
        assert_eq!(license.confidence, TEXT_MATCH_CONFIDENCE);
        assert!(license.text.unwrap().starts_with("MIT License"));
    }

    #[test]
    fn test_identify_lgpl_before_gpl() {
        let text = "GNU LESSER GENERAL PUBLIC LICENSE\n Version 3, 29 June 2007\n\
                    This version of the GNU Lesser General Public License incorporates the GNU General Public License";
        assert_eq!(identify_license(text).unwrap().spdx_id, "LGPL-3.0-only");
    }

    #[test]
    fn test_identify_spdx_tag() {
        let license = identify_license("// SPDX-License-Identifier: Apache-2.0 OR MIT\n").unwrap();
        assert_eq!(license.spdx_id, "Apache-2.0 OR MIT");
        assert_eq!(license.confidence, TAG_CONFIDENCE);
    }

    #[test]
    fn test_extract_copyrights() {
        let records = extract_copyrights(MIT_TEXT);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].statement, "Copyright (c) 2019-2024 Demo Authors");
        assert_eq!(records[0].year_start, Some(2019));
        assert_eq!(records[0].year_end, Some(2024));
        assert_eq!(records[0].holders, vec!["Demo Authors".to_string()]);
    }

    #[test]
    fn test_extract_copyrights_skips_boilerplate() {
        let text = "THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS\n\
                    * Copyright 2010, Example Corp. All rights reserved.";
        let records = extract_copyrights(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].statement, "Copyright 2010, Example Corp. All rights reserved.");
        assert_eq!(records[0].holders, vec!["Example Corp".to_string()]);
    }

    #[tokio::test]
    async fn test_scan_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("LICENSE"), MIT_TEXT).unwrap();
        std::fs::write(dir.path().join("NOTICE.txt"), "Copyright 2024 Other Party\n").unwrap();
        std::fs::write(dir.path().join("index.js"), "module.exports = 1;\n").unwrap();

        let result = ScannerProvider::new(4).extract_from_local_artifact(dir.path()).await;
        assert!(result.success);
        assert_eq!(result.licenses.len(), 1);
        assert_eq!(result.copyrights.len(), 2);
    }

    #[tokio::test]
    async fn test_scan_without_legal_files_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();
        let result = ScannerProvider::new(4).extract_from_local_artifact(dir.path()).await;
        assert!(!result.success);
    }
}
