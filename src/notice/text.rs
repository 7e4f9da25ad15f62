//! Default renderers for grouped notices: plain text and JSON.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;

use super::LicenseGroups;
use crate::license::spdx::expression_ids;
use crate::models::Package;

const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub include_copyright: bool,
    pub include_license_text: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            include_copyright: true,
            include_license_text: true,
        }
    }
}

pub fn render_text(
    groups: &LicenseGroups<'_>,
    texts: &BTreeMap<String, Option<String>>,
    options: RenderOptions,
) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);
    let mut out = String::new();

    out.push_str(&heavy);
    out.push_str("\nTHIRD-PARTY SOFTWARE NOTICES\n");
    out.push_str(&heavy);
    out.push_str("\n\n");

    if groups.is_empty() {
        out.push_str("No licensed packages.\n");
        return out;
    }

    for (key, packages) in groups {
        out.push_str(&light);
        out.push_str(&format!("\nLicense: {}\n", key));
        out.push_str(&light);
        out.push_str("\n\n");

        for package in packages {
            out.push_str(&package.display_name());
            out.push('\n');
            if options.include_copyright {
                for copyright in &package.copyrights {
                    out.push_str(&format!("  {}\n", copyright.statement));
                }
            }
        }
        out.push('\n');

        if options.include_license_text {
            for id in key_ids(key) {
                match texts.get(&id).and_then(|t| t.as_deref()) {
                    Some(text) => {
                        out.push_str(&format!("--- {} license text ---\n", id));
                        out.push_str(text.trim_end());
                        out.push_str("\n\n");
                    }
                    None => {
                        out.push_str(&format!("--- {}: license text not available ---\n\n", id));
                    }
                }
            }
        }
    }

    out
}

fn key_ids(key: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for part in key.split(", ") {
        for id in expression_ids(part) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids.retain(|id| id != crate::models::NOASSERTION);
    ids
}

#[derive(Debug, Serialize)]
struct JsonNotices<'a> {
    generated_at: String,
    groups: Vec<JsonGroup<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    license_texts: Option<&'a BTreeMap<String, Option<String>>>,
}

#[derive(Debug, Serialize)]
struct JsonGroup<'a> {
    license: &'a str,
    packages: Vec<JsonPackage<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonPackage<'a> {
    name: String,
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    purl: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    copyrights: Option<Vec<&'a str>>,
}

impl<'a> JsonPackage<'a> {
    fn new(package: &'a Package, include_copyright: bool) -> Self {
        let name = match &package.namespace {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, package.name),
            _ => package.name.clone(),
        };
        Self {
            name,
            version: &package.version,
            purl: package.purl.as_deref(),
            copyrights: include_copyright
                .then(|| package.copyrights.iter().map(|c| c.statement.as_str()).collect()),
        }
    }
}

pub fn render_json(
    groups: &LicenseGroups<'_>,
    texts: &BTreeMap<String, Option<String>>,
    options: RenderOptions,
) -> serde_json::Result<String> {
    let document = JsonNotices {
        generated_at: Utc::now().to_rfc3339(),
        groups: groups
            .iter()
            .map(|(key, packages)| JsonGroup {
                license: key,
                packages: packages
                    .iter()
                    .map(|p| JsonPackage::new(p, options.include_copyright))
                    .collect(),
            })
            .collect(),
        license_texts: options.include_license_text.then_some(texts),
    };
    serde_json::to_string_pretty(&document)
}
