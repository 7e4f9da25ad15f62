//! Notice aggregation: groups reconciled packages by license key and finds
//! the best full text for every license the groups mention.

use std::collections::BTreeMap;

use crate::license::spdx::expression_ids;
use crate::license::texts::ReferenceTexts;
use crate::models::{Package, NOASSERTION};

pub mod text;

/// Packages grouped by license key, ordered by key.
pub type LicenseGroups<'a> = BTreeMap<String, Vec<&'a Package>>;

/// The grouping key of a package: its single SPDX id, or the sorted unique
/// ids joined with `", "`. `None` for a package without licenses.
pub fn license_key(package: &Package) -> Option<String> {
    let mut ids = package.license_ids();
    match ids.len() {
        0 => None,
        1 => Some(ids[0].to_string()),
        _ => {
            ids.sort_unstable();
            Some(ids.join(", "))
        }
    }
}

/// Group packages by [`license_key`], keeping input order within a group.
/// Packages without licenses appear in no group.
pub fn group_by_license(packages: &[Package]) -> LicenseGroups<'_> {
    let mut groups = LicenseGroups::new();
    for package in packages {
        if let Some(key) = license_key(package) {
            groups.entry(key).or_default().push(package);
        }
    }
    groups
}

/// Resolve a full text for every license id appearing in `groups`.
///
/// Text attached to a package's license record wins over the reference
/// store; ids with neither map to `None`. `NOASSERTION` is never looked up.
pub fn license_texts(groups: &LicenseGroups<'_>, reference: &dyn ReferenceTexts) -> BTreeMap<String, Option<String>> {
    let mut texts: BTreeMap<String, Option<String>> = BTreeMap::new();

    for packages in groups.values() {
        for package in packages {
            for raw_id in package.license_ids() {
                for id in expression_ids(raw_id) {
                    if id == NOASSERTION || texts.contains_key(&id) {
                        continue;
                    }
                    let text = attached_text(groups, &id).or_else(|| reference.text_for(&id));
                    if text.is_none() {
                        tracing::debug!("no license text available for {}", id);
                    }
                    texts.insert(id, text);
                }
            }
        }
    }

    texts
}

fn attached_text(groups: &LicenseGroups<'_>, id: &str) -> Option<String> {
    groups
        .values()
        .flatten()
        .flat_map(|package| package.licenses.iter())
        .filter(|license| license.spdx_id == id)
        .find_map(|license| license.text.clone().filter(|t| !t.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::texts::BundledTexts;
    use crate::models::{ExtractionSource, LicenseRecord};

    fn package(name: &str, ids: &[&str]) -> Package {
        let mut package = Package::new(name);
        package.licenses = ids
            .iter()
            .map(|id| LicenseRecord::new(*id, *id, ExtractionSource::Scanner))
            .collect();
        package
    }

    struct FixedTexts;

    impl ReferenceTexts for FixedTexts {
        fn text_for(&self, spdx_id: &str) -> Option<String> {
            match spdx_id {
                "MIT" => Some("reference MIT".to_string()),
                "Apache-2.0" => Some("reference Apache".to_string()),
                _ => None,
            }
        }
    }

    #[test]
    fn test_grouping_by_license_key() {
        let packages = vec![
            package("a", &["MIT"]),
            package("b", &["MIT"]),
            package("c", &["MIT", "Apache-2.0"]),
            package("d", &[]),
        ];
        let groups = group_by_license(&packages);

        let keys: Vec<&str> = groups.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Apache-2.0, MIT", "MIT"]);
        let mit: Vec<&str> = groups["MIT"].iter().map(|p| p.name.as_str()).collect();
        assert_eq!(mit, vec!["a", "b"]);
        assert_eq!(groups["Apache-2.0, MIT"].len(), 1);
        assert!(groups.values().flatten().all(|p| p.name != "d"));
    }

    #[test]
    fn test_license_key_uses_unique_ids() {
        assert_eq!(license_key(&package("a", &["MIT", "MIT"])).as_deref(), Some("MIT"));
        assert_eq!(
            license_key(&package("b", &["Zlib", "BSD-3-Clause", "Zlib"])).as_deref(),
            Some("BSD-3-Clause, Zlib")
        );
        assert_eq!(license_key(&package("c", &[])), None);
    }

    #[test]
    fn test_license_texts_prefer_attached_text() {
        let mut with_text = package("a", &["MIT"]);
        with_text.licenses[0].text = Some("attached MIT".to_string());
        let packages = vec![
            package("z", &["MIT"]),
            with_text,
            package("b", &["Apache-2.0 OR BSL-1.0"]),
            package("c", &[NOASSERTION]),
        ];
        let groups = group_by_license(&packages);
        let texts = license_texts(&groups, &FixedTexts);

        assert_eq!(texts["MIT"].as_deref(), Some("attached MIT"));
        assert_eq!(texts["Apache-2.0"].as_deref(), Some("reference Apache"));
        assert_eq!(texts["BSL-1.0"], None);
        assert!(!texts.contains_key(NOASSERTION));
    }

    #[test]
    fn test_registry_licenses_get_bundled_text() {
        let mut registry_only = Package::new("left-pad");
        registry_only.licenses = vec![LicenseRecord::new("MIT", "MIT", ExtractionSource::Registry)];
        let packages = vec![registry_only];
        let groups = group_by_license(&packages);
        let texts = license_texts(&groups, &BundledTexts);

        assert!(texts["MIT"].as_deref().unwrap().starts_with("MIT License"));
    }
}
