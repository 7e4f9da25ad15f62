use std::path::PathBuf;

/// Read-only store of reference license texts indexed by SPDX id.
pub trait ReferenceTexts: Send + Sync {
    fn text_for(&self, spdx_id: &str) -> Option<String>;
}

/// Texts compiled into the binary, one per common SPDX id.
const BUNDLED: &[(&str, &str)] = &[
    ("0BSD", include_str!("../../licenses/0BSD.txt")),
    ("Apache-2.0", include_str!("../../licenses/Apache-2.0.txt")),
    ("BSD-2-Clause", include_str!("../../licenses/BSD-2-Clause.txt")),
    ("BSD-3-Clause", include_str!("../../licenses/BSD-3-Clause.txt")),
    ("BSL-1.0", include_str!("../../licenses/BSL-1.0.txt")),
    ("CC0-1.0", include_str!("../../licenses/CC0-1.0.txt")),
    ("GPL-2.0-only", include_str!("../../licenses/GPL-2.0-only.txt")),
    ("GPL-3.0-only", include_str!("../../licenses/GPL-3.0-only.txt")),
    ("ISC", include_str!("../../licenses/ISC.txt")),
    ("LGPL-2.1-only", include_str!("../../licenses/LGPL-2.1-only.txt")),
    ("LGPL-3.0-only", include_str!("../../licenses/LGPL-3.0-only.txt")),
    ("MIT", include_str!("../../licenses/MIT.txt")),
    ("MPL-2.0", include_str!("../../licenses/MPL-2.0.txt")),
    ("Unlicense", include_str!("../../licenses/Unlicense.txt")),
    ("Zlib", include_str!("../../licenses/Zlib.txt")),
];

/// The license texts shipped with the tool.
///
/// `-or-later`, `+` and deprecated bare GNU ids share the text of their
/// `-only` counterpart.
#[derive(Debug, Default, Clone, Copy)]
pub struct BundledTexts;

impl BundledTexts {
    fn lookup(id: &str) -> Option<&'static str> {
        BUNDLED.iter().find(|(known, _)| *known == id).map(|(_, text)| *text)
    }
}

impl ReferenceTexts for BundledTexts {
    fn text_for(&self, spdx_id: &str) -> Option<String> {
        let id = spdx_id.trim();
        if let Some(text) = Self::lookup(id) {
            return Some(text.to_string());
        }
        let base = id
            .strip_suffix("-or-later")
            .or_else(|| id.strip_suffix("-only"))
            .or_else(|| id.strip_suffix('+'))
            .unwrap_or(id);
        Self::lookup(&format!("{}-only", base)).map(str::to_string)
    }
}

/// Reference texts stored as `<dir>/<SPDX-ID>.txt`. Ids without a file there
/// fall back to the [`BundledTexts`].
pub struct LicenseDir {
    dir: PathBuf,
    fallback: BundledTexts,
}

impl LicenseDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fallback: BundledTexts,
        }
    }

    fn read(&self, spdx_id: &str) -> Option<String> {
        // SPDX ids never contain path separators.
        if spdx_id.is_empty() || spdx_id.contains(['/', '\\']) || spdx_id.starts_with('.') {
            return None;
        }
        let file = self.dir.join(format!("{}.txt", spdx_id));
        match std::fs::read_to_string(&file) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("failed to read license text {}: {}", file.display(), e);
                None
            }
        }
    }
}

impl ReferenceTexts for LicenseDir {
    fn text_for(&self, spdx_id: &str) -> Option<String> {
        self.read(spdx_id).or_else(|| self.fallback.text_for(spdx_id))
    }
}
