use crate::models::NOASSERTION;

/// Normalize a raw license string as found in manifests or registries into
/// an SPDX identifier.
///
/// Common non-SPDX spellings are mapped to their SPDX ids; strings that are
/// already identifiers or expressions are passed through trimmed. Empty and
/// placeholder values become [`NOASSERTION`].
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c| c == '(' || c == ')').trim();
    if trimmed.is_empty() {
        return NOASSERTION.to_string();
    }
    let lower = trimmed.to_lowercase();
    let mapped = match lower.as_str() {
        "unknown" | "none" | "noassertion" | "unlicensed" | "see license" | "see license file" => {
            NOASSERTION
        }
        "apache 2.0" | "apache-2" | "apache 2" | "apache license 2.0" | "apache license, version 2.0"
        | "apache software license" | "apache license version 2.0" | "asl 2.0" => "Apache-2.0",
        "mit license" | "the mit license" | "mit" | "expat" => "MIT",
        "bsd" | "bsd license" | "bsd 3-clause" | "new bsd" | "modified bsd" | "bsd-3" => "BSD-3-Clause",
        "bsd 2-clause" | "simplified bsd" | "freebsd" | "bsd-2" => "BSD-2-Clause",
        "gnu gpl v2" | "gnu general public license v2" | "gpl v2" | "gplv2" | "gpl-2.0" => "GPL-2.0-only",
        "gnu gpl v3" | "gnu general public license v3" | "gpl v3" | "gplv3" | "gpl-3.0" => "GPL-3.0-only",
        "gnu lgpl v2.1" | "lgpl v2.1" | "lgplv2.1" | "lgpl-2.1" => "LGPL-2.1-only",
        "gnu lgpl v3" | "lgpl v3" | "lgplv3" | "lgpl-3.0" => "LGPL-3.0-only",
        "mozilla public license 2.0" | "mpl 2.0" | "mplv2" | "mpl-2" => "MPL-2.0",
        "isc license" | "isc" => "ISC",
        "cc0" | "public domain" | "cc0 1.0 universal" => "CC0-1.0",
        "agpl v3" | "agplv3" | "gnu agpl v3" => "AGPL-3.0-only",
        "the unlicense" | "unlicense" => "Unlicense",
        "zlib license" | "zlib" => "Zlib",
        "python software foundation license" | "psf" | "psfl" => "PSF-2.0",
        _ => return trimmed.replace('/', " OR "),
    };
    mapped.to_string()
}

/// Split an SPDX expression into its license ids, dropping operators,
/// parentheses and `WITH` exceptions.
pub fn expression_ids(expr: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut skip_next = false;
    for token in expr.split(|c: char| c.is_whitespace() || c == '(' || c == ')') {
        if token.is_empty() {
            continue;
        }
        if skip_next {
            skip_next = false;
            continue;
        }
        match token {
            "AND" | "OR" | "and" | "or" => {}
            "WITH" | "with" => skip_next = true,
            id => {
                if !ids.iter().any(|seen: &String| seen == id) {
                    ids.push(id.to_string());
                }
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_common_spellings() {
        assert_eq!(normalize("MIT License"), "MIT");
        assert_eq!(normalize("Apache License 2.0"), "Apache-2.0");
        assert_eq!(normalize("  BSD  "), "BSD-3-Clause");
        assert_eq!(normalize("(MIT)"), "MIT");
    }

    #[test]
    fn test_normalize_passthrough_and_placeholders() {
        assert_eq!(normalize("BSL-1.0"), "BSL-1.0");
        assert_eq!(normalize("MIT OR Apache-2.0"), "MIT OR Apache-2.0");
        assert_eq!(normalize("MIT/Apache-2.0"), "MIT OR Apache-2.0");
        assert_eq!(normalize(""), NOASSERTION);
        assert_eq!(normalize("UNKNOWN"), NOASSERTION);
    }

    #[test]
    fn test_expression_ids() {
        assert_eq!(
            expression_ids("(MIT OR Apache-2.0) AND GPL-2.0-only WITH Classpath-exception-2.0"),
            vec!["MIT", "Apache-2.0", "GPL-2.0-only"]
        );
        assert_eq!(expression_ids("MIT OR MIT"), vec!["MIT"]);
    }
}
