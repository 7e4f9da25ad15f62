//! Package URL parsing.
//!
//! Only the parts the engine needs are extracted: `type`, `namespace`, `name`
//! and `version`. Qualifiers and subpath are accepted and kept verbatim.

use std::fmt;

use thiserror::Error;

/// A malformed package identifier. Never reaches a provider.
#[derive(Debug, Error, PartialEq)]
pub enum PurlError {
    #[error("missing 'pkg:' scheme")]
    MissingScheme,
    #[error("invalid package type '{0}'")]
    InvalidType(String),
    #[error("missing package name")]
    MissingName,
    #[error("invalid percent-encoding in '{0}'")]
    BadEncoding(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purl {
    pub package_type: String,
    pub namespace: Option<String>,
    pub name: String,
    pub version: Option<String>,
    pub qualifiers: Option<String>,
    pub subpath: Option<String>,
}

impl Purl {
    pub fn new(package_type: &str, namespace: Option<&str>, name: &str, version: Option<&str>) -> Self {
        Purl {
            package_type: package_type.to_lowercase(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            name: name.to_string(),
            version: version.filter(|v| !v.is_empty()).map(str::to_string),
            qualifiers: None,
            subpath: None,
        }
    }

    pub fn parse(input: &str) -> Result<Self, PurlError> {
        let rest = input
            .trim()
            .strip_prefix("pkg:")
            .ok_or(PurlError::MissingScheme)?
            .trim_start_matches('/');

        let (rest, subpath) = match rest.split_once('#') {
            Some((head, sub)) => (head, Some(sub.trim_matches('/').to_string())),
            None => (rest, None),
        };
        let (rest, qualifiers) = match rest.split_once('?') {
            Some((head, q)) => (head, Some(q.to_string())),
            None => (rest, None),
        };

        let (package_type, path) = rest.split_once('/').ok_or(PurlError::MissingName)?;
        let valid_type = !package_type.is_empty()
            && package_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-'))
            && !package_type.starts_with(|c: char| c.is_ascii_digit());
        if !valid_type {
            return Err(PurlError::InvalidType(package_type.to_string()));
        }

        // The version separator is the last '@' inside the final segment.
        let path = path.trim_end_matches('/');
        let segment_start = path.rfind('/').map_or(0, |s| s + 1);
        let (path, version) = match path[segment_start..].rfind('@') {
            Some(at) if at > 0 => {
                let at = segment_start + at;
                (&path[..at], Some(decode(&path[at + 1..])?))
            }
            _ => (path, None),
        };

        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let name = segments.pop().ok_or(PurlError::MissingName)?;
        let name = decode(name)?;
        if name.is_empty() {
            return Err(PurlError::MissingName);
        }
        let namespace = if segments.is_empty() {
            None
        } else {
            let decoded: Result<Vec<String>, PurlError> = segments.into_iter().map(decode).collect();
            Some(decoded?.join("/"))
        };

        Ok(Purl {
            package_type: package_type.to_lowercase(),
            namespace,
            name,
            version: version.filter(|v| !v.is_empty()),
            qualifiers,
            subpath,
        })
    }

    /// `namespace/name` for ecosystems that address packages by full path
    /// (`@scope/pkg` on npm, `group:artifact` is built by callers for Maven).
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Purl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkg:{}/", self.package_type)?;
        if let Some(ns) = &self.namespace {
            write!(f, "{}/", ns.replace('@', "%40"))?;
        }
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, "@{}", version)?;
        }
        if let Some(q) = &self.qualifiers {
            write!(f, "?{}", q)?;
        }
        if let Some(sub) = &self.subpath {
            write!(f, "#{}", sub)?;
        }
        Ok(())
    }
}

fn decode(segment: &str) -> Result<String, PurlError> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = segment
                .get(i + 1..i + 3)
                .ok_or_else(|| PurlError::BadEncoding(segment.to_string()))?;
            let byte =
                u8::from_str_radix(hex, 16).map_err(|_| PurlError::BadEncoding(segment.to_string()))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| PurlError::BadEncoding(segment.to_string()))
}
