//! On-disk cache of reconciled packages.
//!
//! The file is a versioned JSON document:
//!
//! ```json
//! { "format": "purl-notices-cache", "version": 1,
//!   "generated_at": "2026-01-01T00:00:00Z", "packages": [ ... ] }
//! ```
//!
//! Saves go through a uniquely named temporary file in the target directory
//! followed by a rename, so readers only ever see the old or the new list.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Package;

pub const CACHE_FORMAT: &str = "purl-notices-cache";
pub const CACHE_VERSION: u64 = 1;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cannot access cache file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache file {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("cache file {} has unsupported version {found} (expected {expected})", .path.display(), expected = CACHE_VERSION)]
    UnsupportedVersion { path: PathBuf, found: u64 },
    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct CacheDocumentRef<'a> {
    format: &'static str,
    version: u64,
    generated_at: DateTime<Utc>,
    tool_version: &'static str,
    packages: &'a [Package],
}

#[derive(Debug, Deserialize)]
struct CacheHeader {
    #[serde(default)]
    format: Option<String>,
    version: u64,
    packages: Vec<serde_json::Value>,
}

pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write the whole package list, replacing the previous contents
    /// atomically.
    pub fn save(&self, packages: &[Package]) -> Result<(), CacheError> {
        let io_error = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        let document = CacheDocumentRef {
            format: CACHE_FORMAT,
            version: CACHE_VERSION,
            generated_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION"),
            packages,
        };
        let json = serde_json::to_string_pretty(&document)?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(io_error)?;

        let mut temp = tempfile::Builder::new()
            .prefix(".purl-notices-cache")
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(io_error)?;
        temp.write_all(json.as_bytes()).map_err(io_error)?;
        temp.as_file().sync_all().map_err(io_error)?;
        temp.persist(&self.path).map_err(|e| io_error(e.error))?;

        tracing::info!("saved {} packages to {}", packages.len(), self.path.display());
        Ok(())
    }

    /// Read the package list back, in saved order.
    pub fn load(&self) -> Result<Vec<Package>, CacheError> {
        let header = self.read_header()?;
        header
            .packages
            .into_iter()
            .enumerate()
            .map(|(i, record)| {
                serde_json::from_value(record).map_err(|e| self.corrupt(format!("package record {}: {}", i, e)))
            })
            .collect()
    }

    /// Check that the file is readable and every record parses, returning the
    /// number of packages. Providers are not consulted.
    pub fn validate(&self) -> Result<usize, CacheError> {
        self.load().map(|packages| packages.len())
    }

    fn read_header(&self) -> Result<CacheHeader, CacheError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })?;
        let header: CacheHeader =
            serde_json::from_str(&content).map_err(|e| self.corrupt(e.to_string()))?;

        if let Some(format) = &header.format {
            if format != CACHE_FORMAT {
                return Err(self.corrupt(format!("unexpected format '{}'", format)));
            }
        }
        if header.version != CACHE_VERSION {
            return Err(CacheError::UnsupportedVersion {
                path: self.path.clone(),
                found: header.version,
            });
        }
        Ok(header)
    }

    fn corrupt(&self, reason: String) -> CacheError {
        CacheError::Corrupt {
            path: self.path.clone(),
            reason,
        }
    }
}
