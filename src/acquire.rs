//! Artifact acquisition: turn a resolved download location into a local,
//! unpacked directory the inspecting providers can walk.
//!
//! Each artifact lives in its own temporary directory which is removed when
//! the [`Artifact`] is dropped.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tempfile::TempDir;
use thiserror::Error;

use crate::purl::Purl;
use crate::registry::USER_AGENT;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to unpack {file}: {reason}")]
    Unpack { file: String, reason: String },
    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// A package artifact available on the local filesystem.
#[derive(Debug)]
pub struct Artifact {
    pub path: PathBuf,
    _workdir: TempDir,
}

impl Artifact {
    /// An artifact inside a temporary directory removed on drop.
    pub fn in_workdir(path: impl Into<PathBuf>, workdir: TempDir) -> Self {
        Self {
            path: path.into(),
            _workdir: workdir,
        }
    }
}

#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch the artifact at `url` for `purl`.
    async fn fetch(&self, url: &str, purl: &Purl) -> Result<Artifact, AcquireError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ArchiveKind {
    Tar,
    Zip,
    Plain,
}

/// Downloads over HTTP(S) and unpacks tarballs and zip-based archives.
pub struct HttpFetcher {
    client: Client,
    work_root: Option<PathBuf>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, work_root: Option<PathBuf>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, work_root })
    }

    fn workdir(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("purl-notices-");
        match &self.work_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, purl: &Purl) -> Result<Artifact, AcquireError> {
        let workdir = self.workdir()?;
        let file_name = artifact_file_name(url, purl);
        let file_path = workdir.path().join(&file_name);

        tracing::debug!("downloading {} to {}", url, file_path.display());
        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AcquireError::Status(response.status().as_u16()));
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(&file_path, &bytes).await?;

        let kind = archive_kind(&file_name);
        if kind == ArchiveKind::Plain {
            return Ok(Artifact::in_workdir(file_path, workdir));
        }

        let dest = workdir.path().join("unpacked");
        tokio::fs::create_dir_all(&dest).await?;
        unpack(kind, &file_path, &dest).await?;
        Ok(Artifact::in_workdir(dest, workdir))
    }
}

/// `{type}_{name}_{version}{ext}`, with the extension taken from the URL or
/// implied by the package type when the URL has none.
fn artifact_file_name(url: &str, purl: &Purl) -> String {
    let url_path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    let ext = [".tar.gz", ".tgz", ".tar", ".whl", ".jar", ".gem", ".zip", ".nupkg", ".crate"]
        .into_iter()
        .find(|ext| url_path.ends_with(ext))
        .unwrap_or(match purl.package_type.as_str() {
            "cargo" => ".crate",
            "gem" => ".gem",
            "maven" => ".jar",
            "nuget" => ".nupkg",
            _ => ".tar.gz",
        });
    let safe_name = purl.name.replace(['/', '\\'], "_");
    format!(
        "{}_{}_{}{}",
        purl.package_type,
        safe_name,
        purl.version.as_deref().unwrap_or("latest"),
        ext
    )
}

fn archive_kind(file_name: &str) -> ArchiveKind {
    let lower = file_name.to_lowercase();
    if [".tar.gz", ".tgz", ".tar", ".crate", ".gem"].iter().any(|e| lower.ends_with(e)) {
        ArchiveKind::Tar
    } else if [".zip", ".whl", ".jar", ".nupkg", ".egg"].iter().any(|e| lower.ends_with(e)) {
        ArchiveKind::Zip
    } else {
        ArchiveKind::Plain
    }
}

async fn unpack(kind: ArchiveKind, file: &Path, dest: &Path) -> Result<(), AcquireError> {
    let unpack_error = |reason: String| AcquireError::Unpack {
        file: file.display().to_string(),
        reason,
    };
    match kind {
        ArchiveKind::Tar => {
            // GNU and BSD tar both detect gzip compression on extraction.
            let output = tokio::process::Command::new("tar")
                .arg("xf")
                .arg(file)
                .arg("-C")
                .arg(dest)
                .output()
                .await
                .map_err(|e| unpack_error(format!("tar: {}", e)))?;
            if !output.status.success() {
                return Err(unpack_error(String::from_utf8_lossy(&output.stderr).trim().to_string()));
            }
            Ok(())
        }
        ArchiveKind::Zip => {
            let file_owned = file.to_path_buf();
            let dest_owned = dest.to_path_buf();
            tokio::task::spawn_blocking(move || -> Result<(), String> {
                let reader = std::fs::File::open(&file_owned).map_err(|e| e.to_string())?;
                let mut archive = zip::ZipArchive::new(reader).map_err(|e| e.to_string())?;
                archive.extract(&dest_owned).map_err(|e| e.to_string())
            })
            .await
            .map_err(|e| unpack_error(e.to_string()))?
            .map_err(unpack_error)
        }
        ArchiveKind::Plain => Ok(()),
    }
}
