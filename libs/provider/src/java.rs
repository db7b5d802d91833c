//! Minecraft: Java Edition provider backed by Mojang's launcher manifest.
//!
//! The launcher manifest lists every version with a link to its own version
//! manifest, which in turn names the server JAR with its SHA-1 and size.
//! Both are fetched lazily and cached for the life of the provider.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use mcl_startstop::ManagedProcess;
use reqwest::Client;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::provider::{Edition, Instance, Provider, RunOptions};
use crate::server::JavaServer;

/// Mojang's launcher manifest.
pub const LAUNCHER_MANIFEST_URL: &str =
    "https://launchermeta.mojang.com/mc/game/version_manifest.json";

/// File name of the server JAR inside an instance's base directory.
pub const SERVER_JAR: &str = "server.jar";

/// Oldest version whose server JAR is listed in the launcher manifest.
const OLDEST_SUPPORTED: &str = "1.2.5";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One entry of the launcher manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub time: DateTime<Utc>,
    pub release_time: DateTime<Utc>,
}

/// Server download described by a version manifest.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerDownload {
    /// Hex-encoded SHA-1.
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct LauncherManifest {
    #[serde(default)]
    latest: HashMap<String, String>,
    versions: Vec<VersionInfo>,
}

#[derive(Debug, Deserialize)]
struct VersionManifest {
    downloads: VersionDownloads,
}

#[derive(Debug, Deserialize)]
struct VersionDownloads {
    server: Option<ServerDownload>,
}

/// Launcher manifest indexed by version id and alias.
#[derive(Debug)]
struct ManifestIndex {
    versions: Vec<VersionInfo>,
    lookup: HashMap<String, usize>,
}

impl ManifestIndex {
    fn build(manifest: LauncherManifest) -> Result<Self, ProviderError> {
        let mut lookup: HashMap<String, usize> = manifest
            .versions
            .iter()
            .enumerate()
            .map(|(i, v)| (v.id.clone(), i))
            .collect();

        for (alias, version) in manifest.latest {
            let Some(&index) = lookup.get(&version) else {
                return Err(ProviderError::ManifestAlias { alias, version });
            };
            lookup.insert(alias, index);
        }

        Ok(Self {
            versions: manifest.versions,
            lookup,
        })
    }

    fn get(&self, version: &str) -> Option<&VersionInfo> {
        self.lookup.get(version).map(|&i| &self.versions[i])
    }
}

/// Provider for Minecraft: Java Edition.
pub struct JavaProvider {
    client: Client,
    manifest_url: String,
    index: RwLock<Option<Arc<ManifestIndex>>>,
    downloads: Mutex<HashMap<String, ServerDownload>>,
}

impl JavaProvider {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_manifest_url(LAUNCHER_MANIFEST_URL)
    }

    /// Provider reading the launcher manifest from another location.
    pub fn with_manifest_url(url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            client,
            manifest_url: url.into(),
            index: RwLock::new(None),
            downloads: Mutex::new(HashMap::new()),
        })
    }

    /// Path of the server JAR for an instance.
    pub fn jar_path(inst: &Instance) -> PathBuf {
        inst.base_dir().join(SERVER_JAR)
    }

    async fn index(&self) -> Result<Arc<ManifestIndex>, ProviderError> {
        if let Some(index) = self.index.read().await.as_ref() {
            return Ok(Arc::clone(index));
        }

        let mut slot = self.index.write().await;
        if let Some(index) = slot.as_ref() {
            return Ok(Arc::clone(index));
        }

        debug!(url = %self.manifest_url, "Fetching launcher manifest");
        let body = self
            .client
            .get(&self.manifest_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let manifest: LauncherManifest = serde_json::from_slice(&body)?;
        let index = Arc::new(ManifestIndex::build(manifest)?);
        debug!(versions = index.versions.len(), "Launcher manifest cached");

        *slot = Some(Arc::clone(&index));
        Ok(index)
    }

    async fn version_info(&self, version: &str) -> Result<VersionInfo, ProviderError> {
        self.index()
            .await?
            .get(version)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownVersion(version.to_string()))
    }

    /// Server download for a version, fetching its version manifest once.
    pub async fn server_download(&self, version: &str) -> Result<ServerDownload, ProviderError> {
        let info = self.version_info(version).await?;

        let mut downloads = self.downloads.lock().await;
        if let Some(download) = downloads.get(&info.id) {
            return Ok(download.clone());
        }

        debug!(version = %info.id, url = %info.url, "Fetching version manifest");
        let body = self
            .client
            .get(&info.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let manifest: VersionManifest = serde_json::from_slice(&body)?;
        let download = manifest
            .downloads
            .server
            .ok_or_else(|| ProviderError::NoServerDownload(info.id.clone()))?;

        downloads.insert(info.id, download.clone());
        Ok(download)
    }

    /// Stream `download` to `dest` through a temporary file, verifying size
    /// and SHA-1 before the rename.
    async fn download_to(&self, download: &ServerDownload, dest: &Path) -> Result<u64, ProviderError> {
        let temp_path = dest.with_extension("jar.part");
        let result = self.download_unverified(download, &temp_path).await;

        let (size, digest) = match result {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        let mismatch = if size != download.size {
            Some(ProviderError::SizeMismatch {
                expected: download.size,
                actual: size,
            })
        } else if !digest.eq_ignore_ascii_case(&download.sha1) {
            Some(ProviderError::ChecksumMismatch {
                expected: download.sha1.clone(),
                actual: digest,
            })
        } else {
            None
        };
        if let Some(err) = mismatch {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(err);
        }

        tokio::fs::rename(&temp_path, dest)
            .await
            .map_err(|e| ProviderError::io(dest, e))?;
        Ok(size)
    }

    async fn download_unverified(
        &self,
        download: &ServerDownload,
        path: &Path,
    ) -> Result<(u64, String), ProviderError> {
        let response = self
            .client
            .get(&download.url)
            .send()
            .await?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| ProviderError::io(path, e))?;
        let mut hasher = Sha1::new();
        let mut size = 0u64;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            size += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| ProviderError::io(path, e))?;
        }

        file.flush().await.map_err(|e| ProviderError::io(path, e))?;
        file.sync_all().await.map_err(|e| ProviderError::io(path, e))?;

        Ok((size, hex::encode(hasher.finalize())))
    }
}

impl std::fmt::Debug for JavaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JavaProvider")
            .field("manifest_url", &self.manifest_url)
            .finish_non_exhaustive()
    }
}

/// SHA-1 of a file, hex-encoded.
async fn sha1_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[async_trait]
impl Provider for JavaProvider {
    fn edition(&self) -> Edition {
        Edition {
            id: "java",
            name: "Minecraft: Java Edition",
        }
    }

    async fn versions(&self) -> Result<Vec<String>, ProviderError> {
        let index = self.index().await?;
        let oldest = index
            .get(OLDEST_SUPPORTED)
            .ok_or(ProviderError::MissingBaseline(OLDEST_SUPPORTED))?;

        Ok(index
            .versions
            .iter()
            .filter(|v| v.release_time >= oldest.release_time)
            .map(|v| v.id.clone())
            .collect())
    }

    fn default_version(&self) -> &'static str {
        "release"
    }

    async fn resolve_version(&self, version: &str) -> Result<String, ProviderError> {
        Ok(self.version_info(version).await?.id)
    }

    async fn is_fetch_needed(&self, inst: &Instance) -> Result<bool, ProviderError> {
        let download = self.server_download(inst.version()).await?;
        let jar = Self::jar_path(inst);

        match sha1_file(&jar).await {
            Ok(digest) => {
                let stale = !digest.eq_ignore_ascii_case(&download.sha1);
                if stale {
                    debug!(path = %jar.display(), "Server JAR checksum differs");
                }
                Ok(stale)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(ProviderError::io(jar, e)),
        }
    }

    async fn fetch(&self, inst: &Instance) -> Result<(), ProviderError> {
        let download = self.server_download(inst.version()).await?;

        tokio::fs::create_dir_all(inst.base_dir())
            .await
            .map_err(|e| ProviderError::io(inst.base_dir(), e))?;

        let jar = Self::jar_path(inst);
        info!(version = %inst.version(), url = %download.url, dest = %jar.display(), "Downloading server JAR");
        let size = self.download_to(&download, &jar).await?;
        info!(version = %inst.version(), size, "Server JAR downloaded");
        Ok(())
    }

    async fn is_prepare_needed(&self, _inst: &Instance) -> Result<bool, ProviderError> {
        Ok(false)
    }

    async fn prepare(&self, _inst: &Instance) -> Result<(), ProviderError> {
        Ok(())
    }

    fn server(
        &self,
        inst: &Instance,
        options: RunOptions,
    ) -> Result<Arc<dyn ManagedProcess>, ProviderError> {
        let jar = Self::jar_path(inst);
        let jar = std::path::absolute(&jar).map_err(|e| ProviderError::io(&jar, e))?;
        Ok(Arc::new(JavaServer::new(jar, options)))
    }
}
