use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::config::{RetryConfig, WebDAVConfig};
use super::connection::{ConnectionResult, WebDAVConnection};
use super::directories::DirectoryManager;
use super::shares::ShareClient;
use super::transfer::{DownloadOutcome, TransferEngine, UploadItem};
use crate::markdown::AssetReference;
use crate::progress::ProgressFn;

/// Facade over the WebDAV transfer engine and the sharing API.
///
/// Owns no persistent state: every call is a fresh logical transaction
/// addressed by explicit paths. Instances are cheap to clone and
/// independent of one another.
#[derive(Clone)]
pub struct WebDAVService {
    connection: Arc<WebDAVConnection>,
    directories: DirectoryManager,
    transfer: TransferEngine,
    shares: ShareClient,
}

impl WebDAVService {
    pub fn new(config: WebDAVConfig) -> Result<Self> {
        Self::new_with_retry(config, RetryConfig::default())
    }

    pub fn new_with_retry(config: WebDAVConfig, retry_config: RetryConfig) -> Result<Self> {
        config.validate()?;

        let connection = Arc::new(WebDAVConnection::new(config.clone(), retry_config)?);
        let directories = DirectoryManager::new(Arc::clone(&connection));
        let transfer = TransferEngine::new(Arc::clone(&connection), directories.clone());
        let shares = ShareClient::new(config)?;

        Ok(Self {
            connection,
            directories,
            transfer,
            shares,
        })
    }

    pub fn config(&self) -> &WebDAVConfig {
        self.connection.config()
    }

    /// Probes the connection and the file-space root.
    pub async fn test_connection(&self) -> ConnectionResult {
        self.connection.test_connection().await
    }

    /// Checks whether a remote path exists.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        self.connection.exists(path).await
    }

    /// Ensures a remote directory exists, creating missing levels.
    pub async fn ensure_directory(&self, path: &str) -> bool {
        self.directories.ensure_directory(path).await
    }

    /// Uploads one file; see [`TransferEngine::upload_file`].
    pub async fn upload_file(&self, local: &Path, remote: &str, overwrite: bool) -> bool {
        self.transfer.upload_file(local, remote, overwrite).await
    }

    /// Uploads a batch of files sequentially.
    pub async fn upload_files(
        &self,
        items: &[UploadItem],
        on_progress: Option<&mut ProgressFn<'_>>,
        overwrite: bool,
    ) -> bool {
        self.transfer.upload_files(items, on_progress, overwrite).await
    }

    /// Downloads one remote file.
    pub async fn download_file(&self, remote: &str, local: &Path, overwrite: bool) -> bool {
        self.transfer.download_file(remote, local, overwrite).await
    }

    /// Downloads a whole remote directory tree.
    pub async fn download_directory(
        &self,
        remote_dir: &str,
        local_dir: &Path,
        overwrite: bool,
        on_progress: Option<&mut ProgressFn<'_>>,
    ) -> DownloadOutcome {
        self.transfer
            .download_directory(remote_dir, local_dir, overwrite, on_progress)
            .await
    }

    /// Creates a public read-only share link, falling back to an existing
    /// one on conflict.
    pub async fn create_share_link(&self, path: &str) -> Option<String> {
        self.shares.create_share_link(path).await
    }

    /// Returns an existing public link for a path, if any.
    pub async fn get_existing_share_link(&self, path: &str) -> Option<String> {
        self.shares.get_existing_share_link(path).await
    }

    /// Existing-first share link resolution.
    pub async fn get_or_create_share_link(&self, path: &str) -> Option<String> {
        self.shares.get_or_create_share_link(path).await
    }

    /// Share link for a published folder.
    pub async fn folder_share_link(&self, folder_path: &str) -> Option<String> {
        self.shares.create_share_link(folder_path).await
    }

    /// Direct-download form of a share URL.
    pub fn direct_download_link(&self, share_url: &str) -> String {
        self.shares.direct_download_link(share_url)
    }

    /// Uploads every asset to its precomputed remote path, resolves a share
    /// link per remote path, and projects direct-download URLs back onto the
    /// assets' document-relative paths. An asset whose upload or share
    /// request failed is absent from the map; that is not fatal for the
    /// batch.
    pub async fn upload_assets_and_get_links(
        &self,
        assets: &[AssetReference],
        on_progress: Option<&mut ProgressFn<'_>>,
        overwrite: bool,
    ) -> HashMap<String, String> {
        let items: Vec<UploadItem> = assets
            .iter()
            .map(|asset| UploadItem {
                local_path: asset.local_path.clone(),
                remote_path: asset.remote_path.clone(),
            })
            .collect();

        self.transfer.upload_files(&items, on_progress, overwrite).await;

        let remote_paths: Vec<String> = assets.iter().map(|a| a.remote_path.clone()).collect();
        let link_map = self.shares.create_share_links(&remote_paths, None).await;

        let mut result = HashMap::new();
        for asset in assets {
            if let Some(share_url) = link_map.get(&asset.remote_path) {
                result.insert(
                    asset.relative_path.clone(),
                    self.shares.direct_download_link(share_url),
                );
            }
        }

        info!(
            "Asset upload-and-share complete: {}/{} links resolved",
            result.len(),
            assets.len()
        );
        result
    }
}
