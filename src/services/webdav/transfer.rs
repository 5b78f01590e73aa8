//! File and directory transfer with overwrite-vs-skip semantics.

use anyhow::{anyhow, bail, Result};
use reqwest::{Method, StatusCode};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::connection::WebDAVConnection;
use super::directories::DirectoryManager;
use super::propfind::{parse_propfind_response, RemoteEntry};
use crate::progress::{self, ProgressFn};
use crate::remote_path;

/// One file scheduled for upload.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub local_path: PathBuf,
    pub remote_path: String,
}

/// Aggregate result of a directory download. `success` holds exactly when
/// no per-file error occurred; skipped files are not errors.
#[derive(Debug, Clone, Default)]
pub struct DownloadOutcome {
    pub success: bool,
    pub downloaded: usize,
    pub skipped: usize,
    pub total: usize,
    pub errors: Vec<String>,
}

impl DownloadOutcome {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            errors: vec![message],
            ..Self::default()
        }
    }
}

/// The single authoritative skip decision for downloads: made inside
/// `fetch_file` and reported upward, so callers never re-derive it.
enum FileDisposition {
    Written,
    SkippedExisting,
}

#[derive(Clone)]
pub struct TransferEngine {
    connection: Arc<WebDAVConnection>,
    directories: DirectoryManager,
}

impl TransferEngine {
    pub fn new(connection: Arc<WebDAVConnection>, directories: DirectoryManager) -> Self {
        Self {
            connection,
            directories,
        }
    }

    /// Uploads one local file. Returns `true` on success, including the
    /// no-op case where the remote file exists and `overwrite` is off.
    pub async fn upload_file(&self, local: &Path, remote: &str, overwrite: bool) -> bool {
        match self.upload_inner(local, remote, overwrite).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to upload '{}': {:#}", remote, e);
                false
            }
        }
    }

    async fn upload_inner(&self, local: &Path, remote: &str, overwrite: bool) -> Result<()> {
        let remote = remote_path::normalize(remote);
        let parent = remote_path::parent(&remote);

        if !self.directories.ensure_directory(&parent).await {
            bail!("Remote parent directory '{}' is unavailable", parent);
        }

        let bytes = tokio::fs::read(local)
            .await
            .map_err(|e| anyhow!("Failed to read local file {}: {}", local.display(), e))?;

        let exists = self.connection.exists(&remote).await?;
        if exists && !overwrite {
            info!("Remote file already exists, skipping upload: {}", remote);
            return Ok(());
        }

        // An existing file is overwritten unconditionally; a new file must
        // not have appeared since the existence check.
        let precondition = if exists {
            ("If-Match", "*")
        } else {
            ("If-None-Match", "*")
        };

        let url = self.connection.config().url_for_path(&remote);
        let response = self
            .connection
            .request(
                Method::PUT,
                &url,
                Some(bytes),
                &[precondition, ("Content-Type", "application/octet-stream")],
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::FORBIDDEN {
                bail!(
                    "Upload of '{}' was forbidden (HTTP 403). Check that an app password \
                     is used and the user has write permission.",
                    remote
                );
            }
            bail!("Upload of '{}' failed: HTTP {}", remote, status);
        }

        info!(
            "{} file: {} -> {}",
            if exists { "Overwrote" } else { "Uploaded" },
            local.display(),
            remote
        );
        Ok(())
    }

    /// Uploads a batch sequentially. Every item is attempted; the return
    /// value is `true` only when all of them succeeded.
    pub async fn upload_files(
        &self,
        items: &[UploadItem],
        mut on_progress: Option<&mut ProgressFn<'_>>,
        overwrite: bool,
    ) -> bool {
        let total = items.len();
        let mut succeeded = 0usize;

        for (index, item) in items.iter().enumerate() {
            let file_name = item
                .local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| item.remote_path.clone());

            progress::report(&mut on_progress, index + 1, total, &file_name);

            if self
                .upload_file(&item.local_path, &item.remote_path, overwrite)
                .await
            {
                succeeded += 1;
            }
        }

        info!("Batch upload complete: {}/{}", succeeded, total);
        succeeded == total
    }

    /// Downloads one remote file to a local path. A skipped pre-existing
    /// local file counts as success.
    pub async fn download_file(&self, remote: &str, local: &Path, overwrite: bool) -> bool {
        match self.fetch_file(remote, local, overwrite).await {
            Ok(_) => true,
            Err(e) => {
                error!("Failed to download '{}': {:#}", remote, e);
                false
            }
        }
    }

    async fn fetch_file(
        &self,
        remote: &str,
        local: &Path,
        overwrite: bool,
    ) -> Result<FileDisposition> {
        let remote = remote_path::normalize(remote);

        if !self.connection.exists(&remote).await? {
            bail!("Remote file does not exist: {}", remote);
        }

        if !overwrite && local.exists() {
            info!("Local file already exists, skipping download: {}", local.display());
            return Ok(FileDisposition::SkippedExisting);
        }

        let url = self.connection.config().url_for_path(&remote);
        let response = self.connection.request(Method::GET, &url, None, &[]).await?;
        let status = response.status();
        if !status.is_success() {
            bail!("Download of '{}' failed: HTTP {}", remote, status);
        }

        let bytes = response.bytes().await?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local, &bytes).await?;

        info!("Downloaded file: {} -> {}", remote, local.display());
        Ok(FileDisposition::Written)
    }

    /// Lists one directory level. Entry paths come back relative to the
    /// file space; the listed collection itself is dropped.
    async fn list_level(&self, dir: &str) -> Result<Vec<RemoteEntry>> {
        let dir = remote_path::normalize(dir);
        let response = self.connection.propfind(&dir, "1").await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            bail!("Remote directory does not exist: {}", dir);
        }
        if status != StatusCode::MULTI_STATUS && !status.is_success() {
            bail!("Listing of '{}' failed: HTTP {}", dir, status);
        }

        let body = response.text().await?;
        let config = self.connection.config();
        let entries = parse_propfind_response(&body)?
            .into_iter()
            .map(|mut entry| {
                entry.href = config.relative_from_href(&entry.href);
                entry
            })
            .filter(|entry| entry.href != dir)
            .collect();
        Ok(entries)
    }

    /// Recursively lists a directory, one Depth-1 PROPFIND per level,
    /// strictly sequentially.
    pub async fn list_directory_recursive(&self, remote_dir: &str) -> Result<Vec<RemoteEntry>> {
        let root = remote_path::normalize(remote_dir);
        let mut pending = VecDeque::from([root]);
        let mut all = Vec::new();

        while let Some(dir) = pending.pop_front() {
            for entry in self.list_level(&dir).await? {
                if entry.is_directory {
                    pending.push_back(entry.href.clone());
                }
                all.push(entry);
            }
        }

        Ok(all)
    }

    /// Downloads a whole remote directory tree, preserving structure. A
    /// listing failure aborts with a single error; per-file failures
    /// accumulate without stopping the batch.
    pub async fn download_directory(
        &self,
        remote_dir: &str,
        local_dir: &Path,
        overwrite: bool,
        mut on_progress: Option<&mut ProgressFn<'_>>,
    ) -> DownloadOutcome {
        let remote_dir = remote_path::normalize(remote_dir);

        match self.connection.exists(&remote_dir).await {
            Ok(true) => {}
            Ok(false) => {
                let message = format!("Remote directory does not exist: {}", remote_dir);
                error!("{}", message);
                return DownloadOutcome::failed(message);
            }
            Err(e) => {
                let message = format!("Failed to probe remote directory '{}': {:#}", remote_dir, e);
                error!("{}", message);
                return DownloadOutcome::failed(message);
            }
        }

        let entries = match self.list_directory_recursive(&remote_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                let message = format!("Failed to list remote directory '{}': {:#}", remote_dir, e);
                error!("{}", message);
                return DownloadOutcome::failed(message);
            }
        };

        let files: Vec<RemoteEntry> = entries.into_iter().filter(|e| !e.is_directory).collect();
        let total = files.len();

        if let Err(e) = tokio::fs::create_dir_all(local_dir).await {
            let message = format!(
                "Failed to create local directory {}: {}",
                local_dir.display(),
                e
            );
            error!("{}", message);
            return DownloadOutcome::failed(message);
        }

        if total == 0 {
            warn!("Remote directory contains no files: {}", remote_dir);
            return DownloadOutcome {
                success: true,
                ..DownloadOutcome::default()
            };
        }

        let mut downloaded = 0usize;
        let mut skipped = 0usize;
        let mut errors = Vec::new();

        for (index, file) in files.iter().enumerate() {
            progress::report(&mut on_progress, index + 1, total, &file.name);

            let local_path = map_to_local(&remote_dir, &file.href, local_dir);
            match self.fetch_file(&file.href, &local_path, overwrite).await {
                Ok(FileDisposition::Written) => downloaded += 1,
                Ok(FileDisposition::SkippedExisting) => skipped += 1,
                Err(e) => {
                    error!("Failed to download '{}': {:#}", file.href, e);
                    errors.push(file.href.clone());
                }
            }
        }

        let success = errors.is_empty();
        if success {
            info!(
                "Directory download complete: {} downloaded, {} skipped out of {} files",
                downloaded, skipped, total
            );
        } else {
            warn!(
                "Directory download finished with failures: {} downloaded, {} skipped, {} failed out of {}",
                downloaded,
                skipped,
                errors.len(),
                total
            );
        }

        DownloadOutcome {
            success,
            downloaded,
            skipped,
            total,
            errors,
        }
    }
}

/// Maps a remote file path under `remote_dir` onto `local_dir`, preserving
/// intermediate directories.
fn map_to_local(remote_dir: &str, remote_file: &str, local_dir: &Path) -> PathBuf {
    let relative = if remote_dir == "/" {
        remote_file.trim_start_matches('/')
    } else {
        // Only a whole-segment prefix counts: "/docs2/x" is not under "/docs".
        match remote_file.strip_prefix(remote_dir) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                rest.trim_start_matches('/')
            }
            _ => remote_file.trim_start_matches('/'),
        }
    };

    let mut local = local_dir.to_path_buf();
    // `..` segments are dropped so a hostile href cannot climb out of
    // `local_dir`.
    for segment in relative
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
    {
        local.push(segment);
    }
    local
}
