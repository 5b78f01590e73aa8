//! Public share links via the OCS sharing API.
//!
//! Shares are addressed by file-space path. The server's own share registry
//! is the source of truth: lookups are network round-trips, and reuse is
//! existing-first to avoid duplicate-link churn on repeated publishes.

use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{error, info, warn};

use super::config::WebDAVConfig;
use crate::progress::{self, ProgressFn};
use crate::remote_path;

const SHARES_ENDPOINT: &str = "/ocs/v2.php/apps/files_sharing/api/v1/shares";

/// Public link share type in the OCS API.
const SHARE_TYPE_PUBLIC: i64 = 3;
/// Read-only permission bit.
const PERMISSION_READ: i64 = 1;

#[derive(Debug, Deserialize)]
struct OcsEnvelope<T> {
    ocs: OcsBody<T>,
}

#[derive(Debug, Deserialize)]
struct OcsBody<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ShareData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShareEntry {
    share_type: Option<i64>,
    url: Option<String>,
}

/// Client for the JSON sharing API, separate from the DAV namespace.
#[derive(Clone)]
pub struct ShareClient {
    client: Client,
    config: WebDAVConfig,
}

impl ShareClient {
    pub fn new(config: WebDAVConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    fn shares_url(&self) -> String {
        format!("{}{}", self.config.base_url(), SHARES_ENDPOINT)
    }

    /// Creates a public read-only share for `path`. When the server answers
    /// 403 the link likely exists already, so the existing-link lookup is
    /// tried before giving up.
    pub async fn create_share_link(&self, path: &str) -> Option<String> {
        let path = remote_path::normalize(path);
        match self.create_inner(&path).await {
            Ok(url) => {
                info!("Created share link: {} -> {}", path, url);
                Some(url)
            }
            Err(CreateError::Conflict) => {
                warn!("Share link may already exist, looking up existing link: {}", path);
                self.get_existing_share_link(&path).await
            }
            Err(CreateError::Other(e)) => {
                error!("Failed to create share link for '{}': {:#}", path, e);
                None
            }
        }
    }

    async fn create_inner(&self, path: &str) -> std::result::Result<String, CreateError> {
        let response = self
            .client
            .post(self.shares_url())
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("OCS-APIRequest", "true")
            .query(&[("format", "json")])
            .json(&serde_json::json!({
                "path": path,
                "shareType": SHARE_TYPE_PUBLIC,
                "permissions": PERMISSION_READ,
            }))
            .send()
            .await
            .map_err(|e| CreateError::Other(e.into()))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(CreateError::Conflict);
        }
        if !status.is_success() {
            return Err(CreateError::Other(anyhow!("HTTP {}", status)));
        }

        let envelope: OcsEnvelope<ShareData> = response
            .json()
            .await
            .map_err(|e| CreateError::Other(anyhow!("Invalid share response: {}", e)))?;

        envelope
            .ocs
            .data
            .url
            .ok_or_else(|| CreateError::Other(anyhow!("Share response carried no URL")))
    }

    /// Returns the first existing public link for `path`, or `None`.
    pub async fn get_existing_share_link(&self, path: &str) -> Option<String> {
        let path = remote_path::normalize(path);
        match self.list_inner(&path).await {
            Ok(Some(url)) => {
                info!("Found existing share link: {} -> {}", path, url);
                Some(url)
            }
            Ok(None) => None,
            Err(e) => {
                error!("Failed to look up share links for '{}': {:#}", path, e);
                None
            }
        }
    }

    async fn list_inner(&self, path: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.shares_url())
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("OCS-APIRequest", "true")
            .query(&[("format", "json"), ("path", path), ("reshares", "true")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("HTTP {}", status));
        }

        let envelope: OcsEnvelope<Vec<ShareEntry>> = response.json().await?;
        Ok(envelope
            .ocs
            .data
            .into_iter()
            .find(|share| share.share_type == Some(SHARE_TYPE_PUBLIC))
            .and_then(|share| share.url))
    }

    /// Existing-first, create-on-miss. The preferred entry point when
    /// republishing the same files.
    pub async fn get_or_create_share_link(&self, path: &str) -> Option<String> {
        if let Some(existing) = self.get_existing_share_link(path).await {
            info!("Reusing existing share link: {} -> {}", path, existing);
            return Some(existing);
        }
        self.create_share_link(path).await
    }

    /// Creates (or reuses) share links for a batch of paths. Paths without
    /// a resolvable link are absent from the result.
    pub async fn create_share_links(
        &self,
        paths: &[String],
        mut on_progress: Option<&mut ProgressFn<'_>>,
    ) -> HashMap<String, String> {
        let total = paths.len();
        let mut links = HashMap::new();

        for (index, path) in paths.iter().enumerate() {
            progress::report(&mut on_progress, index + 1, total, path);
            if let Some(url) = self.create_share_link(path).await {
                links.insert(path.clone(), url);
            }
        }

        info!("Share link batch complete: {}/{}", links.len(), total);
        links
    }

    /// Turns a share page URL into a direct-download URL.
    pub fn direct_download_link(&self, share_url: &str) -> String {
        if share_url.ends_with('/') {
            format!("{}download", share_url)
        } else {
            format!("{}/download", share_url)
        }
    }
}

enum CreateError {
    /// 403 from the share endpoint: the link usually exists already.
    Conflict,
    Other(anyhow::Error),
}
