//! Idempotent recursive creation of remote directories.

use anyhow::{bail, Result};
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::connection::WebDAVConnection;
use crate::remote_path;

/// Ensures remote directories exist, parent-first, tolerating concurrent
/// creators. When a storage root is configured, creation is confined to it
/// and the root itself is only ever verified, never created.
#[derive(Clone)]
pub struct DirectoryManager {
    connection: Arc<WebDAVConnection>,
}

impl DirectoryManager {
    pub fn new(connection: Arc<WebDAVConnection>) -> Self {
        Self { connection }
    }

    /// Ensures `path` exists remotely. Returns `false` on any failure; the
    /// failure is logged, not propagated.
    pub async fn ensure_directory(&self, path: &str) -> bool {
        match self.ensure_inner(path).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to ensure remote directory '{}': {:#}", path, e);
                false
            }
        }
    }

    async fn ensure_inner(&self, path: &str) -> Result<()> {
        let path = remote_path::normalize(path);
        if path == "/" {
            return Ok(());
        }

        let storage_root = self
            .connection
            .config()
            .storage_root
            .clone()
            .filter(|root| root != "/");

        if let Some(ref root) = storage_root {
            if !remote_path::is_within(&path, root) {
                warn!(
                    "Refusing to create '{}': outside the configured storage root '{}'",
                    path, root
                );
                bail!(
                    "Path '{}' lies outside the configured storage root '{}'",
                    path,
                    root
                );
            }
        }

        // Existence short-circuit: the common case after the first publish.
        if self.connection.exists(&path).await? {
            debug!("Remote directory already exists: {}", path);
            return Ok(());
        }

        for level in ancestor_chain(&path, storage_root.as_deref()) {
            if storage_root.as_deref() == Some(level.as_str()) {
                if !self.connection.exists(&level).await? {
                    bail!(
                        "Storage root '{}' does not exist on the server. Provision it \
                         out-of-band before publishing; the engine never creates the root.",
                        level
                    );
                }
                continue;
            }

            if self.connection.exists(&level).await? {
                continue;
            }

            self.create_level(&level).await?;
        }

        Ok(())
    }

    async fn create_level(&self, level: &str) -> Result<()> {
        let status = match self.connection.mkcol(level).await {
            Ok(status) => status,
            Err(e) => {
                // A concurrent publisher may have created it while our
                // request failed in transit.
                if self.connection.exists(level).await.unwrap_or(false) {
                    debug!("Directory appeared concurrently: {}", level);
                    return Ok(());
                }
                return Err(e);
            }
        };

        if status.is_success() {
            info!("Created remote directory: {}", level);
            return Ok(());
        }

        // Re-check once: another actor may have won the creation race
        // (typically surfacing as 405 Method Not Allowed).
        if self.connection.exists(level).await.unwrap_or(false) {
            debug!("Directory was created concurrently: {}", level);
            return Ok(());
        }

        if status == StatusCode::FORBIDDEN {
            bail!(
                "Creating '{}' was forbidden (HTTP 403). Common causes: a login password \
                 was used instead of an app password, the user lacks write permission \
                 here, or the storage root has not been provisioned.",
                level
            );
        }

        bail!("Failed to create remote directory '{}': HTTP {}", level, status)
    }
}

/// All prefixes of `path` from the top down. With a storage root configured
/// the chain starts at the root itself; its ancestors are implied by its
/// existence.
fn ancestor_chain(path: &str, storage_root: Option<&str>) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = String::new();
    for segment in path.trim_start_matches('/').split('/') {
        current.push('/');
        current.push_str(segment);
        chain.push(current.clone());
    }

    if let Some(root) = storage_root {
        if let Some(pos) = chain.iter().position(|level| level == root) {
            return chain.split_off(pos);
        }
    }
    chain
}
