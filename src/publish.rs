//! Publish flows: one document, or a whole directory tree.
//!
//! Both flows upload documents verbatim and publish their referenced assets
//! under an `assets/` directory next to them, resolving a public
//! direct-download link per asset. Rewriting references inside the
//! published copy is optional; the default leaves documents untouched so
//! they keep working locally.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::markdown::{self, AssetReference};
use crate::progress::ProgressFn;
use crate::remote_path;
use crate::services::webdav::WebDAVService;

/// Options shared by the publish flows.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Overwrite remote files that already exist.
    pub overwrite: bool,
    /// Rewrite asset references in the local document(s) to the resolved
    /// direct-download links after a successful publish.
    pub rewrite_links: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            rewrite_links: false,
        }
    }
}

/// Result of publishing one document.
#[derive(Debug, Clone)]
pub struct PublishResult {
    pub success: bool,
    pub message: String,
    pub doc_url: Option<String>,
    pub assets_uploaded: usize,
    pub links_replaced: usize,
    /// Assets that failed to upload or to resolve a share link.
    pub errors: Vec<String>,
}

impl PublishResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            doc_url: None,
            assets_uploaded: 0,
            links_replaced: 0,
            errors: Vec::new(),
        }
    }
}

/// Aggregate result of publishing a directory tree.
#[derive(Debug, Clone, Default)]
pub struct BatchPublishResult {
    pub total_docs: usize,
    pub success_docs: usize,
    pub failed_docs: usize,
    pub total_assets: usize,
    /// Share link for the published folder itself, when one could be
    /// resolved.
    pub folder_url: Option<String>,
    pub results: Vec<PublishResult>,
}

/// Publishes a single Markdown document and its referenced assets into
/// `remote_dir`. Asset references resolve relative to the document, so a
/// `../assets/` reference lands one level above the document's remote
/// directory.
pub async fn publish_document(
    service: &WebDAVService,
    document: &Path,
    remote_dir: &str,
    options: &PublishOptions,
    mut on_progress: Option<&mut ProgressFn<'_>>,
) -> PublishResult {
    if document.extension().map_or(true, |ext| ext != "md") {
        return PublishResult::failure(format!(
            "Not a Markdown document: {}",
            document.display()
        ));
    }

    let remote_dir = remote_path::normalize(remote_dir);
    info!("Publishing {} to {}", document.display(), remote_dir);

    let mut assets = markdown::scan_asset_references(document);
    for asset in &mut assets {
        asset.remote_path = remote_path::resolve(&remote_dir, &asset.relative_path);
    }

    let link_map = if assets.is_empty() {
        info!("No asset references found, skipping asset upload");
        HashMap::new()
    } else {
        info!("Uploading {} referenced assets", assets.len());
        service
            .upload_assets_and_get_links(&assets, on_progress.as_deref_mut(), options.overwrite)
            .await
    };

    let errors: Vec<String> = assets
        .iter()
        .filter(|asset| !link_map.contains_key(&asset.relative_path))
        .map(|asset| asset.relative_path.clone())
        .collect();

    let file_name = match document.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_string(),
        None => return PublishResult::failure("Document has no usable file name"),
    };
    let doc_remote = remote_path::join(&remote_dir, &file_name);

    if !service.upload_file(document, &doc_remote, options.overwrite).await {
        return PublishResult {
            errors,
            ..PublishResult::failure("Document upload failed")
        };
    }

    let doc_url = service.create_share_link(&doc_remote).await;

    let links_replaced = if options.rewrite_links && !link_map.is_empty() {
        match rewrite_document(document, &link_map) {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to rewrite asset links in {}: {:#}", document.display(), e);
                0
            }
        }
    } else {
        0
    };

    info!("Published document: {}", doc_remote);
    PublishResult {
        success: true,
        message: "Document published".to_string(),
        doc_url,
        assets_uploaded: link_map.len(),
        links_replaced,
        errors,
    }
}

/// Publishes every Markdown document under `directory` into `remote_dir`,
/// preserving the local directory structure. Assets referenced by any
/// document are deduplicated by local path across the whole tree and
/// uploaded once, into `{remote_dir}/assets/`.
pub async fn publish_directory(
    service: &WebDAVService,
    directory: &Path,
    remote_dir: &str,
    options: &PublishOptions,
    mut on_progress: Option<&mut ProgressFn<'_>>,
) -> BatchPublishResult {
    let remote_dir = remote_path::normalize(remote_dir);
    info!("Publishing directory {} to {}", directory.display(), remote_dir);

    let documents = markdown::scan_markdown_files(directory);
    if documents.is_empty() {
        warn!("No Markdown files found under {}", directory.display());
        return BatchPublishResult::default();
    }

    let assets = collect_unique_assets(&documents, &remote_dir);
    let link_map = if assets.is_empty() {
        info!("No asset references found in the tree");
        HashMap::new()
    } else {
        info!("Uploading {} unique assets referenced by the tree", assets.len());
        service
            .upload_assets_and_get_links(&assets, on_progress.as_deref_mut(), options.overwrite)
            .await
    };

    let mut results = Vec::with_capacity(documents.len());
    let mut success_docs = 0usize;
    let mut failed_docs = 0usize;
    let total = documents.len();

    for (index, document) in documents.iter().enumerate() {
        let file_name = document
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(cb) = on_progress.as_deref_mut() {
            cb(index + 1, total, &file_name);
        }

        let result = publish_tree_document(service, document, directory, &remote_dir, options, &link_map).await;
        if result.success {
            success_docs += 1;
            info!("Published {}", file_name);
        } else {
            failed_docs += 1;
            error!("Failed to publish {}: {}", file_name, result.message);
        }
        results.push(result);
    }

    let folder_url = if success_docs > 0 {
        service.folder_share_link(&remote_dir).await
    } else {
        None
    };

    info!(
        "Batch publish complete: {}/{} documents, {} assets",
        success_docs,
        total,
        link_map.len()
    );

    BatchPublishResult {
        total_docs: total,
        success_docs,
        failed_docs,
        total_assets: link_map.len(),
        folder_url,
        results,
    }
}

/// Rewrites asset references in a local document to their download links,
/// saving the result in place. Returns the substitution count.
pub fn rewrite_document(document: &Path, link_map: &HashMap<String, String>) -> Result<usize> {
    let content = std::fs::read_to_string(document)
        .with_context(|| format!("Failed to read {}", document.display()))?;
    let (new_content, replaced) = markdown::rewrite_asset_links(&content, link_map);
    if replaced > 0 {
        std::fs::write(document, new_content)
            .with_context(|| format!("Failed to write {}", document.display()))?;
    }
    Ok(replaced)
}

/// Scans every document and deduplicates assets across the tree by local
/// path, first occurrence winning. Remote paths land in
/// `{remote_dir}/assets/{file_name}`.
fn collect_unique_assets(documents: &[PathBuf], remote_dir: &str) -> Vec<AssetReference> {
    let assets_dir = remote_path::join(remote_dir, "assets");
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut unique = Vec::new();

    for document in documents {
        for mut asset in markdown::scan_asset_references(document) {
            if seen.insert(asset.local_path.clone()) {
                asset.remote_path = remote_path::join(&assets_dir, &asset.file_name);
                unique.push(asset);
            }
        }
    }
    unique
}

async fn publish_tree_document(
    service: &WebDAVService,
    document: &Path,
    directory: &Path,
    remote_dir: &str,
    options: &PublishOptions,
    link_map: &HashMap<String, String>,
) -> PublishResult {
    let relative = match document.strip_prefix(directory) {
        Ok(relative) => relative,
        Err(_) => return PublishResult::failure("Document lies outside the published directory"),
    };

    let relative = relative
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    let doc_remote = remote_path::join(remote_dir, &relative);

    if !service.upload_file(document, &doc_remote, options.overwrite).await {
        return PublishResult::failure("Document upload failed");
    }

    let links_replaced = if options.rewrite_links && !link_map.is_empty() {
        match rewrite_document(document, link_map) {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to rewrite asset links in {}: {:#}", document.display(), e);
                0
            }
        }
    } else {
        0
    };

    PublishResult {
        success: true,
        message: format!("Published {}", relative),
        doc_url: None,
        assets_uploaded: 0,
        links_replaced,
        errors: Vec::new(),
    }
}
