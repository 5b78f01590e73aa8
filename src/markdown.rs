//! Markdown document handling: asset reference scanning, document tree
//! discovery, and asset link rewriting.
//!
//! The reference grammar matched by the scanner is:
//!
//! ```text
//! reference  = image | link
//! image      = "!" link
//! link       = "[" label "]" "(" rel-path ")"
//! rel-path   = ( "./" | "../" )* "assets/" <anything but ")">+
//! ```
//!
//! Only references whose path ends in the literal `assets/` segment prefix
//! are treated as publishable assets; everything else in the document is
//! left alone.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// One asset referenced by a document.
///
/// Identity is the resolved local path: a document referencing the same file
/// twice yields a single `AssetReference`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference {
    /// Resolved absolute path on the local filesystem.
    pub local_path: PathBuf,
    /// The relative path exactly as written in the document (first
    /// occurrence wins).
    pub relative_path: String,
    /// File name component, used for progress labels and remote naming.
    pub file_name: String,
    /// Remote path, assigned later by the publish flow. Empty until then.
    pub remote_path: String,
}

fn asset_reference_pattern() -> Regex {
    // `!` optional so image and plain-link forms share one pass.
    Regex::new(r"!?\[[^\]]*\]\(((?:\.\.?/)*assets/[^)]+)\)").expect("asset pattern is valid")
}

/// Scans a Markdown document for asset references.
///
/// Missing assets are excluded from the result and warned about exactly once
/// per unique resolved path. An unreadable document yields an empty result;
/// this function never panics and never returns an error.
pub fn scan_asset_references(document: &Path) -> Vec<AssetReference> {
    let content = match fs::read_to_string(document) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to read document {}: {}", document.display(), e);
            return Vec::new();
        }
    };

    let document_dir = document.parent().unwrap_or_else(|| Path::new("."));
    scan_asset_references_in_text(&content, document_dir)
}

/// Scans already-loaded document text; `document_dir` anchors relative
/// reference resolution.
pub fn scan_asset_references_in_text(content: &str, document_dir: &Path) -> Vec<AssetReference> {
    let (assets, missing) = collect_references(content, document_dir);

    // One warning per unique missing path, no matter how often it is
    // referenced.
    for path in &missing {
        warn!("Referenced asset does not exist: {}", path.display());
    }

    debug!("Found {} unique asset references", assets.len());
    assets
}

/// Collects unique references and unique missing paths; emits nothing.
fn collect_references(content: &str, document_dir: &Path) -> (Vec<AssetReference>, Vec<PathBuf>) {
    let pattern = asset_reference_pattern();
    let mut assets: Vec<AssetReference> = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut missing: Vec<PathBuf> = Vec::new();
    let mut missing_seen: HashSet<PathBuf> = HashSet::new();

    for capture in pattern.captures_iter(content) {
        let relative_path = &capture[1];
        let local_path = resolve_relative(document_dir, relative_path);

        if seen.contains(&local_path) || missing_seen.contains(&local_path) {
            continue;
        }

        if local_path.is_file() {
            let file_name = local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            seen.insert(local_path.clone());
            assets.push(AssetReference {
                local_path,
                relative_path: relative_path.to_string(),
                file_name,
                remote_path: String::new(),
            });
        } else {
            missing_seen.insert(local_path.clone());
            missing.push(local_path);
        }
    }

    (assets, missing)
}

/// Resolves a document-relative reference without touching the filesystem,
/// folding `.` and `..` segments lexically.
fn resolve_relative(base: &Path, relative: &str) -> PathBuf {
    let mut resolved = base.to_path_buf();
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    resolved
}

/// Recursively collects Markdown files under `directory`.
///
/// Directories literally named `assets` are skipped entirely; everything
/// else is recursed into. Results come back in walk order.
pub fn scan_markdown_files(directory: &Path) -> Vec<PathBuf> {
    if !directory.is_dir() {
        warn!("Not a directory: {}", directory.display());
        return Vec::new();
    }

    let mut documents = Vec::new();
    let walker = WalkDir::new(directory).into_iter().filter_entry(|entry| {
        !(entry.file_type().is_dir() && entry.file_name() == "assets")
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", directory.display(), e);
                continue;
            }
        };
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "md")
        {
            documents.push(entry.into_path());
        }
    }

    info!("Found {} Markdown files under {}", documents.len(), directory.display());
    documents
}

/// Rewrites asset references in `text` using `link_map` (document-relative
/// path → download URL). Returns the new text and the number of
/// substitutions performed.
///
/// Image and plain-link forms are matched by one pattern with an optional
/// leading `!`, so an image reference is counted once, never again as a
/// plain link.
pub fn rewrite_asset_links(text: &str, link_map: &HashMap<String, String>) -> (String, usize) {
    let mut new_text = text.to_string();
    let mut replaced = 0usize;

    for (relative_path, download_url) in link_map {
        let pattern = Regex::new(&format!(
            r"(!?\[[^\]]*\])\({}\)",
            regex::escape(relative_path)
        ))
        .expect("escaped reference pattern is valid");

        replaced += pattern.find_iter(&new_text).count();
        new_text = pattern
            .replace_all(&new_text, format!("$1({})", download_url))
            .into_owned();
    }

    debug!("Rewrote {} asset references", replaced);
    (new_text, replaced)
}
