//! Canonical remote path handling.
//!
//! Every path sent to the WebDAV layer goes through `normalize` first:
//! forward slashes only, a single leading `/`, no trailing slash. The root
//! directory is the one exception and is always rendered as `/`.

use std::path::Path;

/// Normalizes arbitrary user or local input into a canonical remote path.
///
/// Total and idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim().replace('\\', "/");
    if trimmed.is_empty() || trimmed == "/" {
        return "/".to_string();
    }

    let without_trailing = trimmed.trim_end_matches('/');
    if without_trailing.is_empty() {
        return "/".to_string();
    }

    if without_trailing.starts_with('/') {
        without_trailing.to_string()
    } else {
        format!("/{}", without_trailing)
    }
}

/// Suggests a remote directory for a local directory inside the workspace.
///
/// Returns `None` when `local_dir` lies outside `workspace_root` (escapes
/// via `..` or sits on another tree entirely). Callers must treat `None` as
/// "no suggestion", not as an error.
pub fn suggest_remote_from_local(workspace_root: &Path, local_dir: &Path) -> Option<String> {
    let relative = local_dir.strip_prefix(workspace_root).ok()?;

    let segments: Vec<&str> = relative
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    if segments.is_empty() {
        return None;
    }

    Some(format!("/{}", segments.join("/")))
}

/// Joins a remote directory and a file name.
pub fn join(dir: &str, name: &str) -> String {
    let dir = normalize(dir);
    let name = name.replace('\\', "/");
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Resolves a document-relative reference against a remote directory,
/// folding `.` and `..` segments lexically. `..` never climbs above `/`.
pub fn resolve(dir: &str, relative: &str) -> String {
    let dir = normalize(dir);
    let mut segments: Vec<&str> = dir.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();

    let relative = relative.replace('\\', "/");
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Parent of a normalized remote path. The parent of a top-level entry (and
/// of the root itself) is `/`.
pub fn parent(path: &str) -> String {
    let path = normalize(path);
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// True when `path` equals `root` or sits underneath it. Both sides are
/// expected to be normalized already.
pub fn is_within(path: &str, root: &str) -> bool {
    if root == "/" {
        return true;
    }
    path == root || path.starts_with(&format!("{}/", root))
}
