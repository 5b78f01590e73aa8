use crate::remote_path;

/// Connection profile for one WebDAV service instance. Immutable after
/// construction.
#[derive(Debug, Clone)]
pub struct WebDAVConfig {
    pub server_url: String,
    pub username: String,
    pub password: String,
    /// File-space username; the DAV namespace is rooted at
    /// `/remote.php/dav/files/{webdav_username}`.
    pub webdav_username: String,
    /// Allowed root for directory creation. Directories outside of it are
    /// refused locally; the root itself is never created by the engine.
    pub storage_root: Option<String>,
    pub timeout_seconds: u64,
}

/// Retry configuration for transient failures. Client errors (4xx) are
/// never retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl WebDAVConfig {
    pub fn new(server_url: String, username: String, password: String) -> Self {
        let webdav_username = username.clone();
        Self {
            server_url,
            username,
            password,
            webdav_username,
            storage_root: None,
            timeout_seconds: 30,
        }
    }

    pub fn with_webdav_username(mut self, webdav_username: String) -> Self {
        if !webdav_username.is_empty() {
            self.webdav_username = webdav_username;
        }
        self
    }

    pub fn with_storage_root(mut self, storage_root: String) -> Self {
        self.storage_root = Some(remote_path::normalize(&storage_root));
        self
    }

    /// Validates the profile.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_url.is_empty() {
            return Err(anyhow::anyhow!("Server URL cannot be empty"));
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(anyhow::anyhow!("Server URL must start with http:// or https://"));
        }
        if self.username.is_empty() {
            return Err(anyhow::anyhow!("Username cannot be empty"));
        }
        if self.password.is_empty() {
            return Err(anyhow::anyhow!("Password cannot be empty"));
        }
        if self.webdav_username.is_empty() {
            return Err(anyhow::anyhow!("WebDAV file-space username cannot be empty"));
        }
        Ok(())
    }

    /// Server URL without a trailing slash.
    pub fn base_url(&self) -> String {
        self.server_url.trim_end_matches('/').to_string()
    }

    /// Root URL of the per-user DAV file namespace.
    pub fn webdav_url(&self) -> String {
        format!("{}/remote.php/dav/files/{}", self.base_url(), self.webdav_username)
    }

    /// Path prefix the server puts in PROPFIND hrefs for this file space.
    pub fn dav_prefix(&self) -> String {
        format!("/remote.php/dav/files/{}", self.webdav_username)
    }

    /// Full URL for a remote path inside the file space.
    pub fn url_for_path(&self, path: &str) -> String {
        let normalized = remote_path::normalize(path);
        if normalized == "/" {
            self.webdav_url()
        } else {
            format!("{}{}", self.webdav_url(), normalized)
        }
    }

    /// Converts a decoded PROPFIND href back to a file-space path by
    /// stripping the DAV prefix. Hrefs from other namespaces come back
    /// unchanged.
    pub fn relative_from_href(&self, href: &str) -> String {
        let prefix = self.dav_prefix();
        match href.strip_prefix(&prefix) {
            Some("") | Some("/") => "/".to_string(),
            Some(rest) => remote_path::normalize(rest),
            None => remote_path::normalize(href),
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }
}
