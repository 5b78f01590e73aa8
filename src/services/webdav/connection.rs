use anyhow::{anyhow, Result};
use reqwest::{Client, Method, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::config::{RetryConfig, WebDAVConfig};

pub(crate) const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
    <D:propfind xmlns:D="DAV:">
        <D:prop>
            <D:displayname/>
            <D:getcontentlength/>
            <D:getlastmodified/>
            <D:getetag/>
            <D:resourcetype/>
        </D:prop>
    </D:propfind>"#;

/// Result of a connection probe.
#[derive(Debug, Clone)]
pub struct ConnectionResult {
    pub success: bool,
    pub message: String,
    pub server_version: Option<String>,
}

/// Low-level authenticated HTTP access to the WebDAV namespace.
#[derive(Clone)]
pub struct WebDAVConnection {
    client: Client,
    config: WebDAVConfig,
    retry_config: RetryConfig,
}

impl WebDAVConnection {
    pub fn new(config: WebDAVConfig, retry_config: RetryConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            config,
            retry_config,
        })
    }

    pub fn config(&self) -> &WebDAVConfig {
        &self.config
    }

    /// Sends an authenticated request, retrying transport errors and server
    /// errors (5xx) with bounded exponential backoff. Client errors come
    /// back as responses so callers can branch on the status; they are
    /// never retried.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        let mut attempt = 0;
        let mut delay = self.retry_config.initial_delay_ms;

        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .basic_auth(&self.config.username, Some(&self.config.password));

            if let Some(ref bytes) = body {
                request = request.body(bytes.clone());
            }
            for (key, value) in headers {
                request = request.header(*key, *value);
            }

            let outcome = request.send().await;
            let retryable = match &outcome {
                Ok(response) => response.status().is_server_error(),
                Err(_) => true,
            };

            if retryable && attempt < self.retry_config.max_retries {
                match &outcome {
                    Ok(response) => warn!(
                        "Server error {} for {} {}, retrying in {}ms (attempt {}/{})",
                        response.status(),
                        method,
                        url,
                        delay,
                        attempt + 1,
                        self.retry_config.max_retries
                    ),
                    Err(e) => warn!(
                        "Request error for {} {}: {}, retrying in {}ms (attempt {}/{})",
                        method,
                        url,
                        e,
                        delay,
                        attempt + 1,
                        self.retry_config.max_retries
                    ),
                }
                sleep(Duration::from_millis(delay)).await;
                delay = std::cmp::min(
                    (delay as f64 * self.retry_config.backoff_multiplier) as u64,
                    self.retry_config.max_delay_ms,
                );
                attempt += 1;
                continue;
            }

            return outcome.map_err(|e| {
                anyhow!("Request {} {} failed after {} attempts: {}", method, url, attempt + 1, e)
            });
        }
    }

    /// PROPFIND at the given depth (`"0"`, `"1"`).
    pub async fn propfind(&self, path: &str, depth: &str) -> Result<Response> {
        let url = self.config.url_for_path(path);
        self.request(
            Method::from_bytes(b"PROPFIND")?,
            &url,
            Some(PROPFIND_BODY.as_bytes().to_vec()),
            &[("Depth", depth), ("Content-Type", "application/xml")],
        )
        .await
    }

    /// Checks whether a remote path exists. A 404 is a clean `false`; any
    /// other failure status is an error.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let response = self.propfind(path, "0").await?;
        let status = response.status();

        if status == StatusCode::MULTI_STATUS || status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Err(anyhow!(
            "Existence check for '{}' failed: HTTP {}",
            path,
            status
        ))
    }

    /// Issues MKCOL for a directory, returning the response status.
    pub async fn mkcol(&self, path: &str) -> Result<StatusCode> {
        let url = self.config.url_for_path(path);
        let response = self
            .request(Method::from_bytes(b"MKCOL")?, &url, None, &[])
            .await?;
        Ok(response.status())
    }

    /// Probes the connection: OPTIONS against the file-space root, then a
    /// Depth-0 PROPFIND of `/`. Failures carry guidance for the common
    /// misconfigurations (login password instead of an app password, wrong
    /// URL, wrong file-space username).
    pub async fn test_connection(&self) -> ConnectionResult {
        info!("Testing WebDAV connection to {}", self.config.webdav_url());

        let options = self
            .request(Method::OPTIONS, &self.config.webdav_url(), None, &[])
            .await;

        let server_version = match &options {
            Ok(response) => response
                .headers()
                .get("server")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string()),
            Err(_) => None,
        };

        match options {
            Ok(response) if !response.status().is_success() && response.status() != StatusCode::UNAUTHORIZED => {
                debug!("OPTIONS returned HTTP {}", response.status());
            }
            Err(e) => {
                error!("WebDAV connection failed: {}", e);
                return ConnectionResult {
                    success: false,
                    message: format!(
                        "Connection failed: {}. Check the server URL and that the host is reachable.",
                        e
                    ),
                    server_version,
                };
            }
            _ => {}
        }

        match self.exists("/").await {
            Ok(true) => {
                info!("WebDAV connection successful");
                ConnectionResult {
                    success: true,
                    message: "Connection successful".to_string(),
                    server_version,
                }
            }
            Ok(false) => ConnectionResult {
                success: false,
                message: format!(
                    "File space root not found for user '{}'. Check the WebDAV file-space username.",
                    self.config.webdav_username
                ),
                server_version,
            },
            Err(e) => {
                error!("WebDAV root probe failed: {}", e);
                ConnectionResult {
                    success: false,
                    message: format!(
                        "Root directory inaccessible: {}. Common causes: a login password was used \
                         instead of an app password, or the credentials are wrong.",
                        e
                    ),
                    server_version,
                }
            }
        }
    }
}
