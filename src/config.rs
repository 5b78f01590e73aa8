//! Publish configuration.
//!
//! Loaded from a JSON file (`doc-publish.json` by default), with
//! `${env:NAME}` placeholders resolved from the process environment so
//! credentials can stay out of the file. Validation collects every problem
//! at once rather than stopping at the first missing field.

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "doc-publish.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Server URL is not configured")]
    MissingUrl,
    #[error("Username is not configured")]
    MissingUsername,
    #[error("Password is not configured (set it directly or via ${{env:VAR}})")]
    MissingPassword,
    #[error("Base path is not configured")]
    MissingBasePath,
    #[error("Server URL must be a valid http:// or https:// URL")]
    InvalidUrlScheme,
}

/// Connection settings for the remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextcloudSettings {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Root directory under which all published documents live. The engine
    /// refuses to create directories outside of it.
    pub base_path: String,
    /// File-space username when it differs from the login identity.
    /// Defaults to `username`.
    #[serde(default)]
    pub webdav_username: Option<String>,
}

/// Project-level layout settings for derived remote directories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Trailing directory level; empty means no such level.
    #[serde(default)]
    pub service_name: String,
    /// Version level; when set it replaces the local directory name in the
    /// derived path.
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    pub nextcloud: NextcloudSettings,
    #[serde(default)]
    pub project: ProjectSettings,
}

impl PublishConfig {
    /// Loads and resolves configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: PublishConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config.resolve_env_vars())
    }

    /// Replaces `${env:NAME}` placeholders in every string field with the
    /// value of the corresponding environment variable, or the empty string
    /// when unset. An unset credential then fails validation.
    fn resolve_env_vars(mut self) -> Self {
        self.nextcloud.url = resolve_env(&self.nextcloud.url);
        self.nextcloud.username = resolve_env(&self.nextcloud.username);
        self.nextcloud.password = resolve_env(&self.nextcloud.password);
        self.nextcloud.base_path = resolve_env(&self.nextcloud.base_path);
        self.nextcloud.webdav_username = self.nextcloud.webdav_username.map(|v| resolve_env(&v));
        self.project.service_name = resolve_env(&self.project.service_name);
        self.project.version = self.project.version.map(|v| resolve_env(&v));
        self
    }

    /// Validates the configuration, returning every problem found.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.nextcloud.url.is_empty() {
            errors.push(ConfigError::MissingUrl);
        } else {
            match Url::parse(&self.nextcloud.url) {
                Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
                _ => errors.push(ConfigError::InvalidUrlScheme),
            }
        }
        if self.nextcloud.username.is_empty() {
            errors.push(ConfigError::MissingUsername);
        }
        if self.nextcloud.password.is_empty() {
            errors.push(ConfigError::MissingPassword);
        }
        if self.nextcloud.base_path.is_empty() {
            errors.push(ConfigError::MissingBasePath);
        }
        errors
    }

    /// The file-space username, falling back to the login identity.
    pub fn webdav_username(&self) -> &str {
        match &self.nextcloud.webdav_username {
            Some(name) if !name.is_empty() => name,
            _ => &self.nextcloud.username,
        }
    }

    /// Derives the full remote directory for a published document set:
    /// `base_path/{version|dir_name}[/service_name]`. A configured version
    /// replaces the local directory name; an empty service name collapses
    /// that level.
    pub fn full_doc_path(&self, dir_name: &str) -> String {
        let middle = match &self.project.version {
            Some(version) if !version.trim().is_empty() => version.as_str(),
            _ => dir_name,
        };

        let service = self.project.service_name.trim();
        if service.is_empty() {
            format!("{}/{}", self.nextcloud.base_path, middle)
        } else {
            format!("{}/{}/{}", self.nextcloud.base_path, middle, service)
        }
    }
}

fn resolve_env(value: &str) -> String {
    let pattern = Regex::new(r"\$\{env:([^}]+)\}").expect("env placeholder pattern is valid");
    pattern
        .replace_all(value, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn settings() -> NextcloudSettings {
        NextcloudSettings {
            url: "https://cloud.example.com".to_string(),
            username: "alice".to_string(),
            password: "app-password".to_string(),
            base_path: "/docs".to_string(),
            webdav_username: None,
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        let config = PublishConfig {
            nextcloud: settings(),
            project: ProjectSettings::default(),
        };
        assert!(config.validate().is_empty());
    }

    #[test]
    fn validation_collects_all_errors() {
        let config = PublishConfig {
            nextcloud: NextcloudSettings {
                url: String::new(),
                username: String::new(),
                password: String::new(),
                base_path: String::new(),
                webdav_username: None,
            },
            project: ProjectSettings::default(),
        };
        assert_eq!(config.validate().len(), 4);
    }

    #[test]
    fn rejects_non_http_url() {
        let mut config = PublishConfig {
            nextcloud: settings(),
            project: ProjectSettings::default(),
        };
        config.nextcloud.url = "ftp://cloud.example.com".to_string();
        assert!(matches!(
            config.validate().as_slice(),
            [ConfigError::InvalidUrlScheme]
        ));
    }

    #[test]
    fn webdav_username_falls_back_to_login() {
        let mut config = PublishConfig {
            nextcloud: settings(),
            project: ProjectSettings::default(),
        };
        assert_eq!(config.webdav_username(), "alice");
        config.nextcloud.webdav_username = Some("files-alice".to_string());
        assert_eq!(config.webdav_username(), "files-alice");
        config.nextcloud.webdav_username = Some(String::new());
        assert_eq!(config.webdav_username(), "alice");
    }

    #[test]
    fn full_doc_path_composition() {
        let mut config = PublishConfig {
            nextcloud: settings(),
            project: ProjectSettings {
                service_name: "billing".to_string(),
                version: None,
            },
        };
        assert_eq!(config.full_doc_path("guide"), "/docs/guide/billing");

        config.project.version = Some("v2".to_string());
        assert_eq!(config.full_doc_path("guide"), "/docs/v2/billing");

        config.project.service_name = String::new();
        assert_eq!(config.full_doc_path("guide"), "/docs/v2");
    }

    #[test]
    fn env_placeholders_are_resolved_on_load() {
        env::set_var("DOCPUB_TEST_PASSWORD", "secret-from-env");
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc-publish.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "nextcloud": {{
                    "url": "https://cloud.example.com",
                    "username": "alice",
                    "password": "${{env:DOCPUB_TEST_PASSWORD}}",
                    "base_path": "/docs"
                }}
            }}"#
        )
        .unwrap();

        let config = PublishConfig::from_file(&path).unwrap();
        assert_eq!(config.nextcloud.password, "secret-from-env");
        assert!(config.validate().is_empty());
    }
}
