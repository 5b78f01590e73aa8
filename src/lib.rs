pub mod config;
pub mod markdown;
pub mod progress;
pub mod publish;
pub mod remote_path;
pub mod services;

pub use publish::{BatchPublishResult, PublishOptions, PublishResult};
pub use services::webdav::{DownloadOutcome, UploadItem, WebDAVConfig, WebDAVService};
