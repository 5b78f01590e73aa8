pub mod config;
pub mod connection;
pub mod directories;
pub mod propfind;
pub mod service;
pub mod shares;
pub mod transfer;

pub use config::{RetryConfig, WebDAVConfig};
pub use connection::ConnectionResult;
pub use propfind::RemoteEntry;
pub use service::WebDAVService;
pub use transfer::{DownloadOutcome, UploadItem};
