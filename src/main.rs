use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use docpub::config::{PublishConfig, DEFAULT_CONFIG_FILE};
use docpub::publish::{self, PublishOptions};
use docpub::remote_path;
use docpub::{WebDAVConfig, WebDAVService};

#[derive(Parser)]
#[command(name = "docpub", about = "Publish Markdown documentation to a Nextcloud WebDAV store")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the server connection and credentials.
    TestConnection,
    /// Publish one Markdown document and its referenced assets.
    Publish {
        /// The Markdown document to publish.
        document: PathBuf,
        /// Remote directory; derived from the configured layout when omitted.
        #[arg(long)]
        remote_dir: Option<String>,
        /// Skip remote files that already exist instead of overwriting them.
        #[arg(long)]
        no_overwrite: bool,
        /// Rewrite asset references in the local document to download links.
        #[arg(long)]
        rewrite_links: bool,
    },
    /// Publish every Markdown document under a directory.
    PublishDir {
        /// The local directory to publish.
        directory: PathBuf,
        #[arg(long)]
        remote_dir: Option<String>,
        #[arg(long)]
        no_overwrite: bool,
        #[arg(long)]
        rewrite_links: bool,
    },
    /// Download a remote directory tree to a local directory.
    Download {
        /// Remote directory to download.
        remote_dir: String,
        /// Local destination directory.
        local_dir: PathBuf,
        /// Keep local files that already exist.
        #[arg(long)]
        no_overwrite: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let config = match PublishConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return 1;
        }
    };

    let errors = config.validate();
    if !errors.is_empty() {
        for problem in &errors {
            error!("Configuration error: {}", problem);
        }
        return 1;
    }

    let webdav_config = WebDAVConfig::new(
        config.nextcloud.url.clone(),
        config.nextcloud.username.clone(),
        config.nextcloud.password.clone(),
    )
    .with_webdav_username(config.webdav_username().to_string())
    .with_storage_root(config.nextcloud.base_path.clone());

    let service = match WebDAVService::new(webdav_config) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to initialize WebDAV service: {:#}", e);
            return 1;
        }
    };

    match cli.command {
        Command::TestConnection => {
            let result = service.test_connection().await;
            if let Some(version) = &result.server_version {
                info!("Server: {}", version);
            }
            if result.success {
                info!("{}", result.message);
                0
            } else {
                error!("{}", result.message);
                1
            }
        }

        Command::Publish {
            document,
            remote_dir,
            no_overwrite,
            rewrite_links,
        } => {
            let remote_dir = remote_dir.unwrap_or_else(|| {
                let dir_name = document
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                config.full_doc_path(&dir_name)
            });

            let options = PublishOptions {
                overwrite: !no_overwrite,
                rewrite_links,
            };
            let mut progress = |current: usize, total: usize, label: &str| {
                info!("[{}/{}] {}", current, total, label);
            };

            let result = publish::publish_document(
                &service,
                &document,
                &remote_dir,
                &options,
                Some(&mut progress),
            )
            .await;

            for failed in &result.errors {
                error!("Asset not published: {}", failed);
            }
            if result.success {
                info!(
                    "Published {} ({} assets, {} links rewritten)",
                    document.display(),
                    result.assets_uploaded,
                    result.links_replaced
                );
                if let Some(url) = &result.doc_url {
                    info!("Share link: {}", url);
                }
                0
            } else {
                error!("Publish failed: {}", result.message);
                1
            }
        }

        Command::PublishDir {
            directory,
            remote_dir,
            no_overwrite,
            rewrite_links,
        } => {
            let remote_dir = remote_dir.unwrap_or_else(|| {
                let dir_name = directory
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                config.full_doc_path(&dir_name)
            });

            let options = PublishOptions {
                overwrite: !no_overwrite,
                rewrite_links,
            };
            let mut progress = |current: usize, total: usize, label: &str| {
                info!("[{}/{}] {}", current, total, label);
            };

            let result = publish::publish_directory(
                &service,
                &directory,
                &remote_dir,
                &options,
                Some(&mut progress),
            )
            .await;

            info!(
                "Documents: {}/{}, assets: {}",
                result.success_docs, result.total_docs, result.total_assets
            );
            if let Some(url) = &result.folder_url {
                info!("Folder share link: {}", url);
            }
            if result.total_docs > 0 && result.failed_docs == 0 {
                0
            } else {
                for doc in result.results.iter().filter(|r| !r.success) {
                    error!("{}", doc.message);
                }
                1
            }
        }

        Command::Download {
            remote_dir,
            local_dir,
            no_overwrite,
        } => {
            let normalized = remote_path::normalize(&remote_dir);
            let mut progress = |current: usize, total: usize, label: &str| {
                info!("[{}/{}] {}", current, total, label);
            };

            let outcome = service
                .download_directory(&normalized, &local_dir, !no_overwrite, Some(&mut progress))
                .await;

            info!(
                "Downloaded {} of {} files ({} skipped)",
                outcome.downloaded, outcome.total, outcome.skipped
            );
            if outcome.success {
                0
            } else {
                for failed in &outcome.errors {
                    error!("Failed: {}", failed);
                }
                1
            }
        }
    }
}
