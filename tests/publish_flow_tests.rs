use std::fs;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docpub::publish::{self, PublishOptions};
use docpub::{WebDAVConfig, WebDAVService};

const SHARES_PATH: &str = "/ocs/v2.php/apps/files_sharing/api/v1/shares";

fn create_test_service(server_url: &str) -> WebDAVService {
    let config = WebDAVConfig::new(
        server_url.to_string(),
        "testuser".to_string(),
        "testpass".to_string(),
    );
    WebDAVService::new(config).expect("Failed to create test service")
}

fn dav_path(rest: &str) -> String {
    format!("/remote.php/dav/files/testuser{}", rest)
}

async fn mock_exists(server: &MockServer, remote: &str, exists: bool) {
    let status = if exists { 207 } else { 404 };
    Mock::given(method("PROPFIND"))
        .and(path(dav_path(remote)))
        .and(header("depth", "0"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn mock_put(server: &MockServer, remote: &str) {
    Mock::given(method("PUT"))
        .and(path(dav_path(remote)))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(server)
        .await;
}

async fn mock_share_created(server: &MockServer, for_path: &str, url: &str) {
    let body = format!(
        r#"{{"ocs":{{"meta":{{"status":"ok","statuscode":200}},"data":{{"id":"1","share_type":3,"url":"{}"}}}}}}"#,
        url
    );
    Mock::given(method("POST"))
        .and(path(SHARES_PATH))
        .and(body_partial_json(json!({ "path": for_path })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "application/json"),
        )
        .expect(1)
        .mount(server)
        .await;
}

fn write_document(tmp: &TempDir) -> std::path::PathBuf {
    fs::create_dir_all(tmp.path().join("assets")).unwrap();
    fs::write(tmp.path().join("assets/p.png"), b"png-bytes").unwrap();
    let doc = tmp.path().join("guide.md");
    fs::write(&doc, "# Guide\n\n![diagram](assets/p.png)\n").unwrap();
    doc
}

#[tokio::test]
async fn publishes_a_document_with_its_assets() {
    let mock_server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    let doc = write_document(&tmp);

    mock_exists(&mock_server, "/docs/v1", true).await;
    mock_exists(&mock_server, "/docs/v1/assets", true).await;
    mock_exists(&mock_server, "/docs/v1/assets/p.png", false).await;
    mock_exists(&mock_server, "/docs/v1/guide.md", false).await;
    mock_put(&mock_server, "/docs/v1/assets/p.png").await;
    mock_put(&mock_server, "/docs/v1/guide.md").await;

    mock_share_created(
        &mock_server,
        "/docs/v1/assets/p.png",
        "https://cloud.example.com/s/ASSET",
    )
    .await;
    mock_share_created(
        &mock_server,
        "/docs/v1/guide.md",
        "https://cloud.example.com/s/DOC",
    )
    .await;

    let service = create_test_service(&mock_server.uri());
    let options = PublishOptions::default();
    let result = publish::publish_document(&service, &doc, "/docs/v1", &options, None).await;

    assert!(result.success, "unexpected failure: {}", result.message);
    assert_eq!(result.assets_uploaded, 1);
    assert_eq!(result.doc_url.as_deref(), Some("https://cloud.example.com/s/DOC"));
    assert!(result.errors.is_empty());
    assert_eq!(result.links_replaced, 0);

    // Default options leave the local document untouched.
    let content = fs::read_to_string(&doc).unwrap();
    assert!(content.contains("assets/p.png"));
}

#[tokio::test]
async fn rewrites_local_links_when_asked() {
    let mock_server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    let doc = write_document(&tmp);

    mock_exists(&mock_server, "/docs/v1", true).await;
    mock_exists(&mock_server, "/docs/v1/assets", true).await;
    mock_exists(&mock_server, "/docs/v1/assets/p.png", false).await;
    mock_exists(&mock_server, "/docs/v1/guide.md", false).await;
    mock_put(&mock_server, "/docs/v1/assets/p.png").await;
    mock_put(&mock_server, "/docs/v1/guide.md").await;

    mock_share_created(
        &mock_server,
        "/docs/v1/assets/p.png",
        "https://cloud.example.com/s/ASSET",
    )
    .await;
    mock_share_created(
        &mock_server,
        "/docs/v1/guide.md",
        "https://cloud.example.com/s/DOC",
    )
    .await;

    let service = create_test_service(&mock_server.uri());
    let options = PublishOptions {
        overwrite: true,
        rewrite_links: true,
    };
    let result = publish::publish_document(&service, &doc, "/docs/v1", &options, None).await;

    assert!(result.success);
    assert_eq!(result.links_replaced, 1);

    let content = fs::read_to_string(&doc).unwrap();
    assert!(content.contains("![diagram](https://cloud.example.com/s/ASSET/download)"));
    assert!(!content.contains("assets/p.png"));
}

#[tokio::test]
async fn non_markdown_input_is_rejected_before_any_network_call() {
    let mock_server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    let not_md = tmp.path().join("notes.txt");
    fs::write(&not_md, "plain text").unwrap();

    let service = create_test_service(&mock_server.uri());
    let options = PublishOptions::default();
    let result = publish::publish_document(&service, &not_md, "/docs", &options, None).await;

    assert!(!result.success);
    let requests = mock_server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn missing_assets_are_reported_but_do_not_block_the_document() {
    let mock_server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    let doc = tmp.path().join("lonely.md");
    // Referenced asset does not exist on disk.
    fs::write(&doc, "![gone](assets/gone.png)\n").unwrap();

    mock_exists(&mock_server, "/docs", true).await;
    mock_exists(&mock_server, "/docs/lonely.md", false).await;
    mock_put(&mock_server, "/docs/lonely.md").await;
    mock_share_created(&mock_server, "/docs/lonely.md", "https://cloud.example.com/s/LONE").await;

    let service = create_test_service(&mock_server.uri());
    let options = PublishOptions::default();
    let result = publish::publish_document(&service, &doc, "/docs", &options, None).await;

    assert!(result.success);
    assert_eq!(result.assets_uploaded, 0);
    assert_eq!(result.doc_url.as_deref(), Some("https://cloud.example.com/s/LONE"));
}
