use std::fs;

use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docpub::markdown::AssetReference;
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

fn share_created_body(url: &str) -> String {
    format!(
        r#"{{"ocs":{{"meta":{{"status":"ok","statuscode":200}},"data":{{"id":"42","share_type":3,"url":"{}"}}}}}}"#,
        url
    )
}

fn share_list_body(entries: &str) -> String {
    format!(
        r#"{{"ocs":{{"meta":{{"status":"ok","statuscode":200}},"data":[{}]}}}}"#,
        entries
    )
}

#[tokio::test]
async fn creating_a_share_link_returns_the_share_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(SHARES_PATH))
        .and(header("OCS-APIRequest", "true"))
        .and(query_param("format", "json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(share_created_body("https://cloud.example.com/s/NEWTOK"))
                .insert_header("content-type", "application/json"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = create_test_service(&mock_server.uri());
    let url = service.create_share_link("/docs/guide.md").await;
    assert_eq!(url.as_deref(), Some("https://cloud.example.com/s/NEWTOK"));
}

#[tokio::test]
async fn forbidden_creation_falls_back_to_existing_link() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(SHARES_PATH))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(SHARES_PATH))
        .and(query_param("path", "/docs/guide.md"))
        .and(query_param("reshares", "true"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(share_list_body(
                    r#"{"id":"7","share_type":3,"url":"https://cloud.example.com/s/OLDTOK"}"#,
                ))
                .insert_header("content-type", "application/json"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = create_test_service(&mock_server.uri());
    let url = service.create_share_link("/docs/guide.md").await;
    assert_eq!(url.as_deref(), Some("https://cloud.example.com/s/OLDTOK"));
}

#[tokio::test]
async fn get_or_create_prefers_the_existing_link() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SHARES_PATH))
        .and(query_param("path", "/docs/guide.md"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(share_list_body(
                    r#"{"id":"1","share_type":0,"url":null},
                       {"id":"2","share_type":3,"url":"https://cloud.example.com/s/KEPT"}"#,
                ))
                .insert_header("content-type", "application/json"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SHARES_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = create_test_service(&mock_server.uri());
    let url = service.get_or_create_share_link("/docs/guide.md").await;
    assert_eq!(url.as_deref(), Some("https://cloud.example.com/s/KEPT"));
}

#[tokio::test]
async fn repeated_get_or_create_issues_at_most_one_create() {
    let mock_server = MockServer::start().await;

    // First lookup misses; after creation the registry returns the link.
    Mock::given(method("GET"))
        .and(path(SHARES_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(share_list_body(""))
                .insert_header("content-type", "application/json"),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(SHARES_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(share_list_body(
                    r#"{"id":"3","share_type":3,"url":"https://cloud.example.com/s/ONCE"}"#,
                ))
                .insert_header("content-type", "application/json"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SHARES_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(share_created_body("https://cloud.example.com/s/ONCE"))
                .insert_header("content-type", "application/json"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = create_test_service(&mock_server.uri());
    let first = service.get_or_create_share_link("/docs/guide.md").await;
    let second = service.get_or_create_share_link("/docs/guide.md").await;

    assert_eq!(first.as_deref(), Some("https://cloud.example.com/s/ONCE"));
    assert_eq!(second.as_deref(), Some("https://cloud.example.com/s/ONCE"));
}

#[tokio::test]
async fn missing_link_resolves_to_none_without_erroring() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SHARES_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(share_list_body(""))
                .insert_header("content-type", "application/json"),
        )
        .mount(&mock_server)
        .await;

    let service = create_test_service(&mock_server.uri());
    assert!(service.get_existing_share_link("/docs/none.md").await.is_none());
}

#[tokio::test]
async fn assets_get_direct_download_links_keyed_by_relative_path() {
    let mock_server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    let asset_file = tmp.path().join("p.png");
    fs::write(&asset_file, b"png-bytes").unwrap();

    // Upload leg.
    Mock::given(method("PROPFIND"))
        .and(path(dav_path("/docs/assets")))
        .and(header("depth", "0"))
        .respond_with(ResponseTemplate::new(207))
        .mount(&mock_server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path(dav_path("/docs/assets/p.png")))
        .and(header("depth", "0"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path(dav_path("/docs/assets/p.png")))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    // Share leg.
    Mock::given(method("POST"))
        .and(path(SHARES_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(share_created_body("https://cloud.example.com/s/ASSET"))
                .insert_header("content-type", "application/json"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let assets = vec![AssetReference {
        local_path: asset_file,
        relative_path: "assets/p.png".to_string(),
        file_name: "p.png".to_string(),
        remote_path: "/docs/assets/p.png".to_string(),
    }];

    let service = create_test_service(&mock_server.uri());
    let links = service.upload_assets_and_get_links(&assets, None, true).await;

    assert_eq!(
        links.get("assets/p.png").map(String::as_str),
        Some("https://cloud.example.com/s/ASSET/download")
    );
}

#[tokio::test]
async fn connection_test_reports_success_and_server_version() {
    let mock_server = MockServer::start().await;

    Mock::given(method("OPTIONS"))
        .and(path(dav_path("")))
        .respond_with(ResponseTemplate::new(200).insert_header("server", "Nextcloud"))
        .mount(&mock_server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path(dav_path("")))
        .and(header("depth", "0"))
        .respond_with(ResponseTemplate::new(207))
        .mount(&mock_server)
        .await;

    let service = create_test_service(&mock_server.uri());
    let result = service.test_connection().await;

    assert!(result.success, "unexpected failure: {}", result.message);
    assert_eq!(result.server_version.as_deref(), Some("Nextcloud"));
}

#[tokio::test]
async fn connection_test_flags_a_missing_file_space_root() {
    let mock_server = MockServer::start().await;

    Mock::given(method("OPTIONS"))
        .and(path(dav_path("")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path(dav_path("")))
        .and(header("depth", "0"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let service = create_test_service(&mock_server.uri());
    let result = service.test_connection().await;

    assert!(!result.success);
    assert!(result.message.contains("testuser"));
}
