//! End-to-end runs of the status/message entry point.

mod support;

use cdse_fetch::CallControl;
use cdse_fetch::handler::{
    MSG_DOWNLOAD_FAILED, MSG_NO_MATCHES, MSG_SEARCH_FAILED, MSG_SUCCESS, get_images_into,
    get_images_with,
};
use serde_json::json;
use support::{PRODUCTS_PATH, client_for, config_for, mount_archive, mount_token, product, value_path};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POLYGON: &str = "POLYGON((-74.1 4.6, -74.0 4.6, -74.0 4.7, -74.1 4.7, -74.1 4.6))";

async fn mount_search(server: &MockServer, products: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path(PRODUCTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": products })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_only_surface_reflectance_products_are_downloaded() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_search(
        &server,
        vec![
            product("p1", "S2A_MSIL1C_20240302T152641_N0510_R025_T18NWL_20240302T184300.SAFE"),
            product("p2", "S2A_MSIL2A_20240302T152641_N0510_R025_T18NWL_20240302T201500.SAFE"),
        ],
    )
    .await;
    mount_archive(&server, "p2", b"l2a archive").await;
    Mock::given(method("GET"))
        .and(path(value_path("p1")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("images");
    let out_clone = out.clone();
    let config = config_for(&server);
    let (status, message) = tokio::task::spawn_blocking(move || {
        get_images_into(&client_for(config), POLYGON, "2024-03-01", "2024-03-06", &out_clone)
    })
    .await
    .unwrap();

    assert_eq!(status, 200);
    assert_eq!(message["message"], MSG_SUCCESS);
    assert_eq!(message["downloaded"], 1);
    let archive = out.join("S2A_MSIL2A_20240302T152641_N0510_R025_T18NWL_20240302T201500.zip");
    assert_eq!(std::fs::read(archive).unwrap(), b"l2a archive");
    assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);
    server.verify().await;
}

#[tokio::test]
async fn test_search_failure_writes_nothing() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    Mock::given(method("GET"))
        .and(path(PRODUCTS_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("images");
    let out_clone = out.clone();
    let config = config_for(&server);
    let (status, message) = tokio::task::spawn_blocking(move || {
        get_images_into(&client_for(config), POLYGON, "2024-03-01", "2024-03-06", &out_clone)
    })
    .await
    .unwrap();

    assert_eq!(status, 500);
    assert_eq!(message, json!({ "message": MSG_SEARCH_FAILED }));
    assert!(!out.exists());
    server.verify().await;
}

#[tokio::test]
async fn test_invalid_dates_are_a_search_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PRODUCTS_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("images");
    let config = config_for(&server);
    let (status, message) = tokio::task::spawn_blocking(move || {
        get_images_into(&client_for(config), POLYGON, "2024-13-01", "2024-03-06", &out)
    })
    .await
    .unwrap();

    assert_eq!(status, 500);
    assert_eq!(message["message"], MSG_SEARCH_FAILED);
    server.verify().await;
}

#[tokio::test]
async fn test_no_matches_is_reported_distinctly() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    mount_search(
        &server,
        vec![product("p1", "S2B_MSIL1C_20240303T152639_N0510_R025_T18NWL_20240303T171000.SAFE")],
    )
    .await;

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("images");
    let config = config_for(&server);
    let (status, message) = tokio::task::spawn_blocking(move || {
        get_images_into(&client_for(config), POLYGON, "2024-03-01", "2024-03-06", &out)
    })
    .await
    .unwrap();

    assert_eq!(status, 200);
    assert_eq!(message["message"], MSG_NO_MATCHES);
    assert_eq!(message["downloaded"], 0);
    server.verify().await;
}

#[tokio::test]
async fn test_partial_failure_reports_counts() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_search(
        &server,
        vec![
            product("ok", "S2A_MSIL2A_OK.SAFE"),
            product("gone", "S2A_MSIL2A_GONE.SAFE"),
        ],
    )
    .await;
    mount_archive(&server, "ok", b"fine").await;
    Mock::given(method("GET"))
        .and(path(value_path("gone")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("images");
    let out_clone = out.clone();
    let config = config_for(&server);
    let (status, message) = tokio::task::spawn_blocking(move || {
        get_images_into(&client_for(config), POLYGON, "2024-03-01", "2024-03-06", &out_clone)
    })
    .await
    .unwrap();

    assert_eq!(status, 500);
    assert_eq!(message["message"], MSG_DOWNLOAD_FAILED);
    assert_eq!(message["downloaded"], 1);
    assert_eq!(message["failed"], 1);
    let errors = message["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().starts_with("Error download S2A_MSIL2A_GONE"));
    assert!(out.join("S2A_MSIL2A_OK.zip").exists());
    assert!(!out.join("S2A_MSIL2A_GONE.zip").exists());
}

#[tokio::test]
async fn test_parallel_workers_download_every_entry() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    let names: Vec<String> = (0..5).map(|i| format!("S2A_MSIL2A_TILE{i}.SAFE")).collect();
    mount_search(
        &server,
        names
            .iter()
            .enumerate()
            .map(|(i, name)| product(&format!("id{i}"), name))
            .collect(),
    )
    .await;
    for i in 0..5 {
        mount_archive(&server, &format!("id{i}"), format!("tile {i}").as_bytes()).await;
    }

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("images");
    let out_clone = out.clone();
    let config = config_for(&server);
    let (status, message) = tokio::task::spawn_blocking(move || {
        get_images_with(
            &client_for(config),
            POLYGON,
            "2024-03-01",
            "2024-03-06",
            &out_clone,
            3,
            &CallControl::new(),
        )
    })
    .await
    .unwrap();

    assert_eq!(status, 200);
    assert_eq!(message["downloaded"], 5);
    for i in 0..5 {
        let body = std::fs::read(out.join(format!("S2A_MSIL2A_TILE{i}.zip"))).unwrap();
        assert_eq!(body, format!("tile {i}").into_bytes());
    }
    server.verify().await;
}

#[tokio::test]
async fn test_catalog_names_cannot_write_outside_output_dir() {
    let server = MockServer::start().await;
    let outside = TempDir::new().unwrap();
    let escaping = format!("{}/S2A_MSIL2A_ESCAPE.SAFE", outside.path().display());
    mount_token(&server, 0).await;
    mount_search(&server, vec![product("evil", &escaping)]).await;
    mount_archive(&server, "evil", b"should not land").await;

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("images");
    let out_clone = out.clone();
    let config = config_for(&server);
    let (status, message) = tokio::task::spawn_blocking(move || {
        get_images_into(&client_for(config), POLYGON, "2024-03-01", "2024-03-06", &out_clone)
    })
    .await
    .unwrap();

    assert_eq!(status, 500);
    assert_eq!(message["message"], MSG_DOWNLOAD_FAILED);
    assert_eq!(message["failed"], 1);
    assert!(!outside.path().join("S2A_MSIL2A_ESCAPE.zip").exists());
    assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    server.verify().await;
}
