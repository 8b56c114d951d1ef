//! Shared fixtures for tests that talk to a mock catalog.

#![allow(dead_code)]

use cdse_fetch::{Client, ClientConfig};
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "test-token";
pub const PRODUCTS_PATH: &str = "/odata/v1/Products";

pub fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig {
        user: "user@example.com".to_string(),
        password: "secret".to_string(),
        auth_url: format!("{}/token", server.uri()),
        data_url: format!("{}{}", server.uri(), PRODUCTS_PATH),
        verify: false,
    }
}

/// Builds a client for `server`. Must be called off the async runtime.
pub fn client_for(config: ClientConfig) -> Client {
    Client::from_config(config).expect("failed to build client")
}

/// Token endpoint accepting the password grant of [`config_for`], expected `times` times.
pub async fn mount_token(server: &MockServer, times: u64) {
    mount_token_expiring(server, 600, times).await;
}

/// As [`mount_token`], with tokens valid for `expires_in` seconds.
pub async fn mount_token_expiring(server: &MockServer, expires_in: u64, times: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("client_id=cdse-public"))
        .and(body_string_contains("username=user%40example.com"))
        .and(body_string_contains("password=secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": TOKEN, "expires_in": expires_in })),
        )
        .expect(times)
        .mount(server)
        .await;
}

pub fn product(id: &str, name: &str) -> Value {
    json!({
        "Id": id,
        "Name": name,
        "GeoFootprint": {
            "type": "Polygon",
            "coordinates": [[[-74.1, 4.6], [-74.0, 4.6], [-74.0, 4.7], [-74.1, 4.6]]]
        }
    })
}

pub fn value_path(id: &str) -> String {
    format!("{PRODUCTS_PATH}({id})/$value")
}

/// Archive endpoint for `id` answering 200 with `body`.
pub async fn mount_archive(server: &MockServer, id: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(value_path(id)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}
