//! Status/message entry point over the whole acquisition pipeline.

use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::error;

use crate::client::Client;
use crate::control::CallControl;
use crate::error::SearchError;
use crate::orchestrator::Orchestrator;
use crate::query::GeoQuery;

pub const STATUS_OK: u16 = 200;
pub const STATUS_ERROR: u16 = 500;

pub const MSG_SUCCESS: &str = "Images downloaded successfully.";
pub const MSG_NO_MATCHES: &str = "No images found for the given area and dates.";
pub const MSG_SEARCH_FAILED: &str = "Error in search";
pub const MSG_DOWNLOAD_FAILED: &str = "Error downloading images";
pub const MSG_CONFIG_FAILED: &str = "Error in configuration";

/// Default archive folder, relative to the working directory.
pub fn default_output_dir() -> PathBuf {
    Path::new("downloads").join("images")
}

/// [`get_images_into`] with a client built by [`Client::from_env`] and
/// archives written to [`default_output_dir`].
///
/// Missing or unreadable configuration yields `(500, {"message": MSG_CONFIG_FAILED})`.
pub fn get_images(polygon: &str, initial_date: &str, end_date: &str) -> (u16, Value) {
    let client = match Client::from_env() {
        Ok(client) => client,
        Err(e) => {
            error!(error = %format!("{e:#}"), "client configuration failed");
            return (STATUS_ERROR, json!({ "message": MSG_CONFIG_FAILED }));
        }
    };
    get_images_into(
        &client,
        polygon,
        initial_date,
        end_date,
        &default_output_dir(),
    )
}

/// Searches for `polygon` between `initial_date` and `end_date` and downloads
/// every surface-reflectance product found into `output_dir`.
///
/// Returns `(200, …)` when every matched product was downloaded (including
/// when nothing matched) and `(500, …)` when the search failed or any
/// download failed. Nothing is written when the search fails.
pub fn get_images_into(
    client: &Client,
    polygon: &str,
    initial_date: &str,
    end_date: &str,
    output_dir: &Path,
) -> (u16, Value) {
    get_images_with(
        client,
        polygon,
        initial_date,
        end_date,
        output_dir,
        1,
        &CallControl::new(),
    )
}

/// [`get_images_into`] with an explicit worker count and deadline/cancellation.
pub fn get_images_with(
    client: &Client,
    polygon: &str,
    initial_date: &str,
    end_date: &str,
    output_dir: &Path,
    workers: usize,
    control: &CallControl,
) -> (u16, Value) {
    let entries = match GeoQuery::parse(polygon, initial_date, end_date)
        .map_err(SearchError::from)
        .and_then(|query| client.find_entries(&query, control))
    {
        Ok(entries) => entries,
        Err(e) => {
            error!(error = %e, "catalog search failed");
            return (STATUS_ERROR, json!({ "message": MSG_SEARCH_FAILED }));
        }
    };

    let report = match Orchestrator::new(client, output_dir)
        .with_workers(workers)
        .run(&entries, control)
    {
        Ok(report) => report,
        Err(e) => {
            error!(error = %format!("{e:#}"), "download batch could not start");
            return (
                STATUS_ERROR,
                json!({ "message": MSG_DOWNLOAD_FAILED, "errors": [format!("{e:#}")] }),
            );
        }
    };

    if report.total() == 0 {
        return (
            STATUS_OK,
            json!({ "message": MSG_NO_MATCHES, "downloaded": 0, "failed": 0 }),
        );
    }

    if report.is_complete_success() {
        return (
            STATUS_OK,
            json!({
                "message": MSG_SUCCESS,
                "downloaded": report.succeeded(),
                "failed": 0,
            }),
        );
    }

    let errors: Vec<String> = report.failures().map(|e| e.to_string()).collect();
    (
        STATUS_ERROR,
        json!({
            "message": MSG_DOWNLOAD_FAILED,
            "downloaded": report.succeeded(),
            "failed": report.failed(),
            "errors": errors,
        }),
    )
}
