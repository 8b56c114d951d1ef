//! A small Rust client for the Copernicus Data Space Ecosystem (CDSE) catalog.
//!
//! This crate implements a search-and-fetch flow for Sentinel-2 scenes:
//! query the OData catalog for products intersecting a polygon within a date
//! window, keep the surface-reflectance (L2A) products, then download each
//! archive with a bearer token obtained from the identity provider.
//!
//! A separate [`raster`] module removes anomalous values from single-band
//! rasters taken out of those archives.
//!
//! ## Quick start
//! - Configure credentials via environment variables (`COPERNICUS_USER`,
//!   `COPERNICUS_PASSWORD`) or a `.cdserc` file (current directory or home).
//! - Call [`handler::get_images`], or drive [`Client::find_entries`] and
//!   [`Orchestrator`] yourself.
//!
//! ```no_run
//! use anyhow::Result;
//! use cdse_fetch::{CallControl, Client, GeoQuery, Orchestrator};
//!
//! fn main() -> Result<()> {
//!     let client = Client::from_env()?;
//!     let query = GeoQuery::parse(
//!         "POLYGON((-74.1 4.6, -74.0 4.6, -74.0 4.7, -74.1 4.7, -74.1 4.6))",
//!         "2024-03-01",
//!         "2024-03-06",
//!     )?;
//!     let control = CallControl::new();
//!     let entries = client.find_entries(&query, &control)?;
//!     let report = Orchestrator::new(&client, "downloads/images").run(&entries, &control)?;
//!     println!("{} downloaded, {} failed", report.succeeded(), report.failed());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

pub mod auth;
pub mod catalog;
mod client;
mod config;
pub mod control;
mod download;
pub mod error;
pub mod handler;
pub mod orchestrator;
pub mod query;
pub mod raster;
mod util;

pub use auth::{Credentials, Token, TokenCache};
pub use catalog::{CatalogEntry, RawProduct, select_entries};
pub use client::{Client, ClientConfig};
pub use control::{CallControl, CancelToken};
pub use error::{AuthError, DownloadError, Interrupted, QueryError, SearchError};
pub use orchestrator::{BatchReport, DownloadJob, ItemOutcome, Orchestrator};
pub use query::{GeoQuery, build_filter};
pub use util::identifier_from_name;
