//! Catalog search and result selection.

use geo_types::Geometry;
use reqwest::Url;
use std::collections::HashSet;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::control::CallControl;
use crate::error::SearchError;
use crate::query::{GeoQuery, build_filter, search_params};
use crate::util::identifier_from_name;

/// Name fragment of the top-of-atmosphere (uncorrected) processing level.
pub const UNCORRECTED_MARKER: &str = "L1C";

/// One product record as returned by the catalog.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawProduct {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "GeoFootprint", default)]
    pub geo_footprint: Option<Value>,
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct SearchPage {
    #[serde(default)]
    pub(crate) value: Vec<RawProduct>,
    #[serde(rename = "@odata.nextLink", default)]
    pub(crate) next_link: Option<String>,
    #[serde(rename = "@odata.count", default)]
    pub(crate) count: Option<u64>,
}

/// A product selected for download.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Opaque server identifier used in download URLs.
    pub id: String,
    pub name: String,
    /// `None` when the record's footprint could not be decoded.
    pub footprint: Option<Geometry<f64>>,
    /// `name` up to its first `.`; also the archive file stem.
    pub identifier: String,
}

impl CatalogEntry {
    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.identifier)
    }
}

impl Client {
    /// Runs the catalog query, following continuation links until exhausted.
    ///
    /// A continuation link pointing at an already fetched page is
    /// [`SearchError::PaginationLoop`]; more than the client's page limit is
    /// [`SearchError::TooManyPages`].
    pub fn search(
        &self,
        query: &GeoQuery,
        control: &CallControl,
    ) -> Result<Vec<RawProduct>, SearchError> {
        let filter = build_filter(query, self.collection.as_deref());
        debug!(%filter, "catalog filter");

        let params = search_params(&filter);
        let (mut page, first_url) =
            self.search_page(&self.config.data_url, Some(params.as_slice()), control)?;
        if let Some(total) = page.count {
            debug!(total, "catalog reported match count");
        }

        let mut products = std::mem::take(&mut page.value);
        let mut visited = HashSet::from([first_url]);
        let mut pages = 1usize;
        while let Some(next) = page.next_link.take() {
            let next = normalize_url(&next);
            if !visited.insert(next.clone()) {
                return Err(SearchError::PaginationLoop { url: next });
            }
            if pages >= self.max_pages {
                return Err(SearchError::TooManyPages {
                    limit: self.max_pages,
                });
            }
            let (next_page, _) = self.search_page(&next, None, control)?;
            page = next_page;
            pages += 1;
            products.append(&mut page.value);
        }

        debug!(count = products.len(), "catalog search finished");
        Ok(products)
    }

    /// Search followed by [`select_entries`].
    pub fn find_entries(
        &self,
        query: &GeoQuery,
        control: &CallControl,
    ) -> Result<Vec<CatalogEntry>, SearchError> {
        Ok(select_entries(self.search(query, control)?))
    }

    fn search_page(
        &self,
        url: &str,
        params: Option<&[(&'static str, String)]>,
        control: &CallControl,
    ) -> Result<(SearchPage, String), SearchError> {
        let timeout = control.request_timeout(self.timeout)?;
        let mut req = self.http.get(url).timeout(timeout);
        if let Some(params) = params {
            req = req.query(params);
        }

        let transport = |source| SearchError::Transport {
            url: url.to_string(),
            source,
        };
        let resp = req.send().map_err(transport)?;
        let status = resp.status();
        let requested = resp.url().to_string();
        let text = resp.text().map_err(transport)?;

        if status.as_u16() != 200 {
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let page = serde_json::from_str(&text).map_err(|source| SearchError::Decode {
            url: url.to_string(),
            source,
        })?;
        Ok((page, requested))
    }
}

// Same textual form `Response::url` reports, so links compare equal to fetched pages.
fn normalize_url(url: &str) -> String {
    Url::parse(url).map(String::from).unwrap_or_else(|_| url.to_string())
}

/// Drops uncorrected products and derives identifiers, preserving catalog order.
pub fn select_entries(products: Vec<RawProduct>) -> Vec<CatalogEntry> {
    let entries: Vec<CatalogEntry> = products
        .into_iter()
        .filter(|p| !p.name.contains(UNCORRECTED_MARKER))
        .map(|p| {
            let footprint = p.geo_footprint.and_then(|v| decode_footprint(&p.name, v));
            CatalogEntry {
                identifier: identifier_from_name(&p.name).to_string(),
                id: p.id,
                name: p.name,
                footprint,
            }
        })
        .collect();

    info!("total L2A tiles found {}", entries.len());
    entries
}

fn decode_footprint(name: &str, value: Value) -> Option<Geometry<f64>> {
    let geometry = match geojson::Geometry::from_json_value(value) {
        Ok(g) => g,
        Err(e) => {
            warn!(product = %name, error = %e, "undecodable footprint");
            return None;
        }
    };
    match Geometry::<f64>::try_from(geometry) {
        Ok(g) => Some(g),
        Err(e) => {
            warn!(product = %name, error = %e, "unsupported footprint geometry");
            None
        }
    }
}
