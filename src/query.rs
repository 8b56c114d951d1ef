//! Catalog filter expressions.
//!
//! The catalog speaks OData; a search is a single `$filter` combining an
//! optional collection predicate, a spatial intersection against the search
//! polygon (SRID 4326) and a half-open window on the acquisition start time.

use chrono::NaiveDate;
use geo_types::{Geometry, LineString, Polygon};

use crate::error::QueryError;

/// Collection searched when none is configured explicitly.
pub const DEFAULT_COLLECTION: &str = "SENTINEL-2";

/// Page size requested from the catalog.
pub const PAGE_SIZE: usize = 1000;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Area and time window of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoQuery {
    /// Search area as WKT. Passed through to the server unvalidated.
    pub polygon: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl GeoQuery {
    pub fn new(polygon: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            polygon: polygon.into(),
            start_date,
            end_date,
        }
    }

    /// Builds a query from `YYYY-MM-DD` date strings. Ordering is the caller's concern.
    pub fn parse(polygon: &str, start_date: &str, end_date: &str) -> Result<Self, QueryError> {
        Ok(Self::new(polygon, parse_date(start_date)?, parse_date(end_date)?))
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|source| {
        QueryError::InvalidDate {
            value: value.to_string(),
            source,
        }
    })
}

fn midnight(date: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date.format(DATE_FORMAT))
}

/// The `$filter` expression for `query`.
pub fn build_filter(query: &GeoQuery, collection: Option<&str>) -> String {
    let spatial = format!(
        "OData.CSC.Intersects(area=geography'SRID=4326;{}')",
        query.polygon
    );
    let temporal = format!(
        "ContentDate/Start gt {} and ContentDate/Start lt {}",
        midnight(query.start_date),
        midnight(query.end_date)
    );

    match collection {
        Some(name) => format!("Collection/Name eq '{name}' and {spatial} and {temporal}"),
        None => format!("{spatial} and {temporal}"),
    }
}

/// Query parameters of the first search page.
pub fn search_params(filter: &str) -> Vec<(&'static str, String)> {
    vec![
        ("$filter", filter.to_string()),
        ("$count", "True".to_string()),
        ("$top", PAGE_SIZE.to_string()),
    ]
}

/// Renders a polygonal geometry as WKT. Other geometry kinds yield `None`.
pub fn polygon_wkt(geometry: &Geometry<f64>) -> Option<String> {
    match geometry {
        Geometry::Polygon(p) => Some(format!("POLYGON {}", polygon_body(p))),
        Geometry::MultiPolygon(mp) => {
            let parts: Vec<String> = mp.0.iter().map(polygon_body).collect();
            Some(format!("MULTIPOLYGON ({})", parts.join(", ")))
        }
        _ => None,
    }
}

fn polygon_body(p: &Polygon<f64>) -> String {
    let rings: Vec<String> = std::iter::once(p.exterior())
        .chain(p.interiors())
        .map(ring_body)
        .collect();
    format!("({})", rings.join(", "))
}

fn ring_body(ring: &LineString<f64>) -> String {
    let coords: Vec<String> = ring.coords().map(|c| format!("{} {}", c.x, c.y)).collect();
    format!("({})", coords.join(", "))
}
