use anyhow::{Context, Result, anyhow};
use cdse_fetch::Client;
use cdse_fetch::handler::{default_output_dir, get_images_into};
use cdse_fetch::query::polygon_wkt;
use chrono::{Duration, Local};
use geojson::GeoJson;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Usage: fetch_recent [map.geojson] [days]
    // Credentials come from COPERNICUS_USER / COPERNICUS_PASSWORD or a `.cdserc` file.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let geojson_path = args.next().unwrap_or_else(|| "map.geojson".to_string());
    let days: i64 = match args.next() {
        Some(d) => d.parse().context("days must be an integer")?,
        None => 5,
    };

    let text = std::fs::read_to_string(&geojson_path)
        .with_context(|| format!("failed to read {geojson_path}"))?;
    let polygon = first_polygon_wkt(&text)?;

    let today = Local::now().date_naive();
    let end_date = today.format("%Y-%m-%d").to_string();
    let initial_date = (today - Duration::days(days)).format("%Y-%m-%d").to_string();

    let client = Client::from_env()?.with_progress(true);
    let (status, message) = get_images_into(
        &client,
        &polygon,
        &initial_date,
        &end_date,
        &default_output_dir(),
    );
    println!("{status} {message}");
    Ok(())
}

fn first_polygon_wkt(text: &str) -> Result<String> {
    let geometry = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .find_map(|f| f.geometry)
            .ok_or_else(|| anyhow!("feature collection has no geometry"))?,
        GeoJson::Feature(f) => f.geometry.ok_or_else(|| anyhow!("feature has no geometry"))?,
        GeoJson::Geometry(g) => g,
    };
    let geometry = geo_types::Geometry::<f64>::try_from(geometry)?;
    polygon_wkt(&geometry).ok_or_else(|| anyhow!("first geometry is not a polygon"))
}
