use anyhow::Result;
use cdse_fetch::raster::{DEFAULT_THRESHOLD, process_directory};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Usage: clean_bands [input_dir] [output_dir] [threshold]
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let input_dir = PathBuf::from(args.next().unwrap_or_else(|| "images".to_string()));
    let output_dir = PathBuf::from(args.next().unwrap_or_else(|| "images_cleaned".to_string()));
    let threshold = match args.next() {
        Some(t) => t.parse()?,
        None => DEFAULT_THRESHOLD,
    };

    let written = process_directory(&input_dir, &output_dir, threshold)?;
    println!("{} band(s) cleaned into {}", written.len(), output_dir.display());
    Ok(())
}
