//! Removal of anomalous pixel values from single-band rasters.
//!
//! Pixels above a threshold are treated as missing. On save, missing and
//! non-finite pixels become 0, the band is stored as `UInt16` with nodata 0,
//! and the source georeferencing is kept as-is.

use ndarray::Array2;

/// Reflectance values above this are considered saturated or corrupt.
pub const DEFAULT_THRESHOLD: f64 = 10000.0;

pub const SOURCE_EXTENSION: &str = "jp2";
pub const OUTPUT_EXTENSION: &str = "tif";
pub const CLEANED_PREFIX: &str = "cleaned_";
pub const OUTPUT_DTYPE: &str = "UInt16";

/// Georeferencing and storage metadata of a band.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterProfile {
    /// Coordinate reference system as WKT; empty when the source had none.
    pub crs: String,
    /// GDAL-style affine geotransform.
    pub transform: [f64; 6],
    pub width: usize,
    pub height: usize,
    pub dtype: String,
    pub nodata: Option<f64>,
}

/// Pixels are `(height, width)`, row-major; NaN marks a missing pixel.
#[derive(Debug, Clone)]
pub struct RasterBand {
    pub pixels: Array2<f64>,
    pub profile: RasterProfile,
}

/// Marks every pixel strictly above `threshold` as missing.
pub fn clean(band: &RasterBand, threshold: f64) -> RasterBand {
    RasterBand {
        pixels: band
            .pixels
            .mapv(|v| if v > threshold { f64::NAN } else { v }),
        profile: band.profile.clone(),
    }
}

/// Pixels and profile exactly as [`save`] writes them.
pub fn normalize(band: &RasterBand) -> (Array2<u16>, RasterProfile) {
    let (height, width) = band.pixels.dim();
    let profile = RasterProfile {
        width,
        height,
        dtype: OUTPUT_DTYPE.to_string(),
        nodata: Some(0.0),
        ..band.profile.clone()
    };
    (band.pixels.mapv(to_u16), profile)
}

fn to_u16(v: f64) -> u16 {
    if v.is_finite() {
        // float -> int `as` saturates at the type bounds
        v as u16
    } else {
        0
    }
}

/// `B02.jp2` -> `cleaned_B02.tif`; `None` for files the cleaner does not handle.
pub fn cleaned_file_name(name: &str) -> Option<String> {
    let stem = name.strip_suffix(&format!(".{SOURCE_EXTENSION}"))?;
    if stem.is_empty() {
        return None;
    }
    Some(format!("{CLEANED_PREFIX}{stem}.{OUTPUT_EXTENSION}"))
}

#[cfg(feature = "gdal")]
pub use self::gdal_io::{process_directory, read_band, save};

#[cfg(feature = "gdal")]
mod gdal_io {
    use std::path::{Path, PathBuf};

    use gdal::raster::Buffer;
    use gdal::{Dataset, DriverManager};
    use ndarray::Array2;
    use tracing::info;

    use super::{RasterBand, RasterProfile, clean, cleaned_file_name, normalize};
    use crate::error::RasterError;

    const IDENTITY_TRANSFORM: [f64; 6] = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

    fn gdal_error(path: &Path) -> impl Fn(gdal::errors::GdalError) -> RasterError + '_ {
        move |source| RasterError::Gdal {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Reads band 1 of `path` together with its profile.
    pub fn read_band(path: &Path) -> Result<RasterBand, RasterError> {
        let err = gdal_error(path);
        let ds = Dataset::open(path).map_err(&err)?;
        let (width, height) = ds.raster_size();
        let band = ds.rasterband(1).map_err(&err)?;

        let buf: Buffer<f64> = band
            .read_as((0, 0), (width, height), (width, height), None)
            .map_err(&err)?;
        let data = buf.data().to_vec();
        let len = data.len();
        let pixels = Array2::from_shape_vec((height, width), data).map_err(|_| {
            RasterError::Shape {
                path: path.to_path_buf(),
                width,
                height,
                len,
            }
        })?;

        Ok(RasterBand {
            pixels,
            profile: RasterProfile {
                crs: ds.projection(),
                transform: ds.geo_transform().unwrap_or(IDENTITY_TRANSFORM),
                width,
                height,
                dtype: band.band_type().name(),
                nodata: band.no_data_value(),
            },
        })
    }

    /// Writes `band` as a single-band `UInt16` GeoTIFF with nodata 0.
    pub fn save(band: &RasterBand, path: &Path) -> Result<RasterProfile, RasterError> {
        let err = gdal_error(path);
        let (pixels, profile) = normalize(band);

        let driver = DriverManager::get_driver_by_name("GTiff").map_err(&err)?;
        let mut ds = driver
            .create_with_band_type::<u16, _>(path, profile.width, profile.height, 1)
            .map_err(&err)?;
        ds.set_geo_transform(&profile.transform).map_err(&err)?;
        if !profile.crs.is_empty() {
            ds.set_projection(&profile.crs).map_err(&err)?;
        }

        let mut out = ds.rasterband(1).map_err(&err)?;
        out.set_no_data_value(profile.nodata).map_err(&err)?;
        let data: Vec<u16> = pixels.iter().copied().collect();
        let mut buf = Buffer::new((profile.width, profile.height), data);
        out.write((0, 0), (profile.width, profile.height), &mut buf)
            .map_err(&err)?;

        Ok(profile)
    }

    /// Cleans every `*.jp2` in `input_dir` into `output_dir/cleaned_<stem>.tif`.
    pub fn process_directory(
        input_dir: &Path,
        output_dir: &Path,
        threshold: f64,
    ) -> Result<Vec<PathBuf>, RasterError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| RasterError::Io { path, source }
        };
        std::fs::create_dir_all(output_dir).map_err(io_err(output_dir))?;

        let mut names: Vec<String> = std::fs::read_dir(input_dir)
            .map_err(io_err(input_dir))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        let mut written = Vec::new();
        for name in names {
            let Some(out_name) = cleaned_file_name(&name) else {
                continue;
            };
            let src = input_dir.join(&name);
            info!("Processing band {}", src.display());

            let band = read_band(&src)?;
            let cleaned = clean(&band, threshold);
            let dst = output_dir.join(out_name);
            save(&cleaned, &dst)?;
            info!("Cleaned band written to {}", dst.display());
            written.push(dst);
        }
        Ok(written)
    }
}
