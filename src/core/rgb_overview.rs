use crate::io::flightlines::FlightlineJob;
use crate::io::raster::{write_geotiff, GeoTiffOptions, RasterReader};
use crate::types::{HyspexError, HyspexResult};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output value for pixels without valid input
pub const OVERVIEW_NODATA: u8 = 255;

/// Band statistics over valid samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Linear rescale from `[src_min, src_max]` to `[dst_min, dst_max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    pub src_min: f64,
    pub src_max: f64,
    pub dst_min: f64,
    pub dst_max: f64,
}

impl ScaleParams {
    /// Stretch from the band minimum to two standard deviations above the mean
    pub fn two_sigma(stats: &BandStatistics) -> Self {
        Self {
            src_min: stats.min,
            src_max: stats.mean + 2.0 * stats.std_dev,
            dst_min: 0.0,
            dst_max: 254.0,
        }
    }

    /// Apply with clipping to the destination range
    pub fn apply(&self, value: f64) -> u8 {
        let span = self.src_max - self.src_min;
        let scaled = if span.abs() < f64::EPSILON {
            self.dst_min
        } else {
            (value - self.src_min) * (self.dst_max - self.dst_min) / span + self.dst_min
        };
        let lo = self.dst_min.min(self.dst_max);
        let hi = self.dst_min.max(self.dst_max);
        scaled.clamp(lo, hi).round() as u8
    }
}

fn is_valid(value: f64, nodata: Option<f64>) -> bool {
    value.is_finite() && nodata.map_or(true, |nd| value != nd)
}

/// Min, max, mean and population standard deviation of valid samples
pub fn band_statistics(band: ArrayView2<f64>, nodata: Option<f64>) -> HyspexResult<BandStatistics> {
    let mut count = 0usize;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for v in band.iter().copied().filter(|v| is_valid(*v, nodata)) {
        count += 1;
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    if count == 0 {
        return Err(HyspexError::Processing("Band has no valid samples".to_string()));
    }

    let mean = sum / count as f64;
    let var = band
        .iter()
        .copied()
        .filter(|v| is_valid(*v, nodata))
        .map(|v| (v - mean).powi(2))
        .sum::<f64>()
        / count as f64;

    Ok(BandStatistics {
        min,
        max,
        mean,
        std_dev: var.sqrt(),
    })
}

/// RGB overview parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RgbOverviewParams {
    /// 1-based (red, green, blue) band numbers
    pub bands: [usize; 3],
    /// GTiff creation options for the output
    pub creation_options: Vec<(String, String)>,
}

impl Default for RgbOverviewParams {
    fn default() -> Self {
        Self {
            bands: [290, 140, 20],
            creation_options: vec![
                ("COMPRESS".to_string(), "JPEG".to_string()),
                ("TILED".to_string(), "YES".to_string()),
                ("PHOTOMETRIC".to_string(), "YCBCR".to_string()),
            ],
        }
    }
}

impl RgbOverviewParams {
    /// Tag used in output file names, e.g. `290_140_20`
    pub fn tag(&self) -> String {
        self.bands
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Generates 8-bit RGB preview images of flightlines
pub struct RgbOverviewGenerator {
    params: RgbOverviewParams,
    scale_fn: fn(&BandStatistics) -> ScaleParams,
}

impl RgbOverviewGenerator {
    pub fn new() -> Self {
        Self::with_params(RgbOverviewParams::default())
    }

    pub fn with_params(params: RgbOverviewParams) -> Self {
        Self {
            params,
            scale_fn: ScaleParams::two_sigma,
        }
    }

    /// Replace the statistics-to-scaling rule
    pub fn with_scale_fn(mut self, scale_fn: fn(&BandStatistics) -> ScaleParams) -> Self {
        self.scale_fn = scale_fn;
        self
    }

    /// Band numbers clamped to the available band count
    pub fn output_bands(&self, band_count: usize) -> HyspexResult<[usize; 3]> {
        if band_count == 0 {
            return Err(HyspexError::InvalidFormat("Raster has no bands".to_string()));
        }
        let mut bands = self.params.bands;
        for band in bands.iter_mut() {
            if *band == 0 {
                return Err(HyspexError::InvalidParameter("Band numbers start at 1".to_string()));
            }
            if *band > band_count {
                log::warn!("Band {} not available ({} bands), using band {}", band, band_count, band_count);
                *band = band_count;
            }
        }
        Ok(bands)
    }

    /// Rescale one band to bytes; invalid samples become `OVERVIEW_NODATA`
    pub fn scale_band(&self, band: ArrayView2<f64>, nodata: Option<f64>) -> HyspexResult<Array2<u8>> {
        let stats = band_statistics(band, nodata)?;
        let scale = (self.scale_fn)(&stats);
        log::debug!("Band statistics {:?}, scaling {:?}", stats, scale);

        Ok(band.mapv(|v| {
            if is_valid(v, nodata) {
                scale.apply(v)
            } else {
                OVERVIEW_NODATA
            }
        }))
    }

    pub fn generate<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q) -> HyspexResult<()> {
        let reader = RasterReader::open(input.as_ref())?;
        let metadata = reader.metadata()?;
        let bands = self.output_bands(reader.band_count())?;
        log::info!("Generating RGB overview of {} from bands {:?}", input.as_ref().display(), bands);

        let mut channels = Vec::with_capacity(bands.len());
        for band in bands {
            let data = reader.read_band(band)?;
            channels.push(self.scale_band(data.view(), reader.band_nodata(band)?)?);
        }
        drop(reader);

        let options = self
            .params
            .creation_options
            .iter()
            .fold(GeoTiffOptions::with_nodata(OVERVIEW_NODATA as f64), |opts, (k, v)| {
                opts.option(k, v)
            });
        let views: Vec<ArrayView2<u8>> = channels.iter().map(|c| c.view()).collect();
        write_geotiff(output, &views, &metadata, &options)
    }

    /// Run every job; stops at the first failure
    pub fn generate_all(&self, jobs: &[FlightlineJob]) -> HyspexResult<()> {
        for (n, job) in jobs.iter().enumerate() {
            log::info!("Processing {} / {}: {}", n + 1, jobs.len(), job.input.display());
            self.generate(&job.input, &job.output)?;
        }
        Ok(())
    }
}

impl Default for RgbOverviewGenerator {
    fn default() -> Self {
        Self::new()
    }
}
