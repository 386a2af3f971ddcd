use crate::types::{Band, GeoTransform, HyspexError, HyspexResult, RasterMetadata};
use gdal::raster::{Buffer, GdalType, RasterCreationOption};
use gdal::{Dataset, DriverManager};
use ndarray::{Array2, ArrayView2};
use std::path::{Path, PathBuf};

/// Read-only handle on a raster file.
///
/// The underlying GDAL dataset is closed when the reader is dropped.
pub struct RasterReader {
    dataset: Dataset,
    path: PathBuf,
}

impl RasterReader {
    pub fn open<P: AsRef<Path>>(path: P) -> HyspexResult<Self> {
        log::debug!("Opening raster: {}", path.as_ref().display());
        let dataset = Dataset::open(path.as_ref())?;
        Ok(Self {
            dataset,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn band_count(&self) -> usize {
        self.dataset.raster_count() as usize
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        let (width, height) = self.dataset.raster_size();
        (height, width)
    }

    pub fn metadata(&self) -> HyspexResult<RasterMetadata> {
        let (width, height) = self.dataset.raster_size();
        let band_count = self.band_count();

        let (data_type, nodata) = if band_count > 0 {
            let band = self.dataset.rasterband(1)?;
            (format!("{:?}", band.band_type()), band.no_data_value())
        } else {
            ("Unknown".to_string(), None)
        };

        // ENVI products without map info have no geotransform
        let geo_transform = self.dataset.geo_transform().ok().map(GeoTransform::from_gdal);

        Ok(RasterMetadata {
            driver: self.dataset.driver().short_name(),
            data_type,
            width,
            height,
            band_count,
            nodata,
            geo_transform,
            projection: self.dataset.projection(),
        })
    }

    fn check_band(&self, band: usize) -> HyspexResult<()> {
        let count = self.band_count();
        if band == 0 || band > count {
            return Err(HyspexError::InvalidParameter(format!(
                "Band {} out of range for {} ({} bands)",
                band,
                self.path.display(),
                count
            )));
        }
        Ok(())
    }

    /// No-data value of a 1-based band
    pub fn band_nodata(&self, band: usize) -> HyspexResult<Option<f64>> {
        self.check_band(band)?;
        Ok(self.dataset.rasterband(band as isize)?.no_data_value())
    }

    /// Read a full 1-based band as `f64`
    pub fn read_band(&self, band: usize) -> HyspexResult<Band> {
        self.check_band(band)?;

        let (width, height) = self.dataset.raster_size();
        let rasterband = self.dataset.rasterband(band as isize)?;
        let band_data = rasterband.read_as::<f64>((0, 0), (width, height), (width, height), None)?;

        Array2::from_shape_vec((height, width), band_data.data)
            .map_err(|e| HyspexError::Processing(format!("Failed to reshape band {}: {}", band, e)))
    }
}

/// GeoTIFF writer settings
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    pub nodata: Option<f64>,
    /// GTiff creation options as (key, value)
    pub creation_options: Vec<(String, String)>,
}

impl GeoTiffOptions {
    pub fn with_nodata(nodata: f64) -> Self {
        Self {
            nodata: Some(nodata),
            creation_options: Vec::new(),
        }
    }

    pub fn option(mut self, key: &str, value: &str) -> Self {
        self.creation_options.push((key.to_string(), value.to_string()));
        self
    }
}

/// Write bands as a GeoTIFF georeferenced like `reference`.
///
/// A partially written file is removed when writing fails.
pub fn write_geotiff<T: GdalType + Copy, P: AsRef<Path>>(
    output_path: P,
    bands: &[ArrayView2<T>],
    reference: &RasterMetadata,
    options: &GeoTiffOptions,
) -> HyspexResult<()> {
    let path = output_path.as_ref();
    let result = write_geotiff_inner(path, bands, reference, options);
    if result.is_err() && path.exists() {
        log::warn!("Removing incomplete output {}", path.display());
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("Could not remove {}: {}", path.display(), e);
        }
    }
    result
}

fn write_geotiff_inner<T: GdalType + Copy>(
    path: &Path,
    bands: &[ArrayView2<T>],
    reference: &RasterMetadata,
    options: &GeoTiffOptions,
) -> HyspexResult<()> {
    let first = bands
        .first()
        .ok_or_else(|| HyspexError::Processing("No bands to write".to_string()))?;
    let (height, width) = first.dim();
    if let Some(bad) = bands.iter().find(|b| b.dim() != (height, width)) {
        return Err(HyspexError::ShapeMismatch {
            source_name: path.display().to_string(),
            expected: (height, width),
            found: bad.dim(),
        });
    }

    log::info!("Writing {} band GeoTIFF: {}", bands.len(), path.display());

    let creation_options: Vec<RasterCreationOption> = options
        .creation_options
        .iter()
        .map(|(key, value)| RasterCreationOption {
            key: key.as_str(),
            value: value.as_str(),
        })
        .collect();

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type_with_options::<T, _>(
        path,
        width as isize,
        height as isize,
        bands.len() as isize,
        &creation_options,
    )?;

    if let Some(transform) = &reference.geo_transform {
        dataset.set_geo_transform(&transform.to_gdal())?;
    }
    if !reference.projection.is_empty() {
        dataset.set_projection(&reference.projection)?;
    }

    for (idx, band) in bands.iter().enumerate() {
        let mut rasterband = dataset.rasterband(idx as isize + 1)?;
        let flat_data: Vec<T> = band.iter().copied().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;

        if let Some(nodata) = options.nodata {
            rasterband.set_no_data_value(Some(nodata))?;
        }
    }

    Ok(())
}
