use crate::core::masking::{combine_masks, RowMaskParams, RowMasker};
use crate::io::raster::{write_geotiff, GeoTiffOptions, RasterReader};
use crate::types::{Band, FlightlineSource, HyspexError, HyspexResult, MaskImage, RasterMetadata};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The four geocoded products of one flightline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightlinePaths {
    /// Flightline name used in logs and errors
    pub name: String,
    pub vnir: PathBuf,
    pub swir: PathBuf,
    /// VNIR navigation/scan-angle product (altitude in band 3)
    pub vnir_nav: PathBuf,
    /// SWIR navigation/scan-angle product (altitude in band 3)
    pub swir_nav: PathBuf,
}

impl FlightlinePaths {
    pub fn new<P: AsRef<Path>>(vnir: P, swir: P, vnir_nav: P, swir_nav: P) -> Self {
        let name = vnir
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| vnir.as_ref().display().to_string());
        Self {
            name,
            vnir: vnir.as_ref().to_path_buf(),
            swir: swir.as_ref().to_path_buf(),
            vnir_nav: vnir_nav.as_ref().to_path_buf(),
            swir_nav: swir_nav.as_ref().to_path_buf(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn path(&self, source: FlightlineSource) -> &Path {
        match source {
            FlightlineSource::VnirSample => &self.vnir,
            FlightlineSource::SwirSample => &self.swir,
            FlightlineSource::VnirAltitude => &self.vnir_nav,
            FlightlineSource::SwirAltitude => &self.swir_nav,
        }
    }
}

/// Flightline mask parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightlineMaskParams {
    /// Band read from the radiance products
    pub sample_band: usize,
    /// Altitude band of the navigation products
    pub altitude_band: usize,
    pub row_params: RowMaskParams,
}

impl Default for FlightlineMaskParams {
    fn default() -> Self {
        Self {
            sample_band: 1,
            altitude_band: 3,
            row_params: RowMaskParams::default(),
        }
    }
}

/// Composite validity mask of a flightline with its output metadata
#[derive(Debug, Clone)]
pub struct FlightlineMask {
    pub mask: MaskImage,
    pub metadata: RasterMetadata,
}

impl FlightlineMask {
    /// Fraction of pixels valid in all four sources
    pub fn valid_fraction(&self) -> f64 {
        if self.mask.is_empty() {
            return 0.0;
        }
        self.mask.iter().filter(|v| **v != 0).count() as f64 / self.mask.len() as f64
    }
}

/// Builds the composite validity mask of a flightline
pub struct FlightlineMasker {
    params: FlightlineMaskParams,
    row_masker: RowMasker,
}

impl FlightlineMasker {
    pub fn new() -> Self {
        Self {
            params: FlightlineMaskParams::default(),
            row_masker: RowMasker::new(),
        }
    }

    pub fn with_params(params: FlightlineMaskParams) -> HyspexResult<Self> {
        if params.sample_band == 0 || params.altitude_band == 0 {
            return Err(HyspexError::InvalidParameter(
                "Band numbers start at 1".to_string(),
            ));
        }
        // the composite is written with no-data 0
        if params.row_params.fill_value != 0.0 {
            return Err(HyspexError::InvalidParameter(format!(
                "Flightline masks need fill value 0, got {}",
                params.row_params.fill_value
            )));
        }
        let row_masker = RowMasker::with_params(params.row_params.clone())?;
        Ok(Self { params, row_masker })
    }

    fn band_for(&self, source: FlightlineSource) -> usize {
        match source {
            FlightlineSource::VnirSample | FlightlineSource::SwirSample => self.params.sample_band,
            FlightlineSource::VnirAltitude | FlightlineSource::SwirAltitude => self.params.altitude_band,
        }
    }

    /// Read the four bands and combine their row masks.
    ///
    /// Any failure aborts the whole flightline; nothing partial is returned.
    pub fn build(&self, paths: &FlightlinePaths) -> HyspexResult<FlightlineMask> {
        log::info!("Building validity mask for flightline {}", paths.name);
        self.build_inner(paths)
            .map_err(|e| HyspexError::flightline(paths.name.clone(), e))
    }

    fn build_inner(&self, paths: &FlightlinePaths) -> HyspexResult<FlightlineMask> {
        // every reader is dropped (and its dataset closed) on all exit paths
        let readers = FlightlineSource::ALL
            .iter()
            .map(|source| RasterReader::open(paths.path(*source)).map(|r| (*source, r)))
            .collect::<HyspexResult<Vec<_>>>()?;

        let metadata = readers[0].1.metadata()?.for_mask();

        let mut bands: Vec<(FlightlineSource, Band)> = Vec::with_capacity(readers.len());
        for (source, reader) in &readers {
            let band = reader.read_band(self.band_for(*source))?;
            log::info!("read {}", source);
            log::debug!("{} shape: {:?}", source, band.dim());
            bands.push((*source, band));
        }
        drop(readers);

        let expected = metadata.shape();
        for (source, band) in &bands {
            if band.dim() != expected {
                return Err(HyspexError::ShapeMismatch {
                    source_name: source.to_string(),
                    expected,
                    found: band.dim(),
                });
            }
        }

        let masks: Vec<(FlightlineSource, Band)> = bands
            .iter()
            .map(|(source, band)| {
                let mask = self.row_masker.mask_band(band.view());
                log::info!("created {} mask", source);
                (*source, mask)
            })
            .collect();

        let refs: Vec<(FlightlineSource, &Band)> = masks.iter().map(|(s, m)| (*s, m)).collect();
        let mask = combine_masks(&refs)?;

        let result = FlightlineMask { mask, metadata };
        log::info!(
            "Flightline {} mask: {:.1}% valid",
            paths.name,
            result.valid_fraction() * 100.0
        );
        Ok(result)
    }
}

impl Default for FlightlineMasker {
    fn default() -> Self {
        Self::new()
    }
}

/// Composite mask of a flightline with default parameters
pub fn get_flightline_mask(paths: &FlightlinePaths) -> HyspexResult<FlightlineMask> {
    FlightlineMasker::new().build(paths)
}

/// Write a flightline mask as a single-band `Int16` GeoTIFF with no-data 0
pub fn write_flightline_mask<P: AsRef<Path>>(mask: &FlightlineMask, output_path: P) -> HyspexResult<()> {
    let nodata = mask.metadata.nodata.unwrap_or(0.0);
    write_geotiff(
        output_path,
        &[mask.mask.view()],
        &mask.metadata,
        &GeoTiffOptions::with_nodata(nodata),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_name_from_vnir_stem() {
        let paths = FlightlinePaths::new(
            "/data/20200710-CPC_01_VNIR_rad_geo.bsq",
            "/data/20200710-CPC_01_SWIR_rad_geo.bsq",
            "/data/20200710-CPC_01_VNIR_sca_geo.bsq",
            "/data/20200710-CPC_01_SWIR_sca_geo.bsq",
        );
        assert_eq!(paths.name, "20200710-CPC_01_VNIR_rad_geo");
        assert_eq!(
            paths.path(FlightlineSource::SwirAltitude),
            Path::new("/data/20200710-CPC_01_SWIR_sca_geo.bsq")
        );
        assert_eq!(paths.with_name("line 1").name, "line 1");
    }

    #[test]
    fn test_default_bands() {
        let masker = FlightlineMasker::new();
        assert_eq!(masker.band_for(FlightlineSource::VnirSample), 1);
        assert_eq!(masker.band_for(FlightlineSource::SwirSample), 1);
        assert_eq!(masker.band_for(FlightlineSource::VnirAltitude), 3);
        assert_eq!(masker.band_for(FlightlineSource::SwirAltitude), 3);
    }

    #[test]
    fn test_zero_band_rejected() {
        let params = FlightlineMaskParams {
            altitude_band: 0,
            ..FlightlineMaskParams::default()
        };
        assert!(FlightlineMasker::with_params(params).is_err());
    }

    #[test]
    fn test_missing_files_name_flightline() {
        let paths = FlightlinePaths::new("/nope/a.bsq", "/nope/b.bsq", "/nope/c.bsq", "/nope/d.bsq")
            .with_name("20200710-CPC_07");
        match get_flightline_mask(&paths) {
            Err(HyspexError::Flightline { flightline, .. }) => assert_eq!(flightline, "20200710-CPC_07"),
            other => panic!("expected flightline error, got {:?}", other.map(|m| m.mask.dim())),
        }
    }

    #[test]
    fn test_valid_fraction() {
        let mask = FlightlineMask {
            mask: ndarray::arr2(&[[0i16, 1], [1, 1]]),
            metadata: RasterMetadata {
                driver: "GTiff".to_string(),
                data_type: "Int16".to_string(),
                width: 2,
                height: 2,
                band_count: 1,
                nodata: Some(0.0),
                geo_transform: None,
                projection: String::new(),
            },
        };
        assert!((mask.valid_fraction() - 0.75).abs() < 1e-12);
    }
}
