use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// 2D real-valued band (rows = scanlines, columns = samples)
pub type Band = Array2<f64>;

/// Composite validity mask as written to disk
pub type MaskImage = Array2<i16>;

/// Outcome of searching a scanline for valid samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBounds {
    /// Index of the first and last data sample (inclusive)
    Span { first: usize, last: usize },
    /// The scanline holds no data sample at all
    Empty,
}

impl DataBounds {
    pub fn is_empty(&self) -> bool {
        matches!(self, DataBounds::Empty)
    }

    /// Bounds as a tuple, `None` for an empty row
    pub fn span(&self) -> Option<(usize, usize)> {
        match *self {
            DataBounds::Span { first, last } => Some((first, last)),
            DataBounds::Empty => None,
        }
    }
}

/// The four co-registered products that feed a flightline mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlightlineSource {
    VnirSample,
    SwirSample,
    VnirAltitude,
    SwirAltitude,
}

impl FlightlineSource {
    pub const ALL: [FlightlineSource; 4] = [
        FlightlineSource::VnirSample,
        FlightlineSource::SwirSample,
        FlightlineSource::VnirAltitude,
        FlightlineSource::SwirAltitude,
    ];
}

impl std::fmt::Display for FlightlineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlightlineSource::VnirSample => write!(f, "vnir band"),
            FlightlineSource::SwirSample => write!(f, "swir band"),
            FlightlineSource::VnirAltitude => write!(f, "vnir altitude"),
            FlightlineSource::SwirAltitude => write!(f, "swir altitude"),
        }
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

/// Raster metadata read once from a reference input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMetadata {
    pub driver: String,
    pub data_type: String,
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub nodata: Option<f64>,
    pub geo_transform: Option<GeoTransform>,
    /// Spatial reference as WKT (empty when the source has none)
    pub projection: String,
}

impl RasterMetadata {
    /// Copy with the overrides used for a composite mask raster
    pub fn for_mask(&self) -> Self {
        Self {
            data_type: "Int16".to_string(),
            band_count: 1,
            nodata: Some(0.0),
            ..self.clone()
        }
    }

    /// (rows, columns) of the raster
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

/// Error types for HySpex processing
#[derive(Debug, thiserror::Error)]
pub enum HyspexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Shape mismatch for {source_name}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        source_name: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Failed to build mask for flightline {flightline}: {source}")]
    Flightline {
        flightline: String,
        #[source]
        source: Box<HyspexError>,
    },

    #[error("Solar position error: {0}")]
    Solar(String),
}

impl HyspexError {
    pub fn flightline(name: impl Into<String>, source: HyspexError) -> Self {
        HyspexError::Flightline {
            flightline: name.into(),
            source: Box::new(source),
        }
    }
}

/// Result type for HySpex operations
pub type HyspexResult<T> = Result<T, HyspexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_metadata_overrides() {
        let meta = RasterMetadata {
            driver: "ENVI".to_string(),
            data_type: "Float32".to_string(),
            width: 640,
            height: 2000,
            band_count: 170,
            nodata: None,
            geo_transform: Some(GeoTransform::from_gdal([500000.0, 1.0, 0.0, 7200000.0, 0.0, -1.0])),
            projection: "LOCAL_CS[\"test\"]".to_string(),
        };

        let mask_meta = meta.for_mask();
        assert_eq!(mask_meta.data_type, "Int16");
        assert_eq!(mask_meta.band_count, 1);
        assert_eq!(mask_meta.nodata, Some(0.0));
        assert_eq!(mask_meta.shape(), (2000, 640));
        assert_eq!(mask_meta.geo_transform, meta.geo_transform);
        assert_eq!(mask_meta.projection, meta.projection);
    }

    #[test]
    fn test_flightline_error_names_flightline() {
        let err = HyspexError::flightline(
            "20200710-CPC_01",
            HyspexError::Processing("band 3 missing".to_string()),
        );
        let msg = format!("{}", err);
        assert!(msg.contains("20200710-CPC_01"));
        assert!(msg.contains("band 3 missing"));
    }

    #[test]
    fn test_geotransform_round_trip() {
        let gt = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(GeoTransform::from_gdal(gt).to_gdal(), gt);
    }
}
