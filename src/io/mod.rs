//! I/O modules for rasters, ENVI headers, navigation files and flightline discovery

pub mod raster;
pub mod envi_header;
pub mod navigation;
pub mod flightlines;

pub use raster::RasterReader;
pub use envi_header::EnviHeader;
pub use navigation::{NavRecord, NavigationReader};
pub use flightlines::{FlightlineInput, FlightlineJob};
