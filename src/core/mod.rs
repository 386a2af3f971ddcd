//! Core flightline processing modules

pub mod masking;
pub mod flightline_mask;
pub mod flight_data;
pub mod vegetation_index;
pub mod rgb_overview;

// Re-export main types
pub use masking::{combine_masks, crop_row, get_data_bounds, mask_row, RowMaskParams, RowMasker, ShrinkRule};
pub use flightline_mask::{
    get_flightline_mask, write_flightline_mask, FlightlineMask, FlightlineMaskParams, FlightlineMasker,
    FlightlinePaths,
};
pub use flight_data::{avg_angle, FlightData, FlightDataExtractor, FlightDataParams};
pub use vegetation_index::{IndexWavelengths, VegetationIndex, VegetationIndexProcessor};
pub use rgb_overview::{RgbOverviewGenerator, RgbOverviewParams};
