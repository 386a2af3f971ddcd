//! hyspex: processing tools for airborne HySpex VNIR/SWIR hyperspectral flightlines
//!
//! Flightline validity masks, ATCOR flight data extraction, RGB overview
//! images and vegetation/water index rasters, built on GDAL and ndarray.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    Band, DataBounds, FlightlineSource, GeoTransform, HyspexError, HyspexResult, MaskImage, RasterMetadata,
};

pub use io::{EnviHeader, NavigationReader, RasterReader};
pub use crate::core::{
    combine_masks, crop_row, get_data_bounds, get_flightline_mask, mask_row, write_flightline_mask,
    FlightlineMasker, FlightlinePaths, RowMasker,
};

#[cfg(feature = "python")]
mod python {
    use crate::core::flightline_mask::{get_flightline_mask, write_flightline_mask, FlightlinePaths};
    use crate::core::masking;
    use crate::types::HyspexError;
    use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray1};
    use pyo3::prelude::*;

    fn to_py_err(e: HyspexError) -> PyErr {
        PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
    }

    /// First and last data index of a row, or None when the row holds no data
    #[pyfunction]
    #[pyo3(signature = (row, nodataval = 0.0, reversesign = false))]
    fn get_data_bounds(row: PyReadonlyArray1<'_, f64>, nodataval: f64, reversesign: bool) -> Option<(usize, usize)> {
        masking::get_data_bounds(row.as_array(), nodataval, reversesign).span()
    }

    #[pyfunction]
    #[pyo3(signature = (row, lprop = 0.0, rprop = 0.0, nodataval = 0.0))]
    fn mask_row<'py>(
        py: Python<'py>,
        row: PyReadonlyArray1<'py, f64>,
        lprop: f64,
        rprop: f64,
        nodataval: f64,
    ) -> PyResult<&'py PyArray1<f64>> {
        let mask = masking::mask_row(row.as_array(), lprop, rprop, nodataval).map_err(to_py_err)?;
        Ok(mask.into_pyarray(py))
    }

    /// Crops the row in place and returns it
    #[pyfunction]
    #[pyo3(signature = (row, lprop = 0.1, rprop = 0.1, nodataval = 0.0))]
    fn crop_row<'py>(row: &'py PyArray1<f64>, lprop: f64, rprop: f64, nodataval: f64) -> PyResult<&'py PyArray1<f64>> {
        {
            let mut rw = row.readwrite();
            masking::crop_row(rw.as_array_mut(), lprop, rprop, nodataval).map_err(to_py_err)?;
        }
        Ok(row)
    }

    /// Composite mask of the four geocoded products; optionally written to `output`
    #[pyfunction]
    #[pyo3(signature = (vnirpath, swirpath, vnirscapath, swirscapath, output = None))]
    fn flightline_mask<'py>(
        py: Python<'py>,
        vnirpath: String,
        swirpath: String,
        vnirscapath: String,
        swirscapath: String,
        output: Option<String>,
    ) -> PyResult<&'py PyArray2<i16>> {
        let paths = FlightlinePaths::new(vnirpath, swirpath, vnirscapath, swirscapath);
        let mask = get_flightline_mask(&paths).map_err(to_py_err)?;
        if let Some(out) = output {
            write_flightline_mask(&mask, out).map_err(to_py_err)?;
        }
        Ok(mask.mask.into_pyarray(py))
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(get_data_bounds, m)?)?;
        m.add_function(wrap_pyfunction!(mask_row, m)?)?;
        m.add_function(wrap_pyfunction!(crop_row, m)?)?;
        m.add_function(wrap_pyfunction!(flightline_mask, m)?)?;
        Ok(())
    }
}
