use crate::io::envi_header::EnviHeader;
use crate::io::flightlines::FlightlineJob;
use crate::io::raster::{write_geotiff, GeoTiffOptions, RasterReader};
use crate::types::{Band, HyspexError, HyspexResult};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Spectral indices computed from hyperspectral bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VegetationIndex {
    /// Normalized Difference Vegetation Index
    Ndvi,
    /// Enhanced Vegetation Index
    Evi,
    /// Visible Green Index
    Vig,
    /// Visible Atmospherically Resistant Index
    Vari,
    /// Normalized Difference Infrared Index (MODIS band 6)
    Ndii6,
    /// Normalized Difference Infrared Index (MODIS band 7)
    Ndii7,
    /// Water Index
    Wi,
    /// Normalized Difference Water Index
    Ndwi,
}

impl VegetationIndex {
    pub const ALL: [VegetationIndex; 8] = [
        VegetationIndex::Ndvi,
        VegetationIndex::Evi,
        VegetationIndex::Vig,
        VegetationIndex::Vari,
        VegetationIndex::Ndii6,
        VegetationIndex::Ndii7,
        VegetationIndex::Wi,
        VegetationIndex::Ndwi,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VegetationIndex::Ndvi => "ndvi",
            VegetationIndex::Evi => "evi",
            VegetationIndex::Vig => "vig",
            VegetationIndex::Vari => "vari",
            VegetationIndex::Ndii6 => "ndii6",
            VegetationIndex::Ndii7 => "ndii7",
            VegetationIndex::Wi => "wi",
            VegetationIndex::Ndwi => "ndwi",
        }
    }

    /// Default band centre wavelengths in nm, in the order the formula expects
    pub fn default_wavelengths(&self) -> &'static [f64] {
        match self {
            VegetationIndex::Ndvi => &[645.0, 857.0],
            VegetationIndex::Evi => &[469.0, 645.0, 857.0],
            VegetationIndex::Vig => &[555.0, 645.0],
            VegetationIndex::Vari => &[469.0, 555.0, 645.0],
            VegetationIndex::Ndii6 => &[857.0, 1640.0],
            VegetationIndex::Ndii7 => &[857.0, 2130.0],
            VegetationIndex::Wi => &[900.0, 970.0],
            VegetationIndex::Ndwi => &[857.0, 1240.0],
        }
    }

    pub fn band_count(&self) -> usize {
        self.default_wavelengths().len()
    }

    /// Index value of one pixel; `px` holds reflectances in wavelength order
    fn evaluate(&self, px: &[f64]) -> f64 {
        match self {
            // [red, nir]
            VegetationIndex::Ndvi => normalized_difference(px[1], px[0]),
            // [blue, red, nir]
            VegetationIndex::Evi => ratio(2.5 * (px[2] - px[1]), px[2] + 6.0 * px[1] - 7.5 * px[0] + 1.0),
            // [green, red]
            VegetationIndex::Vig => normalized_difference(px[0], px[1]),
            // [blue, green, red]
            VegetationIndex::Vari => ratio(px[1] - px[2], px[1] + px[2] - px[0]),
            // [nir, swir]
            VegetationIndex::Ndii6 | VegetationIndex::Ndii7 => normalized_difference(px[0], px[1]),
            VegetationIndex::Wi => ratio(px[0], px[1]),
            VegetationIndex::Ndwi => normalized_difference(px[0], px[1]),
        }
    }
}

impl std::fmt::Display for VegetationIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for VegetationIndex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        VegetationIndex::ALL
            .iter()
            .copied()
            .find(|vi| vi.name() == lower)
            .ok_or_else(|| {
                let names: Vec<&str> = VegetationIndex::ALL.iter().map(|vi| vi.name()).collect();
                format!("Unknown index '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        f64::NAN
    } else {
        numerator / denominator
    }
}

fn normalized_difference(a: f64, b: f64) -> f64 {
    ratio(a - b, a + b)
}

/// Wavelengths used for each index, built once and passed to the processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexWavelengths {
    table: HashMap<VegetationIndex, Vec<f64>>,
}

impl Default for IndexWavelengths {
    fn default() -> Self {
        let table = VegetationIndex::ALL
            .iter()
            .map(|vi| (*vi, vi.default_wavelengths().to_vec()))
            .collect();
        Self { table }
    }
}

impl IndexWavelengths {
    pub fn get(&self, index: VegetationIndex) -> HyspexResult<&[f64]> {
        self.table
            .get(&index)
            .map(|w| w.as_slice())
            .ok_or_else(|| HyspexError::InvalidParameter(format!("No wavelengths configured for {}", index)))
    }

    /// Override the wavelengths of one index
    pub fn set(&mut self, index: VegetationIndex, wavelengths: Vec<f64>) -> HyspexResult<()> {
        if wavelengths.len() != index.band_count() {
            return Err(HyspexError::InvalidParameter(format!(
                "{} needs {} wavelengths, got {}",
                index,
                index.band_count(),
                wavelengths.len()
            )));
        }
        self.table.insert(index, wavelengths);
        Ok(())
    }
}

/// 1-based band numbers whose centre wavelength is closest to each target.
///
/// Targets outside the covered spectral range are rejected.
pub fn nearest_bands(band_wavelengths: &[f64], targets: &[f64]) -> HyspexResult<Vec<usize>> {
    let (min, max) = band_wavelengths
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), w| (lo.min(*w), hi.max(*w)));
    if band_wavelengths.is_empty() {
        return Err(HyspexError::Metadata("No band wavelengths".to_string()));
    }

    targets
        .iter()
        .map(|target| {
            if *target < min || *target > max {
                return Err(HyspexError::InvalidParameter(format!(
                    "Wavelength {} nm outside sensor range {}-{} nm",
                    target, min, max
                )));
            }
            let (idx, _) = band_wavelengths
                .iter()
                .enumerate()
                .fold((0, f64::INFINITY), |(best, best_dist), (i, w)| {
                    let dist = (w - target).abs();
                    if dist < best_dist {
                        (i, dist)
                    } else {
                        (best, best_dist)
                    }
                });
            Ok(idx + 1)
        })
        .collect()
}

/// Compute an index from bands given in the index's wavelength order
pub fn compute_index(index: VegetationIndex, bands: &[ArrayView2<f64>]) -> HyspexResult<Array2<f32>> {
    if bands.len() != index.band_count() {
        return Err(HyspexError::InvalidParameter(format!(
            "{} needs {} bands, got {}",
            index,
            index.band_count(),
            bands.len()
        )));
    }
    let shape = bands[0].dim();
    if let Some(bad) = bands.iter().find(|b| b.dim() != shape) {
        return Err(HyspexError::ShapeMismatch {
            source_name: index.to_string(),
            expected: shape,
            found: bad.dim(),
        });
    }

    let mut px = [0.0f64; 3];
    Ok(Array2::from_shape_fn(shape, |(i, j)| {
        for (k, band) in bands.iter().enumerate() {
            px[k] = band[[i, j]];
        }
        index.evaluate(&px[..bands.len()]) as f32
    }))
}

/// Writes spectral index rasters for flightlines
pub struct VegetationIndexProcessor {
    wavelengths: IndexWavelengths,
}

impl VegetationIndexProcessor {
    pub fn new() -> Self {
        Self {
            wavelengths: IndexWavelengths::default(),
        }
    }

    pub fn with_wavelengths(wavelengths: IndexWavelengths) -> Self {
        Self { wavelengths }
    }

    /// Compute `index` for one raster; band wavelengths come from its ENVI header
    pub fn generate<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        index: VegetationIndex,
    ) -> HyspexResult<()> {
        let input = input.as_ref();
        log::info!("Computing {} for {}", index, input.display());

        let header = EnviHeader::from_file(input.with_extension("hdr"))?;
        let band_numbers = nearest_bands(&header.wavelengths()?, self.wavelengths.get(index)?)?;
        log::debug!("{} uses bands {:?}", index, band_numbers);

        let reader = RasterReader::open(input)?;
        let metadata = reader.metadata()?;
        let bands: Vec<Band> = band_numbers
            .iter()
            .map(|b| reader.read_band(*b))
            .collect::<HyspexResult<_>>()?;
        drop(reader);

        let views: Vec<ArrayView2<f64>> = bands.iter().map(|b| b.view()).collect();
        let result = compute_index(index, &views)?;

        write_geotiff(
            output,
            &[result.view()],
            &metadata,
            &GeoTiffOptions::with_nodata(f64::NAN),
        )
    }

    /// Run every job; stops at the first failure
    pub fn generate_all(&self, jobs: &[FlightlineJob], index: VegetationIndex) -> HyspexResult<()> {
        for (n, job) in jobs.iter().enumerate() {
            log::info!("Processing {} / {}: {}", n + 1, jobs.len(), job.input.display());
            self.generate(&job.input, &job.output, index)?;
        }
        Ok(())
    }
}

impl Default for VegetationIndexProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn test_parse_index_names() {
        assert_eq!("NDVI".parse::<VegetationIndex>().unwrap(), VegetationIndex::Ndvi);
        assert_eq!(" ndii7 ".parse::<VegetationIndex>().unwrap(), VegetationIndex::Ndii7);
        assert!("savi".parse::<VegetationIndex>().is_err());
        for vi in VegetationIndex::ALL {
            assert_eq!(vi.to_string().parse::<VegetationIndex>().unwrap(), vi);
        }
    }

    #[test]
    fn test_nearest_bands() {
        let wavelengths = [400.0, 500.0, 600.0, 700.0, 800.0, 900.0];
        assert_eq!(nearest_bands(&wavelengths, &[645.0, 857.0]).unwrap(), vec![3, 6]);
        assert_eq!(nearest_bands(&wavelengths, &[400.0, 900.0]).unwrap(), vec![1, 6]);
        assert!(nearest_bands(&wavelengths, &[1640.0]).is_err());
        assert!(nearest_bands(&[], &[645.0]).is_err());
    }

    #[test]
    fn test_ndvi() {
        let red = arr2(&[[0.1, 0.2], [0.0, 0.3]]);
        let nir = arr2(&[[0.5, 0.2], [0.0, 0.1]]);
        let ndvi = compute_index(VegetationIndex::Ndvi, &[red.view(), nir.view()]).unwrap();
        assert_relative_eq!(ndvi[[0, 0]], (0.4f64 / 0.6) as f32, epsilon = 1e-6);
        assert_eq!(ndvi[[0, 1]], 0.0);
        assert!(ndvi[[1, 0]].is_nan());
        assert_relative_eq!(ndvi[[1, 1]], -0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_evi() {
        let blue = arr2(&[[0.05]]);
        let red = arr2(&[[0.1]]);
        let nir = arr2(&[[0.4]]);
        let evi = compute_index(VegetationIndex::Evi, &[blue.view(), red.view(), nir.view()]).unwrap();
        let expected = 2.5 * (0.4 - 0.1) / (0.4 + 6.0 * 0.1 - 7.5 * 0.05 + 1.0);
        assert_relative_eq!(evi[[0, 0]], expected as f32, epsilon = 1e-6);
    }

    #[test]
    fn test_vari_and_vig_use_green_minus_red() {
        let blue = arr2(&[[0.05]]);
        let green = arr2(&[[0.2]]);
        let red = arr2(&[[0.1]]);
        let vari = compute_index(VegetationIndex::Vari, &[blue.view(), green.view(), red.view()]).unwrap();
        assert_relative_eq!(vari[[0, 0]], (0.1f64 / 0.25) as f32, epsilon = 1e-6);

        let vig = compute_index(VegetationIndex::Vig, &[green.view(), red.view()]).unwrap();
        assert_relative_eq!(vig[[0, 0]], (0.1f64 / 0.3) as f32, epsilon = 1e-6);
    }

    #[test]
    fn test_water_indices() {
        let r857 = arr2(&[[0.4]]);
        let r1240 = arr2(&[[0.2]]);
        let ndwi = compute_index(VegetationIndex::Ndwi, &[r857.view(), r1240.view()]).unwrap();
        assert_relative_eq!(ndwi[[0, 0]], (0.2f64 / 0.6) as f32, epsilon = 1e-6);

        let wi = compute_index(VegetationIndex::Wi, &[r857.view(), r1240.view()]).unwrap();
        assert_relative_eq!(wi[[0, 0]], 2.0, epsilon = 1e-6);

        let ndii = compute_index(VegetationIndex::Ndii6, &[r857.view(), r1240.view()]).unwrap();
        assert_relative_eq!(ndii[[0, 0]], ndwi[[0, 0]]);
    }

    #[test]
    fn test_band_count_checked() {
        let a = arr2(&[[0.1]]);
        assert!(compute_index(VegetationIndex::Evi, &[a.view(), a.view()]).is_err());

        let b = arr2(&[[0.1, 0.2]]);
        assert!(matches!(
            compute_index(VegetationIndex::Ndvi, &[a.view(), b.view()]),
            Err(HyspexError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_wavelength_overrides() {
        let mut table = IndexWavelengths::default();
        assert_eq!(table.get(VegetationIndex::Ndwi).unwrap(), &[857.0, 1240.0]);
        table.set(VegetationIndex::Ndwi, vec![860.0, 1245.0]).unwrap();
        assert_eq!(table.get(VegetationIndex::Ndwi).unwrap(), &[860.0, 1245.0]);
        assert!(table.set(VegetationIndex::Ndwi, vec![860.0]).is_err());
    }
}
