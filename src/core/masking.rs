use crate::types::{Band, DataBounds, FlightlineSource, HyspexError, HyspexResult, MaskImage};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1};
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// How the right edge shrink is measured when cropping a span inward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShrinkRule {
    /// Right shrink uses the width left over after the left index moved
    Sequential,
    /// Both shrinks use the originally detected width
    Symmetric,
}

/// Row masking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowMaskParams {
    /// Sentinel marking invalid samples
    pub nodata_value: f64,
    /// Treat values below the sentinel as data instead of values above it
    pub reverse_sign: bool,
    /// Fraction of the valid width to drop at the left edge
    pub left_prop: f64,
    /// Fraction of the valid width to drop at the right edge
    pub right_prop: f64,
    /// Value written outside the valid span
    pub fill_value: f64,
    pub shrink_rule: ShrinkRule,
}

impl Default for RowMaskParams {
    fn default() -> Self {
        Self {
            nodata_value: 0.0,
            reverse_sign: false,
            left_prop: 0.0,
            right_prop: 0.0,
            fill_value: 0.0,
            shrink_rule: ShrinkRule::Sequential,
        }
    }
}

impl RowMaskParams {
    /// Parameters matching the cropping defaults (10% off each edge)
    pub fn cropping() -> Self {
        Self {
            left_prop: 0.1,
            right_prop: 0.1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> HyspexResult<()> {
        for (name, prop) in [("left", self.left_prop), ("right", self.right_prop)] {
            if !prop.is_finite() || !(0.0..=1.0).contains(&prop) {
                return Err(HyspexError::InvalidParameter(format!(
                    "{} proportion must lie in [0, 1], got {}",
                    name, prop
                )));
            }
        }
        if !self.nodata_value.is_finite() {
            return Err(HyspexError::InvalidParameter(format!(
                "nodata value must be finite, got {}",
                self.nodata_value
            )));
        }
        Ok(())
    }
}

/// Locate the first and last sample lying strictly on the data side of `nodata`.
///
/// Data means `value > nodata`, or `value < nodata` when `reverse_sign` is set.
/// NaN samples never count as data.
pub fn get_data_bounds<T: Float>(row: ArrayView1<T>, nodata: T, reverse_sign: bool) -> DataBounds {
    let is_data = |v: &T| {
        if reverse_sign {
            -*v > -nodata
        } else {
            *v > nodata
        }
    };

    let first = match row.iter().position(is_data) {
        Some(idx) => idx,
        None => return DataBounds::Empty,
    };
    let last = row.iter().rposition(is_data).unwrap_or(first);

    DataBounds::Span { first, last }
}

/// Move the bounds of a span inward by the given fractions of its width.
fn shrink_span(first: usize, last: usize, lprop: f64, rprop: f64, rule: ShrinkRule) -> DataBounds {
    let width = (last - first) as f64;
    let new_first = first + (width * lprop).floor() as usize;
    let right_width = match rule {
        ShrinkRule::Sequential => last.saturating_sub(new_first) as f64,
        ShrinkRule::Symmetric => width,
    };
    let cut = (right_width * rprop).floor() as usize;

    if cut > last || last - cut < new_first {
        return DataBounds::Empty;
    }
    DataBounds::Span {
        first: new_first,
        last: last - cut,
    }
}

/// Data mask of a scanline: 1.0 on the valid span, `nodataval` everywhere else.
///
/// `lprop`/`rprop` optionally pull the span inward by a fraction of its width
/// and must lie in [0, 1].
pub fn mask_row(row: ArrayView1<f64>, lprop: f64, rprop: f64, nodataval: f64) -> HyspexResult<Array1<f64>> {
    let masker = RowMasker::with_params(RowMaskParams {
        left_prop: lprop,
        right_prop: rprop,
        fill_value: nodataval,
        ..RowMaskParams::default()
    })?;
    Ok(masker.mask_row(row))
}

/// Overwrite the samples outside the shrunk valid span with `nodataval`.
///
/// A row without data is left untouched.
pub fn crop_row<'a>(
    mut row: ArrayViewMut1<'a, f64>,
    lprop: f64,
    rprop: f64,
    nodataval: f64,
) -> HyspexResult<ArrayViewMut1<'a, f64>> {
    let masker = RowMasker::with_params(RowMaskParams {
        left_prop: lprop,
        right_prop: rprop,
        fill_value: nodataval,
        ..RowMaskParams::default()
    })?;
    masker.crop_row(row.view_mut());
    Ok(row)
}

/// Scanline masker
pub struct RowMasker {
    params: RowMaskParams,
}

impl RowMasker {
    /// Create a masker keeping the full detected span
    pub fn new() -> Self {
        Self {
            params: RowMaskParams::default(),
        }
    }

    /// Create a masker with custom parameters
    pub fn with_params(params: RowMaskParams) -> HyspexResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &RowMaskParams {
        &self.params
    }

    /// Bounds of the kept span after applying the edge proportions
    pub fn bounds(&self, row: ArrayView1<f64>) -> DataBounds {
        match get_data_bounds(row, self.params.nodata_value, self.params.reverse_sign) {
            DataBounds::Span { first, last } => shrink_span(
                first,
                last,
                self.params.left_prop,
                self.params.right_prop,
                self.params.shrink_rule,
            ),
            DataBounds::Empty => DataBounds::Empty,
        }
    }

    pub fn mask_row(&self, row: ArrayView1<f64>) -> Array1<f64> {
        let mut out = Array1::from_elem(row.len(), self.params.fill_value);
        self.mask_row_into(row, out.view_mut());
        out
    }

    fn mask_row_into(&self, row: ArrayView1<f64>, mut out: ArrayViewMut1<f64>) {
        out.fill(self.params.fill_value);
        if let DataBounds::Span { first, last } = self.bounds(row) {
            out.slice_mut(ndarray::s![first..=last]).fill(1.0);
        }
    }

    /// In-place crop; rows without data are a no-op
    pub fn crop_row(&self, mut row: ArrayViewMut1<f64>) {
        let fill = self.params.fill_value;
        match get_data_bounds(row.view(), self.params.nodata_value, self.params.reverse_sign) {
            DataBounds::Span { first, last } => {
                let kept = shrink_span(
                    first,
                    last,
                    self.params.left_prop,
                    self.params.right_prop,
                    self.params.shrink_rule,
                );
                match kept {
                    DataBounds::Span { first, last } => {
                        let len = row.len();
                        row.slice_mut(ndarray::s![..first]).fill(fill);
                        row.slice_mut(ndarray::s![(last + 1).min(len)..]).fill(fill);
                    }
                    DataBounds::Empty => row.fill(fill),
                }
            }
            DataBounds::Empty => {}
        }
    }

    /// Mask every scanline of a band independently
    pub fn mask_band(&self, band: ArrayView2<f64>) -> Band {
        let mut mask = Array2::from_elem(band.dim(), self.params.fill_value);

        #[cfg(feature = "parallel")]
        {
            ndarray::Zip::from(mask.rows_mut())
                .and(band.rows())
                .par_for_each(|out, row| self.mask_row_into(row, out));
        }

        #[cfg(not(feature = "parallel"))]
        {
            ndarray::Zip::from(mask.rows_mut())
                .and(band.rows())
                .for_each(|out, row| self.mask_row_into(row, out));
        }

        mask
    }

    /// Crop every scanline of a band in place
    pub fn crop_band(&self, band: &mut Band) {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;

            let width = band.ncols();
            if width == 0 {
                return;
            }
            if let Some(data) = band.as_slice_mut() {
                data.par_chunks_mut(width)
                    .for_each(|row| self.crop_row(ArrayViewMut1::from(row)));
                return;
            }
        }

        for row in band.rows_mut() {
            self.crop_row(row);
        }
    }
}

impl Default for RowMasker {
    fn default() -> Self {
        Self::new()
    }
}

/// Combine per-source masks into an `i16` mask.
///
/// A pixel is 1 only where every source mask is exactly 1.0, and 0 otherwise,
/// whatever fill value the sources used. All masks must share one shape; the
/// first one sets the expected shape.
pub fn combine_masks(masks: &[(FlightlineSource, &Band)]) -> HyspexResult<MaskImage> {
    let (_, reference) = masks
        .first()
        .ok_or_else(|| HyspexError::Processing("No masks to combine".to_string()))?;
    let expected = reference.dim();

    for (source, mask) in masks {
        if mask.dim() != expected {
            return Err(HyspexError::ShapeMismatch {
                source_name: source.to_string(),
                expected,
                found: mask.dim(),
            });
        }
    }

    let mut combined = MaskImage::ones(expected);
    for (_, mask) in masks {
        combined.zip_mut_with(*mask, |out, m| {
            if *m != 1.0 {
                *out = 0;
            }
        });
    }

    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array1};

    #[test]
    fn test_data_bounds_basic() {
        let row = arr1(&[0.0, 0.0, 5.0, 7.0, 9.0, 0.0]);
        assert_eq!(
            get_data_bounds(row.view(), 0.0, false),
            DataBounds::Span { first: 2, last: 4 }
        );
    }

    #[test]
    fn test_data_bounds_all_nodata() {
        let row = arr1(&[0.0, 0.0, 0.0, 0.0]);
        assert!(get_data_bounds(row.view(), 0.0, false).is_empty());

        let empty: Array1<f64> = Array1::zeros(0);
        assert!(get_data_bounds(empty.view(), 0.0, false).is_empty());
    }

    #[test]
    fn test_data_bounds_reversed() {
        let row = arr1(&[10.0, 10.0, 2.0, 3.0, 10.0]);
        assert_eq!(
            get_data_bounds(row.view(), 10.0, true),
            DataBounds::Span { first: 2, last: 3 }
        );
    }

    #[test]
    fn test_data_bounds_single_sample_and_interior_gaps() {
        let row = arr1(&[0.0, 0.0, 4.0, 0.0]);
        assert_eq!(get_data_bounds(row.view(), 0.0, false).span(), Some((2, 2)));

        let row = arr1(&[3.0, 0.0, 0.0, 0.0, 8.0]);
        assert_eq!(get_data_bounds(row.view(), 0.0, false).span(), Some((0, 4)));
    }

    #[test]
    fn test_data_bounds_ignores_nan_and_negative() {
        let row = arr1(&[f64::NAN, -1.0, 2.0, f64::NAN]);
        assert_eq!(get_data_bounds(row.view(), 0.0, false).span(), Some((2, 2)));
    }

    #[test]
    fn test_data_bounds_endpoints_exceed_sentinel() {
        let row = arr1(&[0.0, -3.0, 1.0, 0.0, 2.5, 0.0, -1.0]);
        let (first, last) = get_data_bounds(row.view(), 0.0, false).span().unwrap();
        assert!(row[first] > 0.0);
        assert!(row[last] > 0.0);
        assert!(row.iter().take(first).all(|v| *v <= 0.0));
        assert!(row.iter().skip(last + 1).all(|v| *v <= 0.0));
    }

    #[test]
    fn test_mask_row_basic() {
        let row = arr1(&[0.0, 0.0, 5.0, 7.0, 9.0, 0.0]);
        let mask = mask_row(row.view(), 0.0, 0.0, 0.0).unwrap();
        assert_eq!(mask, arr1(&[0.0, 0.0, 1.0, 1.0, 1.0, 0.0]));
    }

    #[test]
    fn test_mask_row_empty_row() {
        let row = arr1(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(mask_row(row.view(), 0.0, 0.0, 0.0).unwrap(), arr1(&[0.0, 0.0, 0.0, 0.0]));
        assert_eq!(
            mask_row(row.view(), 0.0, 0.0, -9999.0).unwrap(),
            arr1(&[-9999.0, -9999.0, -9999.0, -9999.0])
        );
    }

    #[test]
    fn test_mask_row_fills_interior_gaps() {
        let row = arr1(&[0.0, 2.0, 0.0, 0.0, 3.0, 0.0]);
        let mask = mask_row(row.view(), 0.0, 0.0, 0.0).unwrap();
        assert_eq!(mask, arr1(&[0.0, 1.0, 1.0, 1.0, 1.0, 0.0]));
    }

    #[test]
    fn test_mask_row_idempotent() {
        let row = arr1(&[0.0, 4.0, 6.0, 0.0, 8.0, 0.0, 0.0]);
        let once = mask_row(row.view(), 0.0, 0.0, 0.0).unwrap();
        let twice = mask_row(once.view(), 0.0, 0.0, 0.0).unwrap();
        assert_eq!(once, twice);

        let ones = arr1(&[1.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(mask_row(ones.view(), 0.0, 0.0, 0.0).unwrap(), ones);
    }

    #[test]
    fn test_mask_row_with_proportions() {
        // span 0..=10, width 10
        let row = Array1::from_elem(11, 5.0);
        let mask = mask_row(row.view(), 0.2, 0.2, 0.0).unwrap();
        let expected: Vec<f64> = (0..11)
            .map(|i| if (2..=9).contains(&i) { 1.0 } else { 0.0 })
            .collect();
        // sequential rule: left moves to 2, right shrink uses width 8 -> 1
        assert_eq!(mask.to_vec(), expected);
    }

    #[test]
    fn test_symmetric_shrink_rule() {
        let params = RowMaskParams {
            left_prop: 0.2,
            right_prop: 0.2,
            shrink_rule: ShrinkRule::Symmetric,
            ..RowMaskParams::default()
        };
        let masker = RowMasker::with_params(params).unwrap();
        let row = Array1::from_elem(11, 5.0);
        assert_eq!(masker.bounds(row.view()).span(), Some((2, 8)));
    }

    #[test]
    fn test_shrink_past_each_other_is_empty() {
        let params = RowMaskParams {
            left_prop: 0.7,
            right_prop: 0.7,
            shrink_rule: ShrinkRule::Symmetric,
            ..RowMaskParams::default()
        };
        let masker = RowMasker::with_params(params).unwrap();
        let row = Array1::from_elem(11, 5.0);
        assert!(masker.bounds(row.view()).is_empty());
        assert_eq!(masker.mask_row(row.view()), Array1::<f64>::zeros(11));
    }

    #[test]
    fn test_invalid_proportions_rejected() {
        let params = RowMaskParams {
            left_prop: 1.5,
            ..RowMaskParams::default()
        };
        assert!(matches!(
            RowMasker::with_params(params),
            Err(HyspexError::InvalidParameter(_))
        ));

        let params = RowMaskParams {
            right_prop: f64::NAN,
            ..RowMaskParams::default()
        };
        assert!(RowMasker::with_params(params).is_err());
    }

    #[test]
    fn test_crop_row_default_proportions() {
        let mut row = arr1(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 0.0]);
        // span 1..=11, width 10: left cut 1 -> 2, remaining width 9: right cut 0
        crop_row(row.view_mut(), 0.1, 0.1, 0.0).unwrap();
        assert_eq!(
            row,
            arr1(&[0.0, 0.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 0.0])
        );
    }

    #[test]
    fn test_crop_row_symmetric_differs_from_sequential() {
        let params = RowMaskParams {
            shrink_rule: ShrinkRule::Symmetric,
            ..RowMaskParams::cropping()
        };
        let masker = RowMasker::with_params(params).unwrap();
        let mut row = arr1(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 0.0]);
        masker.crop_row(row.view_mut());
        assert_eq!(
            row,
            arr1(&[0.0, 0.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 0.0, 0.0])
        );
    }

    #[test]
    fn test_crop_row_without_data_is_noop() {
        let mut row = arr1(&[0.0, -1.0, 0.0]);
        crop_row(row.view_mut(), 0.1, 0.1, 0.0).unwrap();
        assert_eq!(row, arr1(&[0.0, -1.0, 0.0]));
    }

    #[test]
    fn test_crop_row_zero_props_keeps_span() {
        let mut row = arr1(&[-5.0, 3.0, 4.0, -2.0]);
        crop_row(row.view_mut(), 0.0, 0.0, 0.0).unwrap();
        assert_eq!(row, arr1(&[0.0, 3.0, 4.0, 0.0]));
    }

    #[test]
    fn test_mask_band_rows_independent() {
        let band = arr2(&[
            [0.0, 3.0, 3.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
            [2.0, 2.0, 2.0, 2.0],
        ]);
        let mask = RowMasker::new().mask_band(band.view());
        assert_eq!(
            mask,
            arr2(&[
                [0.0, 1.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 0.0],
                [1.0, 1.0, 1.0, 1.0],
            ])
        );
    }

    #[test]
    fn test_crop_band() {
        let mut band = arr2(&[[0.0, 3.0, 3.0, 0.0], [-1.0, 0.0, 0.0, 0.0]]);
        RowMasker::new().crop_band(&mut band);
        assert_eq!(band, arr2(&[[0.0, 3.0, 3.0, 0.0], [-1.0, 0.0, 0.0, 0.0]]));
    }

    #[test]
    fn test_combine_masks_and_semantics() {
        let a = arr2(&[[0.0, 1.0, 1.0, 1.0, 0.0]]);
        let b = arr2(&[[0.0, 1.0, 1.0, 0.0, 0.0]]);
        let c = Array2::<f64>::ones((1, 5));
        let d = Array2::<f64>::ones((1, 5));

        let composite = combine_masks(&[
            (FlightlineSource::VnirSample, &a),
            (FlightlineSource::SwirSample, &b),
            (FlightlineSource::VnirAltitude, &c),
            (FlightlineSource::SwirAltitude, &d),
        ])
        .unwrap();

        assert_eq!(composite, arr2(&[[0i16, 1, 1, 0, 0]]));
        for ((i, j), v) in composite.indexed_iter() {
            let all_valid = [&a, &b, &c, &d].iter().all(|m| m[[i, j]] != 0.0);
            assert_eq!(*v != 0, all_valid);
        }
    }

    #[test]
    fn test_combine_masks_shape_mismatch() {
        let a = Array2::<f64>::ones((2, 5));
        let b = Array2::<f64>::ones((2, 4));
        let err = combine_masks(&[
            (FlightlineSource::VnirSample, &a),
            (FlightlineSource::SwirSample, &b),
        ])
        .unwrap_err();

        match err {
            HyspexError::ShapeMismatch { source_name, expected, found } => {
                assert_eq!(source_name, "swir band");
                assert_eq!(expected, (2, 5));
                assert_eq!(found, (2, 4));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_out_of_range_proportions_rejected_by_free_functions() {
        let row = arr1(&[0.0, 5.0, 5.0, 5.0, 0.0]);
        assert!(matches!(
            mask_row(row.view(), -0.5, 0.0, 0.0),
            Err(HyspexError::InvalidParameter(_))
        ));
        assert!(mask_row(row.view(), f64::INFINITY, 0.0, 0.0).is_err());
        assert!(mask_row(row.view(), 0.0, f64::NAN, 0.0).is_err());

        let mut row = arr1(&[0.0, 5.0, 5.0, 5.0, 0.0]);
        assert!(crop_row(row.view_mut(), f64::INFINITY, 0.1, 0.0).is_err());
        assert!(crop_row(row.view_mut(), 0.1, -0.1, 0.0).is_err());
        // rejected calls leave the row untouched
        assert_eq!(row, arr1(&[0.0, 5.0, 5.0, 5.0, 0.0]));
    }

    #[test]
    fn test_crop_band_matches_row_by_row() {
        let masker = RowMasker::with_params(RowMaskParams::cropping()).unwrap();
        let original = arr2(&[
            [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0],
        ]);

        let mut band = original.clone();
        masker.crop_band(&mut band);

        let mut expected = original;
        for row in expected.rows_mut() {
            masker.crop_row(row);
        }
        assert_eq!(band, expected);
        assert_eq!(band[[0, 1]], 0.0);
        assert_eq!(band[[0, 2]], 2.0);
    }

    #[test]
    fn test_combine_masks_ignores_fill_value() {
        // masks built with fill -1: pixel 0 is invalid in the sample sources
        let a = arr2(&[[-1.0, 1.0, 1.0]]);
        let b = arr2(&[[-1.0, 1.0, 1.0]]);
        let c = Array2::<f64>::ones((1, 3));
        let d = Array2::<f64>::ones((1, 3));

        let composite = combine_masks(&[
            (FlightlineSource::VnirSample, &a),
            (FlightlineSource::SwirSample, &b),
            (FlightlineSource::VnirAltitude, &c),
            (FlightlineSource::SwirAltitude, &d),
        ])
        .unwrap();
        assert_eq!(composite, arr2(&[[0i16, 1, 1]]));

        let huge = arr2(&[[-40000.0, 1.0, -40000.0]]);
        let composite = combine_masks(&[(FlightlineSource::VnirSample, &huge)]).unwrap();
        assert_eq!(composite, arr2(&[[0i16, 1, 0]]));
    }

    #[test]
    fn test_combine_no_masks() {
        assert!(combine_masks(&[]).is_err());
    }
}
