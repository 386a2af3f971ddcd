use crate::types::{HyspexError, HyspexResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

const NAV_COLUMNS: usize = 8;

/// One record of a HySpex navigation file (one per scanline)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavRecord {
    pub scanline: f64,
    pub longitude: f64,
    pub latitude: f64,
    /// Altitude above the ellipsoid in meters
    pub altitude: f64,
    pub roll: f64,
    pub pitch: f64,
    /// Heading in degrees
    pub heading: f64,
    /// GPS time in seconds
    pub gps_time: f64,
}

/// HySpex navigation file reader
pub struct NavigationReader;

impl NavigationReader {
    pub fn read_file<P: AsRef<Path>>(path: P) -> HyspexResult<Vec<NavRecord>> {
        log::info!("Reading navigation file: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        let records = Self::parse(&text)?;
        log::debug!("Read {} navigation records", records.len());
        Ok(records)
    }

    /// Parse whitespace-separated navigation rows.
    ///
    /// Comment lines and lines that do not start with a number (column
    /// headers) are skipped.
    pub fn parse(text: &str) -> HyspexResult<Vec<NavRecord>> {
        let mut records = Vec::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(&['#', ';', '%'][..]) {
                continue;
            }

            let mut fields = line.split_whitespace().peekable();
            let numeric_row = fields
                .peek()
                .map(|first| first.parse::<f64>().is_ok())
                .unwrap_or(false);
            if !numeric_row {
                continue;
            }

            let values = fields
                .map(|field| {
                    field.parse::<f64>().map_err(|e| {
                        HyspexError::InvalidFormat(format!(
                            "Navigation line {}: bad value '{}': {}",
                            line_no + 1,
                            field,
                            e
                        ))
                    })
                })
                .collect::<HyspexResult<Vec<f64>>>()?;

            if values.len() < NAV_COLUMNS {
                return Err(HyspexError::InvalidFormat(format!(
                    "Navigation line {}: expected {} columns, found {}",
                    line_no + 1,
                    NAV_COLUMNS,
                    values.len()
                )));
            }

            records.push(NavRecord {
                scanline: values[0],
                longitude: values[1],
                latitude: values[2],
                altitude: values[3],
                roll: values[4],
                pitch: values[5],
                heading: values[6],
                gps_time: values[7],
            });
        }

        if records.is_empty() {
            return Err(HyspexError::InvalidFormat(
                "Navigation file contains no records".to_string(),
            ));
        }

        Ok(records)
    }
}
