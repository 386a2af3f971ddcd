//! Flight and solar geometry summary for ATCOR processing of a flightline.

use crate::io::envi_header::{EnviHeader, REPORT_TIME_FORMAT};
use crate::io::navigation::{NavRecord, NavigationReader};
use crate::types::{HyspexError, HyspexResult};
use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SECONDS_PER_DAY: i64 = 86_400;

/// Average of angles in degrees, in [0, 360). NaN for an empty slice.
pub fn avg_angle(angles: &[f64]) -> f64 {
    if angles.is_empty() {
        return f64::NAN;
    }
    let n = angles.len() as f64;
    let sin_mean = angles.iter().map(|a| a.to_radians().sin()).sum::<f64>() / n;
    let cos_mean = angles.iter().map(|a| a.to_radians().cos()).sum::<f64>() / n;
    (sin_mean.atan2(cos_mean).to_degrees() + 360.0) % 360.0
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Replace the time of day of the header timestamp with the GPS time of day.
///
/// If the header time is later in the day than the GPS time the flightline
/// crossed midnight and the date moves forward one day.
pub fn center_time(header_time: DateTime<Utc>, gps_seconds: f64) -> DateTime<Utc> {
    let time_of_day = (gps_seconds.round() as i64).rem_euclid(SECONDS_PER_DAY);
    let midnight = header_time.date_naive().and_time(chrono::NaiveTime::default());
    let mut center = Utc.from_utc_datetime(&midnight) + Duration::seconds(time_of_day);

    if header_time.hour() > center.hour() {
        center = center + Duration::days(1);
    }
    center
}

/// Sun zenith and azimuth (clockwise from north) in degrees
pub fn solar_angles(time: DateTime<Utc>, latitude: f64, longitude: f64) -> HyspexResult<(f64, f64)> {
    let position = spa::calc_solar_position(time, latitude, longitude)
        .map_err(|e| HyspexError::Solar(format!("{:?} at {} ({}, {})", e, time, latitude, longitude)))?;
    Ok((position.zenith_angle, position.azimuth))
}

/// Flight parameters of one flightline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightData {
    pub header_time: DateTime<Utc>,
    pub gps_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub height_km: f64,
    pub heading_deg: f64,
    pub sun_zenith_deg: f64,
    pub sun_azimuth_deg: f64,
}

impl FlightData {
    /// Derive flight data from navigation records and the header acquisition time
    pub fn from_records(records: &[NavRecord], header_time: DateTime<Utc>) -> HyspexResult<Self> {
        if records.is_empty() {
            return Err(HyspexError::Processing("No navigation records".to_string()));
        }

        let center = &records[records.len() / 2];
        log::debug!("Centre record: {:?}", center);

        let mean_altitude = records.iter().map(|r| r.altitude).sum::<f64>() / records.len() as f64;
        let headings: Vec<f64> = records.iter().map(|r| r.heading).collect();

        let gps_time = center_time(header_time, center.gps_time);
        let (zenith, azimuth) = solar_angles(gps_time, center.latitude, center.longitude)?;

        Ok(Self {
            header_time,
            gps_time,
            latitude: center.latitude,
            longitude: center.longitude,
            height_km: round_to(mean_altitude / 1000.0, 3),
            heading_deg: round_to(avg_angle(&headings), 2),
            sun_zenith_deg: round_to(zenith, 2),
            sun_azimuth_deg: round_to(azimuth, 2),
        })
    }

    /// Text report in the layout expected by the ATCOR operators
    pub fn report(&self, flightline: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "# data for ATCOR processing of flight line: {}_rad_f32_geo.bsq \n",
            flightline
        ));
        out.push_str("############ \n");
        out.push_str("basic data:\n");
        out.push_str(&format!(
            "ENVI header acquisition time      : {}\n",
            self.header_time.format(REPORT_TIME_FORMAT)
        ));
        out.push_str(&format!(
            "GPS acquisition time (UTC)        : {}\n",
            self.gps_time.format(REPORT_TIME_FORMAT)
        ));
        out.push('\n');
        out.push_str(&format!("Avg. lat: {}\n", self.latitude));
        out.push_str(&format!("Avg. lon: {}\n", self.longitude));
        out.push_str("\n\n");
        out.push_str(&format!("average flight height (km)   : {} \n", self.height_km));
        out.push_str(&format!("average heading (deg)        : {} \n", self.heading_deg));
        out.push_str(&format!("sun zenith angle (SZA) (deg) : {} \n", self.sun_zenith_deg));
        out.push_str(&format!("sun azimuth angle (SAA) (deg): {} \n", self.sun_azimuth_deg));
        out
    }
}

/// Where to find the header and where to put the report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightDataParams {
    /// Radiance ENVI header; defaults to `<nav dir>/../RAD/<name>_rad_bsq_float32.hdr`
    pub header_path: Option<PathBuf>,
    /// Report path; defaults to `<nav dir>/<name>_rad_f32_geo_flightdata.txt`
    pub output_path: Option<PathBuf>,
}

/// Extracts ATCOR flight data from a navigation file
pub struct FlightDataExtractor {
    params: FlightDataParams,
}

impl FlightDataExtractor {
    pub fn new() -> Self {
        Self {
            params: FlightDataParams::default(),
        }
    }

    pub fn with_params(params: FlightDataParams) -> Self {
        Self { params }
    }

    fn flightline_name(nav_path: &Path) -> HyspexResult<String> {
        nav_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| HyspexError::InvalidParameter(format!("No file name in {}", nav_path.display())))
    }

    pub fn header_path(&self, nav_path: &Path) -> HyspexResult<PathBuf> {
        if let Some(path) = &self.params.header_path {
            return Ok(path.clone());
        }
        let name = Self::flightline_name(nav_path)?;
        let nav_dir = nav_path.parent().unwrap_or_else(|| Path::new("."));
        Ok(nav_dir
            .join("..")
            .join("RAD")
            .join(format!("{}_rad_bsq_float32.hdr", name)))
    }

    pub fn output_path(&self, nav_path: &Path) -> HyspexResult<PathBuf> {
        if let Some(path) = &self.params.output_path {
            return Ok(path.clone());
        }
        let name = Self::flightline_name(nav_path)?;
        Ok(nav_path.with_file_name(format!("{}_rad_f32_geo_flightdata.txt", name)))
    }

    /// Compute the flight data and write the report; returns the data and report path
    pub fn extract<P: AsRef<Path>>(&self, nav_path: P) -> HyspexResult<(FlightData, PathBuf)> {
        let nav_path = nav_path.as_ref();
        let name = Self::flightline_name(nav_path)?;

        let records = NavigationReader::read_file(nav_path)?;
        let header = EnviHeader::from_file(self.header_path(nav_path)?)?;
        let data = FlightData::from_records(&records, header.acquisition_datetime()?)?;

        let output = self.output_path(nav_path)?;
        std::fs::write(&output, data.report(&name))?;
        log::info!("Flight data written to {}", output.display());

        Ok((data, output))
    }
}

impl Default for FlightDataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(altitude: f64, heading: f64, gps_time: f64) -> NavRecord {
        NavRecord {
            scanline: 0.0,
            longitude: -147.72,
            latitude: 64.86,
            altitude,
            roll: 0.0,
            pitch: 0.0,
            heading,
            gps_time,
        }
    }

    fn angular_distance(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d)
    }

    #[test]
    fn test_avg_angle_wraps_north() {
        assert!(angular_distance(avg_angle(&[350.0, 10.0]), 0.0) < 1e-9);
        assert_relative_eq!(avg_angle(&[80.0, 100.0]), 90.0, epsilon = 1e-9);
        assert_relative_eq!(avg_angle(&[-90.0]), 270.0, epsilon = 1e-9);
        assert!(avg_angle(&[]).is_nan());
    }

    #[test]
    fn test_center_time_same_day() {
        let header = Utc.with_ymd_and_hms(2020, 7, 10, 21, 40, 0).unwrap();
        // 2 days + 21:45:12.4
        let gps = 2.0 * 86400.0 + 21.0 * 3600.0 + 45.0 * 60.0 + 12.4;
        assert_eq!(center_time(header, gps), Utc.with_ymd_and_hms(2020, 7, 10, 21, 45, 12).unwrap());
    }

    #[test]
    fn test_center_time_crosses_midnight() {
        let header = Utc.with_ymd_and_hms(2020, 7, 10, 23, 59, 0).unwrap();
        let gps = 3.0 * 86400.0 + 65.0;
        assert_eq!(center_time(header, gps), Utc.with_ymd_and_hms(2020, 7, 11, 0, 1, 5).unwrap());
    }

    #[test]
    fn test_center_time_rounds_up_to_next_minute() {
        let header = Utc.with_ymd_and_hms(2020, 7, 10, 20, 0, 0).unwrap();
        let gps = 20.0 * 3600.0 + 59.6;
        assert_eq!(center_time(header, gps), Utc.with_ymd_and_hms(2020, 7, 10, 20, 1, 0).unwrap());
    }

    #[test]
    fn test_solar_angles_fairbanks_midday() {
        let time = Utc.with_ymd_and_hms(2020, 7, 10, 21, 45, 0).unwrap();
        let (zenith, azimuth) = solar_angles(time, 64.85, -147.7).unwrap();
        assert!(zenith > 40.0 && zenith < 47.0, "zenith {}", zenith);
        assert!(azimuth > 160.0 && azimuth < 190.0, "azimuth {}", azimuth);
    }

    #[test]
    fn test_flight_data_from_records() {
        let t = 21.0 * 3600.0 + 45.0 * 60.0;
        let records = vec![
            record(1500.0, 358.0, t - 10.0),
            record(1510.0, 2.0, t),
            record(1526.0, 0.0, t + 10.0),
        ];
        let header = Utc.with_ymd_and_hms(2020, 7, 10, 21, 44, 0).unwrap();
        let data = FlightData::from_records(&records, header).unwrap();

        assert_eq!(data.gps_time, Utc.with_ymd_and_hms(2020, 7, 10, 21, 45, 0).unwrap());
        assert_relative_eq!(data.height_km, 1.512);
        assert!(angular_distance(data.heading_deg, 0.0) < 0.01);
        assert_eq!(data.latitude, 64.86);

        let report = data.report("20200710-CPC_01");
        assert!(report.starts_with("# data for ATCOR processing of flight line: 20200710-CPC_01_rad_f32_geo.bsq"));
        assert!(report.contains("GPS acquisition time (UTC)        : 2020-07-10T21:45:00.0Z"));
        assert!(report.contains("average flight height (km)   : 1.512 \n"));
    }

    #[test]
    fn test_flight_data_no_records() {
        let header = Utc.with_ymd_and_hms(2020, 7, 10, 21, 44, 0).unwrap();
        assert!(FlightData::from_records(&[], header).is_err());
    }

    #[test]
    fn test_default_paths() {
        let extractor = FlightDataExtractor::new();
        let nav = Path::new("/campaign/NAV/20200710-CPC_01.txt");
        assert_eq!(
            extractor.header_path(nav).unwrap(),
            PathBuf::from("/campaign/NAV/../RAD/20200710-CPC_01_rad_bsq_float32.hdr")
        );
        assert_eq!(
            extractor.output_path(nav).unwrap(),
            PathBuf::from("/campaign/NAV/20200710-CPC_01_rad_f32_geo_flightdata.txt")
        );
    }
}
