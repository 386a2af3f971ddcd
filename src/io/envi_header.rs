use crate::types::{HyspexError, HyspexResult};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::path::Path;

/// Timestamp layout used in HySpex processing reports
pub const REPORT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.0Z";

/// Time zone of the local timestamps written by the acquisition software
pub const ACQUISITION_TIMEZONE: Tz = chrono_tz::America::Anchorage;

/// Band count of a merged VNIR + SWIR supercube
const SUPERCUBE_BANDS: usize = 457;
const VNIR_BANDS: usize = 170;
const SWIR_BANDS: usize = 288;

/// Parsed ENVI header (`.hdr`) key/value pairs
#[derive(Debug, Clone, Default)]
pub struct EnviHeader {
    entries: HashMap<String, String>,
}

impl EnviHeader {
    /// Parse header text. The first line holds the `ENVI` magic and is skipped.
    ///
    /// A key seen twice gets the new value appended after a space; a line
    /// without `=` continues the previous key.
    pub fn parse(text: &str) -> HyspexResult<Self> {
        let mut entries: HashMap<String, String> = HashMap::new();
        let mut last_key: Option<String> = None;

        for line in text.lines().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match line.split_once('=') {
                Some((key, value)) => {
                    let key = key.trim().to_string();
                    let value = value.trim();
                    entries
                        .entry(key.clone())
                        .and_modify(|existing| {
                            existing.push(' ');
                            existing.push_str(value);
                        })
                        .or_insert_with(|| value.to_string());
                    last_key = Some(key);
                }
                None => {
                    let key = last_key.as_ref().ok_or_else(|| {
                        HyspexError::InvalidFormat(format!(
                            "Header continuation line before any key: '{}'",
                            line
                        ))
                    })?;
                    if let Some(existing) = entries.get_mut(key) {
                        existing.push(' ');
                        existing.push_str(line);
                    }
                }
            }
        }

        Ok(Self { entries })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> HyspexResult<Self> {
        log::debug!("Reading ENVI header: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn require(&self, key: &str) -> HyspexResult<&str> {
        self.get(key)
            .ok_or_else(|| HyspexError::Metadata(format!("Header has no '{}' entry", key)))
    }

    /// Band centre wavelengths from the `wavelength = { ... }` entry
    pub fn wavelengths(&self) -> HyspexResult<Vec<f64>> {
        parse_list(self.require("wavelength")?)
            .into_iter()
            .map(|item| {
                item.parse::<f64>().map_err(|e| {
                    HyspexError::InvalidFormat(format!("Bad wavelength '{}': {}", item, e))
                })
            })
            .collect()
    }

    /// Acquisition date and start time, interpreted as UTC
    pub fn acquisition_datetime(&self) -> HyspexResult<DateTime<Utc>> {
        let date_str = self.require("acquisition date")?;
        let time_str = self
            .get("acquisition start time")
            .or_else(|| self.get("acquisition time"))
            .ok_or_else(|| HyspexError::Metadata("Header has no acquisition time".to_string()))?;

        let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
            .map_err(|e| HyspexError::Metadata(format!("Bad acquisition date '{}': {}", date_str, e)))?;

        // fractional seconds are not used downstream
        let whole_seconds = time_str.trim().split('.').next().unwrap_or_default();
        let time = NaiveTime::parse_from_str(whole_seconds, "%H:%M:%S")
            .map_err(|e| HyspexError::Metadata(format!("Bad acquisition time '{}': {}", time_str, e)))?;

        Ok(Utc.from_utc_datetime(&NaiveDateTime::new(date, time)))
    }
}

/// Split an ENVI `{a, b, c}` list into trimmed items
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// ENVI `band names` value for a cube with `bands` bands.
///
/// Merged supercubes label the VNIR part and the SWIR part separately; the
/// first SWIR band overlaps the last VNIR band and is dropped.
pub fn band_names(bands: usize) -> String {
    let names: Vec<String> = if bands == SUPERCUBE_BANDS {
        (1..=VNIR_BANDS)
            .map(|i| format!("Band {} (VNIR Band {})", i, i))
            .chain((2..=SWIR_BANDS).map(|i| format!("Band {} (SWIR Band {})", i + VNIR_BANDS - 1, i)))
            .collect()
    } else {
        (1..=bands).map(|i| format!("Band {}", i)).collect()
    };
    format!("{{ {} }}", names.join(", "))
}

/// Convert a local report timestamp in `tz` to a UTC report timestamp.
///
/// Wall times repeated when daylight saving ends resolve to standard time.
/// Wall times skipped when it starts are read as standard time too, so they
/// land one hour later on the daylight clock.
pub fn local_timestamp_to_utc(timestamp: &str, tz: Tz) -> HyspexResult<String> {
    let naive = NaiveDateTime::parse_from_str(timestamp.trim(), REPORT_TIME_FORMAT)
        .map_err(|e| HyspexError::Metadata(format!("Bad timestamp '{}': {}", timestamp, e)))?;

    let local = match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(_, standard) => {
            log::debug!("{} is ambiguous in {}, using standard time", timestamp, tz);
            standard
        }
        LocalResult::None => {
            log::debug!("{} does not exist in {}, reading it as standard time", timestamp, tz);
            tz.from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
                .ok_or_else(|| {
                    HyspexError::Metadata(format!("Local time '{}' does not exist in {}", timestamp, tz))
                })?
        }
    };

    Ok(local.with_timezone(&Utc).format(REPORT_TIME_FORMAT).to_string())
}
