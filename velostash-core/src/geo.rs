//! Coordinate validation and region summaries for GPS tracks.
//!
//! A region summary is the location/time tag attached to a result: the mean
//! position of the valid fixes inside a trimmed slice and a timestamp anchored
//! to the slice itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegionError;
use crate::types::WeatherLocation;

/// Decimal places kept on summarized coordinates (~0.1 m).
const COORDINATE_DECIMALS: i32 = 6;

/// A GPS coordinate with latitude and longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point is a plausible fix. See [`is_plausible_fix`].
    pub fn is_valid(&self) -> bool {
        is_plausible_fix(self.latitude, self.longitude)
    }
}

/// Is `(lat, lon)` something a GPS receiver could have reported?
///
/// Rejects NaN/infinite values, out-of-range degrees and the `(0, 0)` pair
/// devices emit before they have a fix.
pub fn is_plausible_fix(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && !(latitude == 0.0 && longitude == 0.0)
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

fn is_valid_timestamp(ts: f64) -> bool {
    !ts.is_nan() && ts > 0.0
}

/// Averaged position/time descriptor for a trimmed slice of a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSummary {
    pub latitude: f64,
    pub longitude: f64,
    /// Mean of the slice's first and last timestamps, in Unix milliseconds.
    pub timestamp_ms: f64,
    pub valid_samples: usize,
    pub start_index: usize,
    pub end_index: usize,
}

impl RegionSummary {
    /// Representative time as a UTC instant, if it is representable.
    #[allow(clippy::cast_possible_truncation)]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        if !self.timestamp_ms.is_finite() {
            return None;
        }
        DateTime::from_timestamp_millis(self.timestamp_ms.round() as i64)
    }

    pub fn location(&self) -> WeatherLocation {
        WeatherLocation {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Summarize the inclusive slice `[start, end]` of a track.
///
/// `positions[i]` is `None` where the recording has no fix. Samples count
/// toward the average only when both the fix and the timestamp are valid.
/// The representative timestamp ignores validity on purpose: it always
/// anchors to the requested window.
pub fn summarize(
    positions: &[Option<GpsPoint>],
    timestamps: &[f64],
    start: usize,
    end: usize,
) -> Result<RegionSummary, RegionError> {
    let len = positions.len().min(timestamps.len());
    if end >= len {
        return Err(RegionError::OutOfRange {
            start: i64::try_from(start).unwrap_or(i64::MAX),
            end: i64::try_from(end).unwrap_or(i64::MAX),
            len,
        });
    }
    if start >= end {
        return Err(RegionError::EmptyOrInverted { start, end });
    }

    let mut lat_sum = 0.0;
    let mut lon_sum = 0.0;
    let mut count = 0usize;
    for (position, ts) in positions[start..=end].iter().zip(&timestamps[start..=end]) {
        let Some(point) = position else { continue };
        if point.is_valid() && is_valid_timestamp(*ts) {
            lat_sum += point.latitude;
            lon_sum += point.longitude;
            count += 1;
        }
    }

    if count == 0 {
        return Err(RegionError::NoValidPositions { start, end });
    }

    #[allow(clippy::cast_precision_loss)]
    let n = count as f64;
    Ok(RegionSummary {
        latitude: round_coordinate(lat_sum / n),
        longitude: round_coordinate(lon_sum / n),
        timestamp_ms: (timestamps[start] + timestamps[end]) / 2.0,
        valid_samples: count,
        start_index: start,
        end_index: end,
    })
}

/// Signed-index entry point for callers holding raw user input.
///
/// Negative indices are reported as out of range.
pub fn summarize_signed(
    positions: &[Option<GpsPoint>],
    timestamps: &[f64],
    start: i64,
    end: i64,
) -> Result<RegionSummary, RegionError> {
    let (Ok(start_idx), Ok(end_idx)) = (usize::try_from(start), usize::try_from(end)) else {
        return Err(RegionError::OutOfRange {
            start,
            end,
            len: positions.len().min(timestamps.len()),
        });
    };
    summarize(positions, timestamps, start_idx, end_idx)
}

fn round_coordinate(value: f64) -> f64 {
    let scale = 10f64.powi(COORDINATE_DECIMALS);
    (value * scale).round() / scale
}
