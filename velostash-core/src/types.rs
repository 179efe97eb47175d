use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Analysis parameters ───────────────────────────────────────────

/// Unit attached to manually entered wind speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WindUnit {
    #[default]
    #[serde(rename = "m/s")]
    MetersPerSecond,
    #[serde(rename = "km/h")]
    KilometersPerHour,
    #[serde(rename = "mph")]
    MilesPerHour,
}

impl WindUnit {
    /// Convert a speed expressed in this unit to meters per second.
    pub fn to_mps(self, speed: f64) -> f64 {
        match self {
            Self::MetersPerSecond => speed,
            Self::KilometersPerHour => speed / 3.6,
            Self::MilesPerHour => speed * 0.447_04,
        }
    }
}

/// How laps are derived from the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LapDetectionMode {
    /// Use the lap markers recorded in the source file.
    #[default]
    FileLaps,
    /// Split on repeated passes through the start position.
    Auto,
    /// Treat the whole recording as one lap.
    Off,
}

/// Where the atmospheric inputs of a parameter set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherSource {
    #[default]
    Manual,
    WeatherApi,
    WeatherCache,
}

/// Whether a weather reading was fetched live or served from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOrigin {
    Api,
    Cache,
}

/// Position a weather reading was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Atmospheric reading attached to a parameter set by the weather lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReading {
    /// Air temperature in °C.
    pub temperature: f64,
    /// Dew point in °C.
    pub dew_point: f64,
    /// Station pressure in hPa.
    pub pressure: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<f64>,
    pub location: WeatherLocation,
    /// Time the reading applies to.
    pub timestamp: DateTime<Utc>,
    pub origin: FetchOrigin,
}

/// Provenance of the atmospheric inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WeatherProvenance {
    pub source: WeatherSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<WeatherReading>,
}

/// Settings the user chose for analyzing one recording.
///
/// The store treats this as an opaque document; it only needs to round-trip.
/// Every field has a default so documents written by older releases load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParameterSet {
    /// Rider + bike mass in kg.
    pub system_mass: f64,
    /// Air density in kg/m³.
    pub rho: f64,
    /// Drivetrain efficiency (0-1).
    pub eta: f64,
    pub cda_min: f64,
    pub cda_max: f64,
    pub crr_min: f64,
    pub crr_max: f64,
    /// Fixed CdA; `None` means the optimizer fits it.
    pub fixed_cda: Option<f64>,
    /// Fixed Crr; `None` means the optimizer fits it.
    pub fixed_crr: Option<f64>,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub wind_unit: WindUnit,
    pub lap_detection: LapDetectionMode,
    pub trim_start: Option<u32>,
    pub trim_end: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherProvenance>,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            system_mass: 80.0,
            rho: 1.225,
            eta: 0.97,
            cda_min: 0.15,
            cda_max: 0.50,
            crr_min: 0.002,
            crr_max: 0.010,
            fixed_cda: None,
            fixed_crr: None,
            wind_speed: 0.0,
            wind_direction: 0.0,
            wind_unit: WindUnit::MetersPerSecond,
            lap_detection: LapDetectionMode::FileLaps,
            trim_start: None,
            trim_end: None,
            weather: None,
        }
    }
}

/// One row of the parameter collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileParameterRecord {
    #[serde(alias = "fileId")]
    pub fingerprint: String,
    pub parameters: ParameterSet,
    /// Unix milliseconds of the last save.
    pub last_used_at: i64,
    #[serde(default)]
    pub source_name: String,
}

// ── Analysis results ──────────────────────────────────────────────

/// Separator between lap numbers inside a [`LapKey`].
pub const LAP_SEPARATOR: char = '-';

/// String identity of a selected lap subset.
///
/// `"all"` when nothing is selected, otherwise the lap numbers ascending and
/// deduplicated, joined with [`LAP_SEPARATOR`]. Decoding goes through
/// [`LapKey::parse`], so stored and user-supplied keys share one form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct LapKey(String);

/// A lap key that is neither `"all"` nor a list of lap numbers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid lap key '{0}': expected \"all\" or lap numbers joined by '-'")]
pub struct InvalidLapKey(pub String);

impl LapKey {
    pub const ALL: &'static str = "all";

    pub fn all() -> Self {
        Self(Self::ALL.to_string())
    }

    /// Build the key for a lap selection in any order.
    pub fn from_laps(laps: &[u32]) -> Self {
        if laps.is_empty() {
            return Self::all();
        }
        let mut sorted = laps.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let joined = sorted
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(&LAP_SEPARATOR.to_string());
        Self(joined)
    }

    /// Normalize a textual key: blank or `"all"` selects every lap, anything
    /// else must be lap numbers in any order.
    pub fn parse(raw: &str) -> Result<Self, InvalidLapKey> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(Self::ALL) {
            return Ok(Self::all());
        }
        let laps = trimmed
            .split(LAP_SEPARATOR)
            .map(|part| part.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| InvalidLapKey(raw.to_string()))?;
        Ok(Self::from_laps(&laps))
    }

    pub fn is_all(&self) -> bool {
        self.0 == Self::ALL
    }

    /// Lap numbers encoded in the key; empty for `"all"`.
    pub fn laps(&self) -> Vec<u32> {
        if self.is_all() {
            return Vec::new();
        }
        self.0
            .split(LAP_SEPARATOR)
            .filter_map(|part| part.parse().ok())
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LapKey {
    fn default() -> Self {
        Self::all()
    }
}

impl std::fmt::Display for LapKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

impl std::str::FromStr for LapKey {
    type Err = InvalidLapKey;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl TryFrom<String> for LapKey {
    type Error = InvalidLapKey;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<LapKey> for String {
    fn from(key: LapKey) -> Self {
        key.0
    }
}

/// Classification of the wind input an analysis used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindSource {
    /// Still air assumed.
    #[default]
    None,
    /// Constant wind entered by the user.
    Manual,
    /// Wind taken from a weather reading.
    Weather,
    /// Measured by an air-speed sensor in the recording.
    AirSpeed,
    /// Written by a newer release with a classification this one doesn't know.
    #[serde(other)]
    Unknown,
}

impl WindSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Manual => "manual",
            Self::Weather => "weather",
            Self::AirSpeed => "air_speed",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for WindSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Identity of an analysis result.
///
/// Saving a second result under an equal key replaces the first; `notes` is
/// how a user keeps several results for the same laps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultKey {
    pub source_name: String,
    pub lap_key: LapKey,
    pub notes: String,
}

impl ResultKey {
    pub fn new(source_name: impl Into<String>, lap_key: LapKey, notes: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            lap_key,
            notes: notes.into(),
        }
    }
}

/// A fitted analysis result, as persisted in the result collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResultRecord {
    pub source_name: String,
    #[serde(default)]
    pub lap_key: LapKey,
    #[serde(default)]
    pub notes: String,
    pub trim_start: u32,
    pub trim_end: u32,
    pub cda: f64,
    pub crr: f64,
    #[serde(default)]
    pub wind_source: WindSource,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub wind_direction: Option<f64>,
    pub system_mass: f64,
    pub rho: f64,
    pub eta: f64,
    #[serde(default)]
    pub r2: Option<f64>,
    #[serde(default)]
    pub rmse: Option<f64>,
    /// Elevation gain of the virtual-elevation profile in m.
    #[serde(default)]
    pub ve_gain: Option<f64>,
    /// Elevation gain recorded by the device in m.
    #[serde(default)]
    pub actual_gain: Option<f64>,
    #[serde(default)]
    pub avg_power: Option<f64>,
    #[serde(default)]
    pub avg_speed: Option<f64>,
    #[serde(default)]
    pub avg_temperature: Option<f64>,
    /// `yyyy-mm-dd` of the recording; empty for results saved before it was tracked.
    #[serde(default)]
    pub recording_date: String,
    /// Store-write time; [`crate::store::ResultStore::save_result`] overwrites it.
    #[serde(default = "Utc::now")]
    pub saved_at: DateTime<Utc>,
}

impl AnalysisResultRecord {
    pub fn key(&self) -> ResultKey {
        ResultKey::new(
            self.source_name.clone(),
            self.lap_key.clone(),
            self.notes.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lap_key_all_when_empty() {
        assert_eq!(LapKey::from_laps(&[]).as_str(), "all");
        assert!(LapKey::from_laps(&[]).is_all());
        assert!(LapKey::from_laps(&[]).laps().is_empty());
    }

    #[test]
    fn lap_key_sorts_and_dedups() {
        let key = LapKey::from_laps(&[3, 1, 2, 3]);
        assert_eq!(key.as_str(), "1-2-3");
        assert_eq!(key.laps(), vec![1, 2, 3]);
    }

    #[test]
    fn lap_key_from_blank_string_is_all() {
        assert!(LapKey::parse("  ").unwrap().is_all());
        assert!(LapKey::parse("ALL").unwrap().is_all());
        assert_eq!("2-4".parse::<LapKey>().unwrap().laps(), vec![2, 4]);
    }

    #[test]
    fn lap_key_text_is_normalized() {
        assert_eq!(LapKey::parse("3-1").unwrap(), LapKey::from_laps(&[1, 3]));
        assert_eq!(LapKey::parse(" 2 - 2-1 ").unwrap().as_str(), "1-2");
        assert!(matches!(LapKey::parse("1-x"), Err(InvalidLapKey(raw)) if raw == "1-x"));
        assert!(LapKey::parse("1--2").is_err());
    }

    #[test]
    fn lap_key_decodes_to_one_identity() {
        let decode = |raw: &str| serde_json::from_value::<LapKey>(serde_json::json!(raw)).unwrap();
        assert_eq!(decode("3-1"), decode("1-3"));
        assert_eq!(decode("3-1").as_str(), "1-3");
        assert_eq!(decode(""), LapKey::all());
        assert_eq!(decode("all"), LapKey::all());
        assert!(serde_json::from_value::<LapKey>(serde_json::json!("lap one")).is_err());
        assert_eq!(serde_json::to_value(decode("2-1")).unwrap(), serde_json::json!("1-2"));
    }

    #[test]
    fn wind_unit_conversion() {
        assert!((WindUnit::KilometersPerHour.to_mps(36.0) - 10.0).abs() < 1e-9);
        assert!((WindUnit::MilesPerHour.to_mps(10.0) - 4.4704).abs() < 1e-9);
        assert!((WindUnit::MetersPerSecond.to_mps(3.0) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parameter_set_fills_missing_fields() {
        let params: ParameterSet =
            serde_json::from_str(r#"{"systemMass": 72.5, "windUnit": "km/h"}"#).unwrap();
        assert!((params.system_mass - 72.5).abs() < f64::EPSILON);
        assert_eq!(params.wind_unit, WindUnit::KilometersPerHour);
        assert!((params.rho - 1.225).abs() < f64::EPSILON);
        assert_eq!(params.lap_detection, LapDetectionMode::FileLaps);
        assert!(params.weather.is_none());
    }

    #[test]
    fn weather_provenance_tags() {
        let json = serde_json::json!({
            "source": "weather_cache",
            "reading": {
                "temperature": 18.5,
                "dewPoint": 9.0,
                "pressure": 1013.2,
                "location": { "latitude": 52.1, "longitude": 4.3 },
                "timestamp": "2024-05-01T08:00:00Z",
                "origin": "cache"
            }
        });
        let provenance: WeatherProvenance = serde_json::from_value(json).unwrap();
        assert_eq!(provenance.source, WeatherSource::WeatherCache);
        let reading = provenance.reading.unwrap();
        assert_eq!(reading.origin, FetchOrigin::Cache);
        assert!(reading.wind_speed.is_none());
    }

    #[test]
    fn unknown_wind_source_is_tolerated() {
        let source: WindSource = serde_json::from_str("\"tailwind_model\"").unwrap();
        assert_eq!(source, WindSource::Unknown);
    }

    #[test]
    fn legacy_file_id_alias() {
        let record: FileParameterRecord = serde_json::from_value(serde_json::json!({
            "fileId": "abc_ride",
            "parameters": {},
            "lastUsedAt": 5
        }))
        .unwrap();
        assert_eq!(record.fingerprint, "abc_ride");
        assert_eq!(record.source_name, "");
    }

    proptest! {
        #[test]
        fn lap_key_ignores_selection_order(mut laps in proptest::collection::vec(1u32..200, 1..12)) {
            let forward = LapKey::from_laps(&laps);
            laps.reverse();
            prop_assert_eq!(&forward, &LapKey::from_laps(&laps));

            let decoded = forward.laps();
            prop_assert!(decoded.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(LapKey::from_laps(&decoded), forward);
        }
    }
}
