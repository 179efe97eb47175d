//! Tabular export of the result collection.
//!
//! One header row and one row per result. Numeric columns use fixed
//! precision; absent optional values are empty cells. `Notes` is always
//! quoted, other text cells only when they contain a delimiter, quote or
//! line break.

use chrono::{NaiveDate, SecondsFormat, Utc};
use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::error::StoreError;
use crate::types::AnalysisResultRecord;

/// Column header, in output order.
pub const HEADER: [&str; 22] = [
    "RecordingDate",
    "FileName",
    "Laps",
    "TrimStart",
    "TrimEnd",
    "CdA",
    "Crr",
    "WindSource",
    "WindSpeed",
    "WindDir",
    "SystemMass",
    "Rho",
    "Eta",
    "R2",
    "RMSE",
    "VEGain",
    "ActualGain",
    "AvgPower",
    "AvgSpeed",
    "AvgTemp",
    "Notes",
    "Timestamp",
];

pub const CSV_MIME_TYPE: &str = "text/csv";

/// Naming of the export document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub file_prefix: String,
    /// Date stamped into the file name.
    pub generated_on: NaiveDate,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            file_prefix: "velostash_results".into(),
            generated_on: Utc::now().date_naive(),
        }
    }
}

impl ExportOptions {
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.csv",
            self.file_prefix,
            self.generated_on.format("%Y-%m-%d")
        )
    }
}

/// A rendered export, ready for the file-save boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDocument {
    pub file_name: String,
    pub mime_type: &'static str,
    pub contents: String,
    pub row_count: usize,
}

/// Result of an export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The collection holds no results; no document was produced.
    Empty,
    Ready(ExportDocument),
}

/// Order rows by recording date (newest first, undated last), then source
/// name, then lap key.
pub fn sort_for_export(records: &mut [AnalysisResultRecord]) {
    records.sort_by(|a, b| {
        b.recording_date
            .cmp(&a.recording_date)
            .then_with(|| a.source_name.cmp(&b.source_name))
            .then_with(|| a.lap_key.cmp(&b.lap_key))
    });
}

/// Sort and render `records`, or report [`ExportOutcome::Empty`].
pub fn export_records(
    mut records: Vec<AnalysisResultRecord>,
    options: &ExportOptions,
) -> Result<ExportOutcome, StoreError> {
    if records.is_empty() {
        return Ok(ExportOutcome::Empty);
    }
    sort_for_export(&mut records);
    let contents = render_csv(&records)?;
    Ok(ExportOutcome::Ready(ExportDocument {
        file_name: options.file_name(),
        mime_type: CSV_MIME_TYPE,
        contents,
        row_count: records.len(),
    }))
}

/// Render `records` in the given order, header first.
pub fn render_csv(records: &[AnalysisResultRecord]) -> Result<String, StoreError> {
    // Cells are escaped by `row` so the Notes column can be force-quoted.
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(HEADER)?;
    for record in records {
        writer.write_record(row(record))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

fn row(r: &AnalysisResultRecord) -> Vec<String> {
    vec![
        text(&r.recording_date),
        text(&r.source_name),
        text(r.lap_key.as_str()),
        r.trim_start.to_string(),
        r.trim_end.to_string(),
        format!("{:.3}", r.cda),
        format!("{:.4}", r.crr),
        text(r.wind_source.as_str()),
        fixed(r.wind_speed, 1),
        fixed(r.wind_direction, 1),
        format!("{:.1}", r.system_mass),
        format!("{:.3}", r.rho),
        format!("{:.3}", r.eta),
        fixed(r.r2, 4),
        fixed(r.rmse, 2),
        fixed(r.ve_gain, 2),
        fixed(r.actual_gain, 2),
        fixed(r.avg_power, 1),
        fixed(r.avg_speed, 2),
        fixed(r.avg_temperature, 1),
        quoted(&r.notes),
        r.saved_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    ]
}

fn fixed(value: Option<f64>, places: usize) -> String {
    value.map_or_else(String::new, |v| format!("{v:.places$}"))
}

fn text(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        quoted(value)
    } else {
        value.to_string()
    }
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
