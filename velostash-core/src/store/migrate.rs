// Field-defaulting transforms that bring old documents to the current shape.
//
// Each collection has a step table indexed by `from -> to`. Replaying a
// document walks the table from the persisted version to the current one,
// then decodes the result into the typed record; anything that still fails to
// decode is a malformed record and gets counted, not fatal.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::types::{AnalysisResultRecord, FileParameterRecord};

use super::schema;

/// Why a single document could not be upgraded.
#[derive(thiserror::Error, Debug)]
pub enum TransformError {
    #[error("stored document is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("stored document is not a JSON object")]
    NotAnObject,

    #[error("required field '{0}' is missing")]
    MissingField(&'static str),

    #[error("no migration step from schema version {from} toward {to}")]
    NoPath { from: u32, to: u32 },

    #[error("upgraded document does not decode: {0}")]
    Decode(#[source] serde_json::Error),
}

type Document = Map<String, Value>;

/// One hop of a migration chain.
#[derive(Debug, Clone, Copy)]
pub struct MigrationStep {
    pub from: u32,
    pub to: u32,
    pub describe: &'static str,
    pub apply: fn(&mut Document) -> Result<(), TransformError>,
}

/// Result collection history, oldest first.
pub const RESULT_STEPS: &[MigrationStep] = &[
    MigrationStep {
        from: 1,
        to: 2,
        describe: "composite key (fileName, lapKey) and wind inputs",
        apply: result_v1_to_v2,
    },
    MigrationStep {
        from: 2,
        to: 3,
        describe: "notes joins the key",
        apply: result_v2_to_v3,
    },
    MigrationStep {
        from: 3,
        to: 4,
        describe: "elevation and average stats; sourceName/savedAt renames",
        apply: result_v3_to_v4,
    },
    MigrationStep {
        from: 4,
        to: 5,
        describe: "recordingDate",
        apply: result_v4_to_v5,
    },
];

/// Walk `steps` from `from` up to `to`.
///
/// A document already at or past `to` is returned unchanged.
pub fn upgrade_document(
    steps: &[MigrationStep],
    doc: Value,
    from: u32,
    to: u32,
) -> Result<Document, TransformError> {
    let Value::Object(mut map) = doc else {
        return Err(TransformError::NotAnObject);
    };
    let mut version = from;
    while version < to {
        let step = steps
            .iter()
            .find(|s| s.from == version)
            .ok_or(TransformError::NoPath { from: version, to })?;
        (step.apply)(&mut map)?;
        version = step.to;
    }
    Ok(map)
}

/// Bring a stored result document at `from` to the current record.
pub fn upgrade_result(raw: &str, from: u32) -> Result<AnalysisResultRecord, TransformError> {
    let doc: Value = serde_json::from_str(raw).map_err(TransformError::InvalidJson)?;
    let map = upgrade_document(RESULT_STEPS, doc, from, schema::RESULTS_VERSION)?;
    serde_json::from_value(Value::Object(map)).map_err(TransformError::Decode)
}

/// Bring a stored parameter document to the current record.
///
/// Parameters have a single schema version, so this only fills defaults:
/// `lastUsedAt` becomes `now_ms` (the record is not pruned merely for
/// predating the field) and `sourceName` becomes empty.
pub fn upgrade_parameters(raw: &str, now_ms: i64) -> Result<FileParameterRecord, TransformError> {
    let doc: Value = serde_json::from_str(raw).map_err(TransformError::InvalidJson)?;
    let Value::Object(mut map) = doc else {
        return Err(TransformError::NotAnObject);
    };
    if !map.contains_key("fingerprint") && !map.contains_key("fileId") {
        return Err(TransformError::MissingField("fingerprint"));
    }
    if !map.contains_key("parameters") {
        return Err(TransformError::MissingField("parameters"));
    }
    map.entry("lastUsedAt").or_insert(Value::from(now_ms));
    serde_json::from_value(Value::Object(map)).map_err(TransformError::Decode)
}

fn result_v1_to_v2(doc: &mut Document) -> Result<(), TransformError> {
    // Tables without a meta row start here even when their documents are newer.
    let named = ["fileName", "sourceName"]
        .iter()
        .any(|field| doc.get(*field).is_some_and(Value::is_string));
    if !named {
        return Err(TransformError::MissingField("fileName"));
    }
    doc.entry("lapKey").or_insert_with(|| Value::from("all"));
    doc.entry("windSource").or_insert_with(|| Value::from("none"));
    Ok(())
}

fn result_v2_to_v3(doc: &mut Document) -> Result<(), TransformError> {
    doc.entry("notes").or_insert_with(|| Value::from(""));
    Ok(())
}

fn result_v3_to_v4(doc: &mut Document) -> Result<(), TransformError> {
    if let Some(name) = doc.remove("fileName") {
        doc.entry("sourceName").or_insert(name);
    }
    if !doc.contains_key("sourceName") {
        return Err(TransformError::MissingField("sourceName"));
    }

    // Early releases wrote `timestamp` as Unix milliseconds, later ones as ISO text.
    let legacy = doc.remove("timestamp");
    if !doc.contains_key("savedAt") {
        let saved_at = match legacy {
            Some(Value::Number(ms)) => ms
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(|dt| Value::from(dt.to_rfc3339())),
            Some(Value::String(text)) => Some(Value::String(text)),
            _ => None,
        };
        let saved_at = saved_at.unwrap_or_else(|| Value::from(Utc::now().to_rfc3339()));
        doc.insert("savedAt".into(), saved_at);
    }
    Ok(())
}

fn result_v4_to_v5(doc: &mut Document) -> Result<(), TransformError> {
    doc.entry("recordingDate").or_insert_with(|| Value::from(""));
    Ok(())
}
