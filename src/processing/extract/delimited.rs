use csv::ReaderBuilder;

use super::plain;
use crate::processing::types::ExtractionError;

const FIELD_SEPARATOR: &str = ", ";

/// Parse CSV honoring quoting and escaping, then rejoin each row with `", "`.
///
/// Row widths may vary. Fields are decoded lossily. NUL bytes mean the upload is binary
/// data under a CSV label and is reported as unreadable.
pub(super) fn extract(bytes: &[u8]) -> Result<String, ExtractionError> {
    let bytes = plain::strip_utf8_bom(bytes);
    if bytes.contains(&0) {
        return Err(ExtractionError::unreadable("CSV contains binary data"));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(|error| {
            tracing::warn!(error = %error, "CSV parsing failed");
            ExtractionError::unreadable("CSV structure is malformed")
        })?;
        let fields: Vec<String> = record
            .iter()
            .map(|field| String::from_utf8_lossy(field).trim().to_string())
            .collect();
        rows.push(fields.join(FIELD_SEPARATOR));
    }

    Ok(rows.join("\n"))
}
