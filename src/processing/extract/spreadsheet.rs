use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::Timelike;

use crate::processing::types::ExtractionError;

/// Extract cell display text sheet by sheet, row-major, tab-separated.
///
/// Each sheet is introduced by a `Sheet: <name>` line; empty rows are skipped.
pub(super) fn extract(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|error| {
        tracing::warn!(error = %error, "Workbook parsing failed");
        ExtractionError::unreadable("workbook is corrupt, encrypted, or malformed")
    })?;

    let mut sections = Vec::new();
    for sheet_name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&sheet_name).map_err(|error| {
            tracing::warn!(sheet = %sheet_name, error = %error, "Worksheet parsing failed");
            ExtractionError::unreadable("worksheet could not be read")
        })?;

        let rows: Vec<String> = range
            .rows()
            .map(|row| row.iter().map(display_text).collect::<Vec<_>>())
            .filter(|cells| cells.iter().any(|cell| !cell.is_empty()))
            .map(|cells| cells.join("\t").trim_end().to_string())
            .collect();

        let mut section = format!("Sheet: {sheet_name}");
        for row in rows {
            section.push('\n');
            section.push_str(&row);
        }
        sections.push(section);
    }

    Ok(sections.join("\n\n"))
}

/// Render a cell the way a spreadsheet shows it rather than its raw storage value.
fn display_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.trim().to_string(),
        Data::DateTime(value) => match value.as_datetime() {
            Some(datetime) if datetime.num_seconds_from_midnight() == 0 => {
                datetime.format("%Y-%m-%d").to_string()
            }
            Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => value.as_f64().to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::types::FailureKind;

    #[test]
    fn numeric_cells_render_as_display_text() {
        assert_eq!(display_text(&Data::Float(3.0)), "3");
        assert_eq!(display_text(&Data::Float(2.5)), "2.5");
        assert_eq!(display_text(&Data::Int(42)), "42");
        assert_eq!(display_text(&Data::Bool(true)), "true");
        assert_eq!(display_text(&Data::String("  Ada ".into())), "Ada");
        assert_eq!(display_text(&Data::Empty), "");
    }

    #[test]
    fn iso_date_cells_keep_their_text() {
        assert_eq!(
            display_text(&Data::DateTimeIso("2024-02-29".into())),
            "2024-02-29"
        );
    }

    const ROSTER_XLSX: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/roster.xlsx"
    ));

    #[test]
    fn workbook_sheets_become_tab_separated_sections() {
        let text = extract(ROSTER_XLSX).expect("workbook text");
        assert_eq!(
            text,
            "Sheet: Roster\nName\tEmail\tSeats\nAda\tada@example.com\t3\n\nSheet: Totals\nTotal\t2.5"
        );
    }

    #[test]
    fn garbage_is_unreadable() {
        let error = extract(b"definitely not a workbook").expect_err("garbage");
        assert_eq!(error.kind(), FailureKind::UnreadableContent);
    }
}
