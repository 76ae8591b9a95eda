use docx_rs::{
    DocumentChild, ParagraphChild, RunChild, TableCellContent, TableChild, TableRowChild,
};

use crate::processing::types::ExtractionError;

/// Extract paragraph text in document order; tables become tab-separated rows.
pub(super) fn extract(bytes: &[u8]) -> Result<String, ExtractionError> {
    let docx = docx_rs::read_docx(bytes).map_err(|error| {
        tracing::warn!(error = %error, "DOCX parsing failed");
        ExtractionError::unreadable("DOCX archive is corrupt or malformed")
    })?;

    let mut lines = Vec::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(paragraph) => {
                lines.push(paragraph_text(&paragraph.children));
            }
            DocumentChild::Table(table) => {
                for row in &table.rows {
                    let TableChild::TableRow(row) = row;
                    let cells: Vec<String> = row
                        .cells
                        .iter()
                        .map(|cell| {
                            let TableRowChild::TableCell(cell) = cell;
                            cell.children
                                .iter()
                                .filter_map(|content| match content {
                                    TableCellContent::Paragraph(paragraph) => {
                                        Some(paragraph_text(&paragraph.children))
                                    }
                                    _ => None,
                                })
                                .filter(|text| !text.is_empty())
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .collect();
                    lines.push(cells.join("\t"));
                }
            }
            _ => {}
        }
    }

    Ok(lines.join("\n"))
}

fn paragraph_text(children: &[ParagraphChild]) -> String {
    let mut text = String::new();
    for child in children {
        match child {
            ParagraphChild::Run(run) => push_run(&run.children, &mut text),
            ParagraphChild::Hyperlink(link) => {
                for nested in &link.children {
                    if let ParagraphChild::Run(run) = nested {
                        push_run(&run.children, &mut text);
                    }
                }
            }
            _ => {}
        }
    }
    text
}

fn push_run(children: &[RunChild], output: &mut String) {
    for child in children {
        match child {
            RunChild::Text(text) => output.push_str(&text.text),
            RunChild::Tab(_) => output.push('\t'),
            RunChild::Break(_) => output.push('\n'),
            _ => {}
        }
    }
}
