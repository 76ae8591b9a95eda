use std::panic::{AssertUnwindSafe, catch_unwind};

use super::PAGE_BREAK;
use crate::processing::types::ExtractionError;

/// Extract text page by page and join pages with [`PAGE_BREAK`].
///
/// `pdf-extract` (and its font parsers) can panic on malformed input, so the call is wrapped in
/// `catch_unwind`. Encrypted and corrupt files both surface as unreadable.
pub(super) fn extract(bytes: &[u8]) -> Result<String, ExtractionError> {
    let pages = match catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    })) {
        Ok(Ok(pages)) => pages,
        Ok(Err(error)) => {
            tracing::warn!(error = %error, "PDF parsing failed");
            return Err(ExtractionError::unreadable("PDF is corrupt or encrypted"));
        }
        Err(_) => {
            tracing::warn!("PDF parser panicked on malformed input");
            return Err(ExtractionError::unreadable("PDF structure is malformed"));
        }
    };

    tracing::debug!(pages = pages.len(), "Parsed PDF pages");
    Ok(join_pages(pages.iter().map(String::as_str)))
}

fn join_pages<'a>(pages: impl Iterator<Item = &'a str>) -> String {
    let pages: Vec<&str> = pages.map(str::trim).collect();
    // Scanned documents yield only blank pages; keep them blank so the caller reports it.
    if pages.iter().all(|page| page.is_empty()) {
        return String::new();
    }
    pages.join(PAGE_BREAK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionLimits;
    use crate::processing::TextExtractor;
    use crate::processing::types::{DocumentType, FailureKind};

    /// Minimal two-page document with one Helvetica text run per page.
    fn two_page_pdf() -> Vec<u8> {
        fn page(contents: usize) -> String {
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 7 0 R >> >> /Contents {contents} 0 R >>"
            )
        }
        fn text_stream(text: &str) -> String {
            let ops = format!("BT /F1 24 Tf 72 720 Td ({text}) Tj ET");
            format!("<< /Length {} >>\nstream\n{ops}\nendstream", ops.len())
        }

        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R 5 0 R] /Count 2 >>".to_string(),
            page(4),
            text_stream("Hello first page"),
            page(6),
            text_stream("Second page text"),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (index, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", index + 1).as_bytes());
        }
        let xref = pdf.len();
        let size = objects.len() + 1;
        pdf.extend_from_slice(format!("xref\n0 {size}\n0000000000 65535 f \n").as_bytes());
        for offset in offsets {
            pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        pdf.extend_from_slice(
            format!("trailer\n<< /Size {size} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n")
                .as_bytes(),
        );
        pdf
    }

    fn extractor() -> TextExtractor {
        TextExtractor::new(ExtractionLimits::default())
    }

    #[test]
    fn well_formed_pdf_yields_pages_in_order() {
        let text = extractor()
            .extract(&two_page_pdf(), &DocumentType::Pdf)
            .expect("pdf text");
        let pages: Vec<&str> = text.split(PAGE_BREAK).map(str::trim).collect();
        assert_eq!(pages, ["Hello first page", "Second page text"]);
    }

    #[test]
    fn pages_are_joined_in_order_with_markers() {
        let joined = join_pages(["  first page\n", "second page", "third"].into_iter());
        assert_eq!(
            joined,
            format!("first page{PAGE_BREAK}second page{PAGE_BREAK}third")
        );
    }

    #[test]
    fn blank_pages_produce_no_text() {
        assert!(join_pages(["", "  \n"].into_iter()).is_empty());
    }

    #[test]
    fn truncated_pdf_is_unreadable() {
        let mut bytes = two_page_pdf();
        bytes.truncate(120);
        let error = extractor()
            .extract(&bytes, &DocumentType::Pdf)
            .expect_err("truncated pdf");
        assert_eq!(error.kind(), FailureKind::UnreadableContent);
    }
}
