//! Page-aware text extraction for source documents.
//!
//! PDFs are extracted page by page so chunk provenance (1-indexed page
//! numbers) survives into retrieval results. Anything else is read as a
//! single-page plain-text document.

use std::path::Path;

use crate::error::ExtractError;

/// Load a document as a sequence of page texts.
pub fn load_pages(path: &Path) -> Result<Vec<String>, ExtractError> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        extract_pdf_pages(path)
    } else {
        let text = std::fs::read_to_string(path).map_err(|e| ExtractError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(vec![text])
    }
}

fn extract_pdf_pages(path: &Path) -> Result<Vec<String>, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::Unreadable {
            path: path.to_path_buf(),
            message: "no such file".to_string(),
        });
    }
    pdf_extract::extract_text_by_pages(path).map_err(|e| ExtractError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
