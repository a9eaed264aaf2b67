//! Deliverable generation: the zoning workbook and the historical-imagery
//! document consultants attach to their impact studies.

pub mod document;
pub mod workbook;

use rust_xlsxwriter::XlsxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("workbook error: {0}")]
    Workbook(#[from] XlsxError),

    #[error("document error: {0}")]
    Document(String),

    #[error("image data is not a PNG")]
    BadImage,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub use document::{CapturedImage, DOCUMENT_FILE, write_history_document};
pub use workbook::{WORKBOOK_FILE, write_zoning_workbook};
