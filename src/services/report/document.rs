//! Historical-imagery document writer.
//!
//! Produces the docx consultants paste into their study: a titled table
//! with one row per captured year, the aerial view next to it, closed by
//! the IGN credit line.

use std::fs::File;

use camino::{Utf8Path, Utf8PathBuf};
use docx_rs::{AlignmentType, Docx, Paragraph, Pic, Run, Table, TableCell, TableRow};
use tracing::info;

use super::ReportError;

/// File name of the document inside the chosen directory.
pub const DOCUMENT_FILE: &str = "Comparaison historique.docx";

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// 9525 EMU per pixel at 96 dpi.
const EMU_PER_PIXEL: u32 = 9525;
const IMAGE_WIDTH_PX: u32 = 480;
const IMAGE_HEIGHT_PX: u32 = 360;

/// One aerial view of the site at a given year.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub year: u16,
    pub png: Vec<u8>,
    /// Campaign or layer the view came from, printed under the image.
    pub source: String,
}

/// Write the comparison document, returning its path.
///
/// Every image is checked to be a PNG up front; embedding anything else
/// would corrupt the document.
pub fn write_history_document(
    site_label: &str,
    images: &[CapturedImage],
    dir: &Utf8Path,
) -> Result<Utf8PathBuf, ReportError> {
    for image in images {
        if !image.png.starts_with(&PNG_SIGNATURE) {
            return Err(ReportError::BadImage);
        }
    }

    let mut rows = Vec::with_capacity(images.len() + 1);
    rows.push(TableRow::new(vec![
        header_cell("Année"),
        header_cell("Vue aérienne"),
    ]));
    for image in images {
        let pic = Pic::new(&image.png).size(
            IMAGE_WIDTH_PX * EMU_PER_PIXEL,
            IMAGE_HEIGHT_PX * EMU_PER_PIXEL,
        );
        rows.push(TableRow::new(vec![
            TableCell::new().add_paragraph(
                Paragraph::new().add_run(Run::new().add_text(image.year.to_string()).bold()),
            ),
            TableCell::new()
                .add_paragraph(Paragraph::new().add_run(Run::new().add_image(pic)))
                .add_paragraph(
                    Paragraph::new().add_run(Run::new().add_text(image.source.clone()).size(14)),
                ),
        ]));
    }

    let docx = Docx::new()
        .add_paragraph(
            Paragraph::new()
                .add_run(
                    Run::new()
                        .add_text(format!("Comparaison historique: {site_label}"))
                        .bold(),
                )
                .align(AlignmentType::Center),
        )
        .add_paragraph(Paragraph::new())
        .add_table(Table::new(rows))
        .add_paragraph(Paragraph::new())
        .add_paragraph(
            Paragraph::new().add_run(
                Run::new()
                    .add_text("Source : IGN, Remonter le temps (remonterletemps.ign.fr)")
                    .italic()
                    .size(16),
            ),
        );

    let path = dir.join(DOCUMENT_FILE);
    let file = File::create(path.as_std_path())?;
    docx.build()
        .pack(file)
        .map_err(|err| ReportError::Document(format!("{err:?}")))?;
    info!(path = %path, images = images.len(), "History document written");
    Ok(path)
}

fn header_cell(text: &str) -> TableCell {
    TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text(text).bold()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // Smallest valid PNG, one transparent pixel.
    const TINY_PNG: [u8; 67] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    #[test]
    fn test_document_written_to_disk() {
        let dir = TempDir::new().unwrap();
        let out = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let images = vec![
            CapturedImage {
                year: 2006,
                png: TINY_PNG.to_vec(),
                source: "BDORTHO 2006-2010".to_string(),
            },
            CapturedImage {
                year: 2021,
                png: TINY_PNG.to_vec(),
                source: "BDORTHO 2021".to_string(),
            },
        ];

        let path = write_history_document("Les Sagnes (38)", &images, &out).unwrap();
        assert_eq!(path.file_name(), Some(DOCUMENT_FILE));
        assert!(std::fs::metadata(path.as_std_path()).unwrap().len() > 0);
    }

    #[test]
    fn test_non_png_bytes_are_rejected() {
        let dir = TempDir::new().unwrap();
        let out = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let images = vec![CapturedImage {
            year: 2011,
            png: vec![0xFF, 0xD8, 0xFF, 0xE0],
            source: "JPEG".to_string(),
        }];

        assert!(matches!(
            write_history_document("Site", &images, &out),
            Err(ReportError::BadImage)
        ));
    }

    #[test]
    fn test_empty_capture_list_still_writes_the_table_shell() {
        let dir = TempDir::new().unwrap();
        let out = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let path = write_history_document("Site", &[], &out).unwrap();
        assert!(path.as_std_path().exists());
    }
}
