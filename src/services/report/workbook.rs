//! Zoning workbook writer.
//!
//! One synthesis sheet over all layers, then one sheet per layer that had
//! hits. Sheet names are derived from the layer titles after Excel's
//! naming rules (31 characters, no `[]:*?/\`, unique).

use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet};
use tracing::info;

use super::ReportError;
use crate::services::coords;
use crate::services::zoning::{LayerFindings, ZoneClass, ZoningReport};

/// File name of the workbook inside the chosen directory.
pub const WORKBOOK_FILE: &str = "ID zonages.xlsx";

const SHEET_NAME_MAX: usize = 31;

/// Write the workbook for a finished analysis, returning its path.
pub fn write_zoning_workbook(
    report: &ZoningReport,
    dir: &Utf8Path,
) -> Result<Utf8PathBuf, ReportError> {
    let mut workbook = Workbook::new();
    let header = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x1F4E5F));

    write_synthesis(workbook.add_worksheet(), report, &header)?;

    let mut used = HashSet::new();
    used.insert("Synthèse".to_string());
    for layer in &report.layers {
        if layer.hits.is_empty() {
            continue;
        }
        let name = sheet_name(&layer.title, &mut used);
        write_layer(workbook.add_worksheet(), layer, &name, &header)?;
    }

    let path = dir.join(WORKBOOK_FILE);
    workbook.save(path.as_std_path())?;
    info!(path = %path, layers = report.layers.len(), hits = report.total_hits(), "Zoning workbook written");
    Ok(path)
}

fn write_synthesis(
    sheet: &mut Worksheet,
    report: &ZoningReport,
    header: &Format,
) -> Result<(), ReportError> {
    sheet.set_name("Synthèse")?;
    for (col, title) in ["Couche", "Catégorie", "Zonages", "Dont traversés", "Plus proche"]
        .iter()
        .enumerate()
    {
        sheet.write_string_with_format(0, col as u16, *title, header)?;
    }

    let mut row = 1u32;
    for layer in &report.layers {
        sheet.write_string(row, 0, &layer.title)?;
        sheet.write_string(row, 1, &layer.category)?;
        sheet.write_number(row, 2, layer.hits.len() as f64)?;
        sheet.write_number(row, 3, layer.intersecting() as f64)?;
        sheet.write_string(row, 4, nearest_text(layer))?;
        row += 1;
    }

    row += 1;
    sheet.write_string(
        row,
        0,
        format!(
            "Analyse du {}, rayon de recherche {} m",
            report.generated_at.format("%d/%m/%Y %H:%M"),
            report.radius_m
        ),
    )?;

    sheet.set_column_width(0, 42)?;
    sheet.set_column_width(1, 14)?;
    sheet.set_column_width(4, 60)?;
    Ok(())
}

fn write_layer(
    sheet: &mut Worksheet,
    layer: &LayerFindings,
    name: &str,
    header: &Format,
) -> Result<(), ReportError> {
    sheet.set_name(name)?;
    for (col, title) in ["Zonage", "Situation", "Distance (m)", "Direction"]
        .iter()
        .enumerate()
    {
        sheet.write_string_with_format(0, col as u16, *title, header)?;
    }

    for (index, hit) in layer.hits.iter().enumerate() {
        let row = index as u32 + 1;
        sheet.write_string(row, 0, &hit.name)?;
        match hit.class {
            ZoneClass::Intersects => {
                sheet.write_string(row, 1, "Traversé")?;
            }
            ZoneClass::Near {
                distance_m,
                bearing,
            } => {
                sheet.write_string(row, 1, "À proximité")?;
                sheet.write_number(row, 2, distance_m.round())?;
                sheet.write_string(row, 3, coords::compass_sector(bearing))?;
            }
        }
    }

    sheet.set_column_width(0, 52)?;
    sheet.set_column_width(1, 14)?;
    Ok(())
}

fn nearest_text(layer: &LayerFindings) -> String {
    if let Some(err) = &layer.error {
        return format!("erreur: {err}");
    }
    match layer.nearest() {
        None => "aucun dans le rayon".to_string(),
        Some(hit) => match hit.class {
            ZoneClass::Intersects => format!("{} (traversé)", hit.name),
            ZoneClass::Near {
                distance_m,
                bearing,
            } => format!(
                "{} à {} m {}",
                hit.name,
                distance_m.round() as i64,
                coords::compass_sector(bearing)
            ),
        },
    }
}

/// A title reduced to a legal, unique worksheet name.
fn sheet_name(title: &str, used: &mut HashSet<String>) -> String {
    let mut clean: String = title
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .collect();
    clean = clean.trim().to_string();
    if clean.is_empty() {
        clean = "Couche".to_string();
    }
    clean = clean.chars().take(SHEET_NAME_MAX).collect();

    let mut name = clean.clone();
    let mut counter = 2;
    while !used.insert(name.clone()) {
        let suffix = format!(" ({counter})");
        let keep = SHEET_NAME_MAX.saturating_sub(suffix.chars().count());
        name = clean.chars().take(keep).collect::<String>() + &suffix;
        counter += 1;
    }
    name
}
