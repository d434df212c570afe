//! Projection of invoice rows into the fixed-layout template workbook.
//!
//! The template is copied byte-for-byte to the destination and the copy is
//! patched in place: only the active worksheet part (and `xl/styles.xml`, when
//! fills need clearing) is rewritten; every other package part is carried
//! through untouched. Cell coordinates are a hard-coded contract with the
//! template — data starts at row 7, columns A through F — and are not
//! inferred from the template's contents.

mod addr;
mod package;
mod sheet;
mod styles;

use std::fs;
use std::path::Path;

use quick_xml::events::BytesStart;
use tracing::debug;

use crate::error::ConvertError;
use crate::transform::TargetRecord;

/// First sheet row that receives invoice data (1-based).
pub const DATA_START_ROW: u32 = 7;
/// Number of invoice columns (A through F).
pub const INVOICE_COLUMNS: u32 = 6;

/// A value destined for one template cell.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CellWrite {
    Text(String),
    Number(f64),
}

fn record_cells(record: &TargetRecord) -> Vec<CellWrite> {
    vec![
        CellWrite::Text(record.therapist_name.clone()),
        CellWrite::Text(record.date_of_service.clone()),
        CellWrite::Text(record.student_id.clone()),
        CellWrite::Text(record.student_name.clone()),
        CellWrite::Text(record.service.clone()),
        match record.minutes_on_iep {
            Some(minutes) => CellWrite::Number(minutes),
            None => CellWrite::Text(String::new()),
        },
    ]
}

/// Copy the template to `output_path` and write `records` into rows 7+ of
/// its active sheet, one record per row, clearing warning fills on every
/// written cell. The original template is never mutated.
pub fn write_invoice(
    records: &[TargetRecord],
    template_path: &Path,
    output_path: &Path,
) -> Result<(), ConvertError> {
    if !template_path.is_file() {
        return Err(ConvertError::TemplateNotFound(template_path.to_path_buf()));
    }
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::copy(template_path, output_path)?;

    let original = fs::read(output_path)?;
    let rows: Vec<Vec<CellWrite>> = records.iter().map(record_cells).collect();
    let patched = package::patch_package(&original, &rows)?;
    fs::write(output_path, patched)?;

    debug!(records = records.len(), output = %output_path.display(), "template populated");
    Ok(())
}

/// Value of the first attribute whose local name matches, if any. Attribute
/// values in xlsx parts we inspect are plain ASCII (cell refs, counts, rel
/// ids), so no unescaping is applied.
pub(crate) fn attr_value(e: &BytesStart, name: &[u8]) -> Result<Option<String>, ConvertError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(String::from_utf8_lossy(&attr.value).into_owned()));
        }
    }
    Ok(None)
}
