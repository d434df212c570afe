//! Loading and normalization of the TimesheetPortal export.
//!
//! The export is read untyped: row 0 is a report title, row 1 carries the
//! column labels and data starts at row 2. Columns may appear in any order;
//! the loader reorders them into the canonical sequence and drops rows that
//! are empty in every cell.

use std::path::Path;

use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

use crate::error::ConvertError;

/// Required source columns, in canonical order.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "ActivityDescription",
    "TherapistName",
    "Date",
    "PlacementDesc",
    "RateName",
    "EntryQuantity",
    "ChargeRate",
    "TotalCharge",
];

const HEADER_ROW: usize = 1;
const DATA_START_ROW: usize = 2;

/// A scalar decoded from a source cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
    Bool(bool),
}

impl CellValue {
    fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(naive) => CellValue::DateTime(naive),
                None => CellValue::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) => match parse_iso_datetime(s) {
                Some(naive) => CellValue::DateTime(naive),
                None => CellValue::Text(s.clone()),
            },
            Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(e) => CellValue::Text(e.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// String form of the cell, matching how the values display in the sheet
    /// (integral floats print without a trailing `.0`).
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            CellValue::Bool(b) => b.to_string(),
        }
    }
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = s.parse::<NaiveDateTime>() {
        return Some(dt);
    }
    s.parse::<NaiveDate>()
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// One retained row of the export, restricted to the canonical columns.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub activity_description: CellValue,
    pub therapist_name: CellValue,
    pub date: CellValue,
    pub placement_desc: CellValue,
    pub rate_name: CellValue,
    pub entry_quantity: CellValue,
    pub charge_rate: CellValue,
    pub total_charge: CellValue,
}

impl SourceRecord {
    fn from_row(row: &[CellValue], positions: &[usize; 8]) -> Self {
        let cell = |slot: usize| {
            row.get(positions[slot])
                .cloned()
                .unwrap_or(CellValue::Empty)
        };
        SourceRecord {
            activity_description: cell(0),
            therapist_name: cell(1),
            date: cell(2),
            placement_desc: cell(3),
            rate_name: cell(4),
            entry_quantity: cell(5),
            charge_rate: cell(6),
            total_charge: cell(7),
        }
    }

    /// True when every retained column is empty.
    pub fn is_empty(&self) -> bool {
        [
            &self.activity_description,
            &self.therapist_name,
            &self.date,
            &self.placement_desc,
            &self.rate_name,
            &self.entry_quantity,
            &self.charge_rate,
            &self.total_charge,
        ]
        .iter()
        .all(|v| v.is_empty())
    }
}

/// Load the export at `path` and normalize it into source records.
///
/// Fails when the sheet has fewer than three rows or when any required
/// column label is absent from the header row (all missing names are
/// reported at once).
pub fn load_source(path: &Path) -> Result<Vec<SourceRecord>, ConvertError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ConvertError::Invalid("source workbook has no worksheets".into()))??;

    let grid = absolute_grid(&range);
    if grid.len() <= DATA_START_ROW {
        return Err(ConvertError::InsufficientRows { found: grid.len() });
    }

    let headers: Vec<String> = grid[HEADER_ROW]
        .iter()
        .map(|cell| cell.display().trim().to_string())
        .collect();

    let mut positions = [0usize; 8];
    let mut missing = Vec::new();
    for (slot, name) in REQUIRED_COLUMNS.iter().enumerate() {
        match headers.iter().position(|h| h == name) {
            Some(col) => positions[slot] = col,
            None => missing.push((*name).to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(ConvertError::MissingColumns(missing));
    }

    let records: Vec<SourceRecord> = grid[DATA_START_ROW..]
        .iter()
        .filter(|row| !row.iter().all(CellValue::is_empty))
        .map(|row| SourceRecord::from_row(row, &positions))
        .collect();

    debug!(path = %path.display(), rows = records.len(), "normalized source rows");
    Ok(records)
}

/// Materialize the used range as a rectangular grid anchored at A1, so row
/// and column indices are absolute sheet positions even when the used range
/// starts below or right of the origin.
fn absolute_grid(range: &Range<Data>) -> Vec<Vec<CellValue>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let width = start_col as usize + range.width();
    let mut grid = vec![vec![CellValue::Empty; width]; start_row as usize];
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; start_col as usize];
        cells.extend(row.iter().map(CellValue::from_data));
        grid.push(cells);
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
    use tempfile::TempDir;

    // Header order intentionally differs from the canonical sequence.
    const FIXTURE_HEADERS: [&str; 8] = [
        "TherapistName",
        "ActivityDescription",
        "Date",
        "RateName",
        "PlacementDesc",
        "EntryQuantity",
        "ChargeRate",
        "TotalCharge",
    ];

    fn write_fixture(dir: &TempDir, skip_header: Option<&str>) -> std::path::PathBuf {
        let path = dir.path().join("source.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();

        sheet.write_string(0, 0, "TimesheetPortal Report").unwrap();
        for (col, header) in FIXTURE_HEADERS.iter().enumerate() {
            if Some(*header) == skip_header {
                continue;
            }
            sheet.write_string(1, col as u16, *header).unwrap();
        }

        let date_format = Format::new().set_num_format("mm/dd/yyyy");
        let date = ExcelDateTime::from_ymd(2024, 3, 5).unwrap();

        sheet.write_string(2, 0, "Alex Rivera").unwrap();
        sheet.write_string(2, 1, "Math Tutoring AB123456 Jane Doe").unwrap();
        sheet.write_datetime_with_format(2, 2, &date, &date_format).unwrap();
        sheet.write_string(2, 3, "Standard").unwrap();
        sheet.write_string(2, 4, "Speech Therapy").unwrap();
        sheet.write_number(2, 5, 1.5).unwrap();
        sheet.write_number(2, 6, 45.0).unwrap();
        sheet.write_number(2, 7, 67.5).unwrap();

        // row 3 left entirely empty on purpose

        sheet.write_string(4, 0, "Sam Chen").unwrap();
        sheet.write_string(4, 1, "Jane AB123456 Doe Smith").unwrap();
        sheet.write_string(4, 2, "2024-04-01").unwrap();
        sheet.write_string(4, 4, "OT").unwrap();

        workbook.save(&path).unwrap();
        path
    }

    #[test]
    fn loads_reorders_and_drops_empty_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, None);

        let records = load_source(&path).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.therapist_name, CellValue::Text("Alex Rivera".into()));
        assert_eq!(
            first.activity_description,
            CellValue::Text("Math Tutoring AB123456 Jane Doe".into())
        );
        assert_eq!(first.placement_desc, CellValue::Text("Speech Therapy".into()));
        assert_eq!(first.entry_quantity, CellValue::Number(1.5));
        assert!(matches!(first.date, CellValue::DateTime(_)));

        let second = &records[1];
        assert_eq!(second.date, CellValue::Text("2024-04-01".into()));
        assert!(second.entry_quantity.is_empty());
    }

    #[test]
    fn typed_date_cells_decode_to_datetimes() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, None);

        let records = load_source(&path).unwrap();
        let CellValue::DateTime(dt) = &records[0].date else {
            panic!("expected a datetime cell, got {:?}", records[0].date);
        };
        assert_eq!(dt.date(), chrono::NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn too_few_rows_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "TimesheetPortal Report").unwrap();
        sheet.write_string(1, 0, "ActivityDescription").unwrap();
        workbook.save(&path).unwrap();

        match load_source(&path) {
            Err(ConvertError::InsufficientRows { found }) => assert_eq!(found, 2),
            other => panic!("expected InsufficientRows, got {other:?}"),
        }
    }

    #[test]
    fn missing_column_is_named() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, Some("TherapistName"));

        match load_source(&path) {
            Err(ConvertError::MissingColumns(names)) => {
                assert_eq!(names, vec!["TherapistName".to_string()]);
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn number_display_trims_integral_floats() {
        assert_eq!(CellValue::Number(45.0).display(), "45");
        assert_eq!(CellValue::Number(1.5).display(), "1.5");
    }
}
