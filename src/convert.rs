//! End-to-end conversion pipeline.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::ConvertError;
use crate::source::load_source;
use crate::template::write_invoice;
use crate::transform::build_target_records;

/// Convert the timesheet export at `source` into an invoice workbook at
/// `output`, using the fixed-layout template at `template`.
///
/// Re-running with identical inputs and output path overwrites the
/// destination deterministically. Returns the output path on success.
pub fn convert(source: &Path, template: &Path, output: &Path) -> Result<PathBuf, ConvertError> {
    let source_rows = load_source(source)?;
    let target_rows = build_target_records(&source_rows);
    write_invoice(&target_rows, template, output)?;

    info!(
        source_rows = source_rows.len(),
        target_rows = target_rows.len(),
        output = %output.display(),
        "invoice written"
    );
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook, Data, Reader, Xlsx};
    use rust_xlsxwriter::{Color, ExcelDateTime, Format, Workbook};
    use std::fs;
    use tempfile::TempDir;

    fn write_source(path: &Path) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "TimesheetPortal Report").unwrap();
        for (col, header) in crate::source::REQUIRED_COLUMNS.iter().enumerate() {
            sheet.write_string(1, col as u16, *header).unwrap();
        }

        let date_format = Format::new().set_num_format("mm/dd/yyyy");
        let date = ExcelDateTime::from_ymd(2024, 3, 5).unwrap();
        sheet.write_string(2, 0, "Math Tutoring AB123456 Jane Doe").unwrap();
        sheet.write_string(2, 1, "Alex Rivera").unwrap();
        sheet.write_datetime_with_format(2, 2, &date, &date_format).unwrap();
        sheet.write_string(2, 3, "Speech Therapy").unwrap();
        sheet.write_string(2, 4, "Standard").unwrap();
        sheet.write_number(2, 5, 1.5).unwrap();
        sheet.write_number(2, 6, 45.0).unwrap();
        sheet.write_number(2, 7, 67.5).unwrap();

        // a gap row, then a sparse second entry
        sheet.write_string(4, 0, "Jane AB123456 Doe Smith").unwrap();
        sheet.write_string(4, 1, "Sam Chen").unwrap();
        sheet.write_string(4, 3, "OT").unwrap();

        workbook.save(path).unwrap();
    }

    fn write_template(path: &Path) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "INV# Invoice Template").unwrap();
        let warning = Format::new().set_background_color(Color::Red);
        for row in 6..12 {
            for col in 0..6u16 {
                sheet.write_blank(row, col, &warning).unwrap();
            }
        }
        workbook.save(path).unwrap();
    }

    #[test]
    fn converts_end_to_end() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.xlsx");
        let template = dir.path().join("template.xlsx");
        let output = dir.path().join("out/invoice.xlsx");
        write_source(&source);
        write_template(&template);

        let returned = convert(&source, &template, &output).unwrap();
        assert_eq!(returned, output);

        let mut workbook: Xlsx<_> = open_workbook(&output).unwrap();
        let range = workbook.worksheet_range_at(0).unwrap().unwrap();

        // one target row per non-empty source row
        assert_eq!(range.get_value((6, 0)), Some(&Data::String("Alex Rivera".into())));
        assert_eq!(range.get_value((6, 1)), Some(&Data::String("03/05/2024".into())));
        assert_eq!(range.get_value((6, 2)), Some(&Data::String("AB123456".into())));
        assert_eq!(range.get_value((6, 3)), Some(&Data::String("Math Tutoring".into())));
        assert_eq!(range.get_value((6, 4)), Some(&Data::String("Speech Therapy".into())));
        assert_eq!(range.get_value((6, 5)), Some(&Data::Float(90.0)));

        assert_eq!(range.get_value((7, 0)), Some(&Data::String("Sam Chen".into())));
        assert_eq!(range.get_value((7, 3)), Some(&Data::String("Doe Smith".into())));
        // the gap row produced no third record
        assert!(matches!(
            range.get_value((8, 0)),
            None | Some(Data::Empty)
        ));
    }

    #[test]
    fn repeated_runs_are_byte_identical() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.xlsx");
        let template = dir.path().join("template.xlsx");
        let output = dir.path().join("invoice.xlsx");
        write_source(&source);
        write_template(&template);

        convert(&source, &template, &output).unwrap();
        let first = fs::read(&output).unwrap();
        convert(&source, &template, &output).unwrap();
        let second = fs::read(&output).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_source_column_surfaces_as_typed_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.xlsx");
        let template = dir.path().join("template.xlsx");
        write_template(&template);

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "TimesheetPortal Report").unwrap();
        for (col, header) in crate::source::REQUIRED_COLUMNS.iter().enumerate() {
            if *header == "TherapistName" {
                continue;
            }
            sheet.write_string(1, col as u16, *header).unwrap();
        }
        sheet.write_string(2, 0, "something").unwrap();
        workbook.save(&source).unwrap();

        match convert(&source, &template, &dir.path().join("out.xlsx")) {
            Err(ConvertError::MissingColumns(names)) => {
                assert_eq!(names, vec!["TherapistName".to_string()]);
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }
}
