//! Derivation of invoice rows from normalized source rows.

use crate::source::{CellValue, SourceRecord};
use crate::student::extract_student_fields;

/// One invoice row, in the column order of the template (A through F).
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    pub therapist_name: String,
    /// `mm/dd/yyyy` when the source held a genuine date; string dates pass
    /// through verbatim.
    pub date_of_service: String,
    /// Two letters + six digits, or empty when no token matched.
    pub student_id: String,
    pub student_name: String,
    pub service: String,
    /// Hours x 60, rounded to 2 decimals. `None` when hours were absent —
    /// absence is distinct from zero.
    pub minutes_on_iep: Option<f64>,
}

/// Transform source rows into invoice rows, one per non-empty source row.
pub fn build_target_records(rows: &[SourceRecord]) -> Vec<TargetRecord> {
    rows.iter()
        .filter(|row| !row.is_empty())
        .map(to_target)
        .collect()
}

fn to_target(row: &SourceRecord) -> TargetRecord {
    let (student_id, student_name) =
        extract_student_fields(&row.activity_description.display());

    TargetRecord {
        therapist_name: trimmed_text(&row.therapist_name),
        date_of_service: format_date_of_service(&row.date),
        student_id,
        student_name,
        service: trimmed_text(&row.placement_desc),
        minutes_on_iep: minutes_from_hours(&row.entry_quantity),
    }
}

fn trimmed_text(value: &CellValue) -> String {
    value.display().trim().to_string()
}

fn format_date_of_service(value: &CellValue) -> String {
    match value {
        CellValue::Empty => String::new(),
        CellValue::DateTime(dt) => dt.format("%m/%d/%Y").to_string(),
        other => other.display().trim().to_string(),
    }
}

fn minutes_from_hours(value: &CellValue) -> Option<f64> {
    let hours = match value {
        CellValue::Number(n) => Some(*n),
        CellValue::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    Some(round2(hours * 60.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
