//! Convert a TimesheetPortal timesheet export into a fixed-layout invoice
//! workbook.
//!
//! The pipeline is a straight line with no shared state:
//!
//! 1. [`source::load_source`] reads the export without assuming a header row,
//!    validates the expected columns and drops fully empty rows.
//! 2. [`transform::build_target_records`] derives the six invoice fields per
//!    row, including the student id/name split of the free-text description.
//! 3. [`template::write_invoice`] copies the invoice template and patches the
//!    records into rows 7+ of its active sheet, clearing stale warning fills.
//!
//! [`convert::convert`] chains the three stages and is the entry point used by
//! the CLI binary.

pub mod convert;
pub mod error;
pub mod source;
pub mod student;
pub mod template;
pub mod transform;

pub use convert::convert;
pub use error::ConvertError;
