use std::path::PathBuf;

use thiserror::Error;

/// Error type for the conversion pipeline.
///
/// Validation failures get their own variants so front ends can present them;
/// underlying I/O and parse errors from the spreadsheet layers propagate
/// unmodified.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("source workbook must contain at least three rows (title, headers, data); found {found}")]
    InsufficientRows { found: usize },

    #[error("missing expected columns in source file: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("template not found at {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("workbook part not found: {0}")]
    MissingPart(String),

    #[error("invalid workbook: {0}")]
    Invalid(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Xlsx(#[from] calamine::XlsxError),

    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0}")]
    Xml(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
}
