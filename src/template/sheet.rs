//! Stream rewrite of a worksheet part's `sheetData`.
//!
//! Rows inside the invoice region are merged cell-by-cell: the six data
//! columns are replaced with record values, any other cells in the row pass
//! through untouched, and rows missing from the template are inserted in
//! order. Text lands as inline strings so `sharedStrings.xml` never needs
//! rewriting; replaced cells keep their existing style index, remapped
//! through the fill-clearing table from [`super::styles`].

use std::collections::{BTreeSet, HashMap};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::ConvertError;

use super::addr::{cell_ref, parse_cell_ref};
use super::{attr_value, CellWrite, INVOICE_COLUMNS};

/// Style indices referenced by cells inside the invoice region.
pub(crate) fn collect_region_styles(
    sheet_xml: &[u8],
    start_row: u32,
    row_count: u32,
) -> Result<BTreeSet<u32>, ConvertError> {
    let mut used = BTreeSet::new();
    if row_count == 0 {
        return Ok(used);
    }
    let end_row = start_row + row_count;

    let mut reader = Reader::from_reader(sheet_xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let Some(r) = attr_value(&e, b"r")? else { continue };
                let Some((row, col)) = parse_cell_ref(&r) else { continue };
                if row >= start_row && row < end_row && col < INVOICE_COLUMNS {
                    if let Some(style) = attr_value(&e, b"s")?.and_then(|s| s.parse().ok()) {
                        used.insert(style);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(used)
}

/// Rewrite the worksheet XML with `rows` written at consecutive sheet rows
/// starting at `start_row` (1-based), columns A onward.
pub(crate) fn patch_sheet_data(
    sheet_xml: &[u8],
    start_row: u32,
    rows: &[Vec<CellWrite>],
    style_remap: &HashMap<u32, u32>,
) -> Result<Vec<u8>, ConvertError> {
    let mut reader = Reader::from_reader(sheet_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(sheet_xml.len() + rows.len() * 256));

    let mut buf = Vec::new();
    let mut saw_sheet_data = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                saw_sheet_data = true;
                writer.write_event(Event::Start(e.into_owned()))?;
                patch_rows(&mut reader, &mut writer, start_row, rows, style_remap)?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                saw_sheet_data = true;
                if rows.is_empty() {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                } else {
                    writer.write_event(Event::Start(e.into_owned()))?;
                    for (offset, cells) in rows.iter().enumerate() {
                        write_new_row(&mut writer, start_row + offset as u32, cells, style_remap)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
                }
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    if !saw_sheet_data && !rows.is_empty() {
        return Err(ConvertError::Invalid(
            "worksheet part has no sheetData element".into(),
        ));
    }
    Ok(writer.into_inner())
}

fn patch_rows(
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
    start_row: u32,
    rows: &[Vec<CellWrite>],
    style_remap: &HashMap<u32, u32>,
) -> Result<(), ConvertError> {
    let mut buf = Vec::new();
    // index of the next record row not yet written out
    let mut next = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"row" => {
                let row_start = e.into_owned();
                let Some(row_num) = attr_value(&row_start, b"r")?.and_then(|v| v.parse().ok())
                else {
                    writer.write_event(Event::Start(row_start))?;
                    continue;
                };
                flush_rows_before(writer, row_num, start_row, rows, &mut next, style_remap)?;

                if let Some(idx) = record_index(row_num, start_row, rows.len()) {
                    next = next.max(idx + 1);
                    writer.write_event(Event::Start(row_start))?;
                    patch_row_cells(reader, writer, row_num, &rows[idx], style_remap)?;
                } else {
                    writer.write_event(Event::Start(row_start))?;
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                let row_empty = e.into_owned();
                let Some(row_num) = attr_value(&row_empty, b"r")?.and_then(|v| v.parse().ok())
                else {
                    writer.write_event(Event::Empty(row_empty))?;
                    continue;
                };
                flush_rows_before(writer, row_num, start_row, rows, &mut next, style_remap)?;

                if let Some(idx) = record_index(row_num, start_row, rows.len()) {
                    next = next.max(idx + 1);
                    writer.write_event(Event::Start(row_empty))?;
                    for (col, value) in rows[idx].iter().enumerate() {
                        write_cell(writer, row_num, col as u32, value, None, style_remap)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new("row")))?;
                } else {
                    writer.write_event(Event::Empty(row_empty))?;
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                while next < rows.len() {
                    write_new_row(writer, start_row + next as u32, &rows[next], style_remap)?;
                    next += 1;
                }
                writer.write_event(Event::End(e.into_owned()))?;
                return Ok(());
            }
            Event::Eof => {
                return Err(ConvertError::Invalid(
                    "unexpected end of worksheet XML inside sheetData".into(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
}

fn record_index(row_num: u32, start_row: u32, count: usize) -> Option<usize> {
    if row_num < start_row {
        return None;
    }
    let idx = (row_num - start_row) as usize;
    (idx < count).then_some(idx)
}

/// Emit record rows whose target sheet row precedes `row_num`.
fn flush_rows_before(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    start_row: u32,
    rows: &[Vec<CellWrite>],
    next: &mut usize,
    style_remap: &HashMap<u32, u32>,
) -> Result<(), ConvertError> {
    while *next < rows.len() && start_row + (*next as u32) < row_num {
        write_new_row(writer, start_row + *next as u32, &rows[*next], style_remap)?;
        *next += 1;
    }
    Ok(())
}

fn patch_row_cells(
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    cells: &[CellWrite],
    style_remap: &HashMap<u32, u32>,
) -> Result<(), ConvertError> {
    let mut buf = Vec::new();
    let mut next_col = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let cell_start = e.into_owned();
                let Some((col, style)) = cell_position(&cell_start)? else {
                    writer.write_event(Event::Start(cell_start))?;
                    continue;
                };
                flush_cells_before(writer, row_num, col, cells, &mut next_col, style_remap)?;

                if (col as usize) < cells.len() {
                    skip_cell(reader)?;
                    write_cell(writer, row_num, col, &cells[col as usize], style, style_remap)?;
                    next_col = next_col.max(col as usize + 1);
                } else {
                    writer.write_event(Event::Start(cell_start))?;
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let cell_empty = e.into_owned();
                let Some((col, style)) = cell_position(&cell_empty)? else {
                    writer.write_event(Event::Empty(cell_empty))?;
                    continue;
                };
                flush_cells_before(writer, row_num, col, cells, &mut next_col, style_remap)?;

                if (col as usize) < cells.len() {
                    write_cell(writer, row_num, col, &cells[col as usize], style, style_remap)?;
                    next_col = next_col.max(col as usize + 1);
                } else {
                    writer.write_event(Event::Empty(cell_empty))?;
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"row" => {
                while next_col < cells.len() {
                    write_cell(writer, row_num, next_col as u32, &cells[next_col], None, style_remap)?;
                    next_col += 1;
                }
                writer.write_event(Event::End(e.into_owned()))?;
                return Ok(());
            }
            Event::Eof => {
                return Err(ConvertError::Invalid(
                    "unexpected end of worksheet XML inside row".into(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
}

fn cell_position(e: &BytesStart) -> Result<Option<(u32, Option<u32>)>, ConvertError> {
    let Some(r) = attr_value(e, b"r")? else {
        return Ok(None);
    };
    let Some((_, col)) = parse_cell_ref(&r) else {
        return Ok(None);
    };
    let style = attr_value(e, b"s")?.and_then(|s| s.parse().ok());
    Ok(Some((col, style)))
}

/// Emit pending record cells with column index below `col`.
fn flush_cells_before(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    col: u32,
    cells: &[CellWrite],
    next_col: &mut usize,
    style_remap: &HashMap<u32, u32>,
) -> Result<(), ConvertError> {
    while *next_col < cells.len() && (*next_col as u32) < col {
        write_cell(writer, row_num, *next_col as u32, &cells[*next_col], None, style_remap)?;
        *next_col += 1;
    }
    Ok(())
}

/// Consume events of the cell being replaced, up to its closing tag.
fn skip_cell(reader: &mut Reader<&[u8]>) -> Result<(), ConvertError> {
    let mut buf = Vec::new();
    let mut depth = 1usize;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(ConvertError::Invalid(
                    "unexpected end of worksheet XML inside cell".into(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
}

fn write_new_row(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    cells: &[CellWrite],
    style_remap: &HashMap<u32, u32>,
) -> Result<(), ConvertError> {
    let mut row = BytesStart::new("row");
    row.push_attribute(("r", row_num.to_string().as_str()));
    writer.write_event(Event::Start(row))?;
    for (col, value) in cells.iter().enumerate() {
        write_cell(writer, row_num, col as u32, value, None, style_remap)?;
    }
    writer.write_event(Event::End(BytesEnd::new("row")))?;
    Ok(())
}

fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    col: u32,
    value: &CellWrite,
    existing_style: Option<u32>,
    style_remap: &HashMap<u32, u32>,
) -> Result<(), ConvertError> {
    let reference = cell_ref(row_num, col);
    let mut cell = BytesStart::new("c");
    cell.push_attribute(("r", reference.as_str()));

    if let Some(style) = existing_style {
        let cleared = style_remap.get(&style).copied().unwrap_or(style);
        if cleared != 0 {
            cell.push_attribute(("s", cleared.to_string().as_str()));
        }
    }

    match value {
        CellWrite::Number(n) => {
            writer.write_event(Event::Start(cell))?;
            writer.write_event(Event::Start(BytesStart::new("v")))?;
            writer.write_event(Event::Text(BytesText::new(&format_number(*n))))?;
            writer.write_event(Event::End(BytesEnd::new("v")))?;
            writer.write_event(Event::End(BytesEnd::new("c")))?;
        }
        CellWrite::Text(t) if t.is_empty() => {
            writer.write_event(Event::Empty(cell))?;
        }
        CellWrite::Text(t) => {
            cell.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(cell))?;
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            writer.write_event(Event::Start(BytesStart::new("t")))?;
            writer.write_event(Event::Text(BytesText::new(t)))?;
            writer.write_event(Event::End(BytesEnd::new("t")))?;
            writer.write_event(Event::End(BytesEnd::new("is")))?;
            writer.write_event(Event::End(BytesEnd::new("c")))?;
        }
    }
    Ok(())
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
