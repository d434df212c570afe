//! Workbook package plumbing: locating the active worksheet part and
//! rebuilding the zip archive with the patched parts swapped in. Every
//! unrelated part is copied through with its compression method and
//! timestamps intact, so identical inputs produce byte-identical output.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, Write};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::ConvertError;

use super::{attr_value, sheet, styles, CellWrite, DATA_START_ROW};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const STYLES_PART: &str = "xl/styles.xml";

pub(crate) fn patch_package(
    original: &[u8],
    rows: &[Vec<CellWrite>],
) -> Result<Vec<u8>, ConvertError> {
    let mut archive = ZipArchive::new(Cursor::new(original))?;

    let workbook_xml = read_part(&mut archive, WORKBOOK_PART)?;
    let rels_xml = read_part(&mut archive, WORKBOOK_RELS_PART)?;
    let sheet_part = resolve_active_sheet_part(&workbook_xml, &rels_xml)?;
    debug!(part = %sheet_part, "resolved active worksheet part");

    let sheet_xml = read_part(&mut archive, &sheet_part)?;
    let used_styles = sheet::collect_region_styles(&sheet_xml, DATA_START_ROW, rows.len() as u32)?;

    let (styles_patch, style_remap) = match try_read_part(&mut archive, STYLES_PART)? {
        Some(styles_xml) if !used_styles.is_empty() => {
            let (patched, remap) = styles::clear_region_fills(&styles_xml, &used_styles)?;
            (Some(patched), remap)
        }
        _ => (None, HashMap::new()),
    };

    let sheet_patch = sheet::patch_sheet_data(&sheet_xml, DATA_START_ROW, rows, &style_remap)?;

    let mut out = ZipWriter::new(Cursor::new(Vec::with_capacity(original.len())));
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();

        let mut opts = SimpleFileOptions::default().compression_method(entry.compression());
        if let Some(modified) = entry.last_modified() {
            opts = opts.last_modified_time(modified);
        }
        if let Some(mode) = entry.unix_mode() {
            opts = opts.unix_permissions(mode);
        }

        if entry.is_dir() {
            out.add_directory(name, opts)?;
            continue;
        }

        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        if name == sheet_part {
            data = sheet_patch.clone();
        } else if name == STYLES_PART {
            if let Some(ref patched) = styles_patch {
                data = patched.clone();
            }
        }

        out.start_file(name, opts)?;
        out.write_all(&data)?;
    }

    Ok(out.finish()?.into_inner())
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, ConvertError> {
    try_read_part(archive, name)?.ok_or_else(|| ConvertError::MissingPart(name.to_string()))
}

fn try_read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, ConvertError> {
    match archive.by_name(name) {
        Ok(mut part) => {
            let mut data = Vec::with_capacity(part.size() as usize);
            part.read_to_end(&mut data)?;
            Ok(Some(data))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Resolve the zip path of the active worksheet: `workbookView/@activeTab`
/// picks the sheet (first sheet when absent), and the workbook relationships
/// map its `r:id` to the part path.
fn resolve_active_sheet_part(
    workbook_xml: &[u8],
    rels_xml: &[u8],
) -> Result<String, ConvertError> {
    let mut sheet_rids: Vec<String> = Vec::new();
    let mut active_tab = 0usize;

    let mut reader = Reader::from_reader(workbook_xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"workbookView" => {
                    if let Some(tab) = attr_value(&e, b"activeTab")? {
                        active_tab = tab.parse().unwrap_or(0);
                    }
                }
                b"sheet" => {
                    // the relationship attribute is namespaced (r:id)
                    if let Some(rid) = attr_value(&e, b"id")? {
                        sheet_rids.push(rid);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if sheet_rids.is_empty() {
        return Err(ConvertError::Invalid("workbook declares no sheets".into()));
    }
    let rid = sheet_rids.get(active_tab).unwrap_or(&sheet_rids[0]);

    let mut targets: HashMap<String, String> = HashMap::new();
    let mut reader = Reader::from_reader(rels_xml);
    buf.clear();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) =
                    (attr_value(&e, b"Id")?, attr_value(&e, b"Target")?)
                {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let target = targets
        .get(rid)
        .ok_or_else(|| ConvertError::Invalid(format!("missing worksheet relationship {rid}")))?;
    Ok(normalize_part_path(target))
}

/// Join a relationship target onto the `xl/` base, resolving `.`/`..`
/// segments; absolute targets drop their leading slash.
fn normalize_part_path(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = vec!["xl"];
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
