//! Fill clearing via `xl/styles.xml` rewrite.
//!
//! Written cells must not inherit the template's warning fills, but their
//! borders and number formats should survive. For every cell format (`xf` in
//! `cellXfs`) referenced inside the invoice region, a fill-cleared clone
//! (`fillId="0"`, `applyFill="0"`) is appended to the table and the region's
//! cells are remapped onto it; formats that already carry no fill map to
//! themselves.

use std::collections::{BTreeSet, HashMap};

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::ConvertError;

use super::attr_value;

/// Rewrite `styles_xml` so each style index in `used` has a fill-free
/// counterpart. Returns the patched XML and the old→new index mapping
/// (identity for styles that already lack a fill).
pub(crate) fn clear_region_fills(
    styles_xml: &[u8],
    used: &BTreeSet<u32>,
) -> Result<(Vec<u8>, HashMap<u32, u32>), ConvertError> {
    let mut reader = Reader::from_reader(styles_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(styles_xml.len() + used.len() * 128));
    let mut remap = HashMap::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"cellXfs" => {
                let xfs_start = e.into_owned();
                rewrite_cell_xfs(&mut reader, &mut writer, &xfs_start, used, &mut remap)?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok((writer.into_inner(), remap))
}

fn rewrite_cell_xfs(
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
    xfs_start: &BytesStart,
    used: &BTreeSet<u32>,
    remap: &mut HashMap<u32, u32>,
) -> Result<(), ConvertError> {
    // buffer each <xf> as its run of events; whitespace between them is
    // insignificant and dropped
    let mut xfs: Vec<Vec<Event<'static>>> = Vec::new();
    let mut current: Vec<Event<'static>> = Vec::new();
    let mut depth = 0usize;

    let mut buf = Vec::new();
    loop {
        let ev = reader.read_event_into(&mut buf)?.into_owned();
        match &ev {
            Event::Start(s) if depth == 0 && s.local_name().as_ref() == b"xf" => {
                current.push(ev.clone());
                depth = 1;
            }
            Event::Empty(s) if depth == 0 && s.local_name().as_ref() == b"xf" => {
                xfs.push(vec![ev.clone()]);
            }
            Event::End(s) if depth == 0 && s.local_name().as_ref() == b"cellXfs" => break,
            Event::Start(_) if depth > 0 => {
                current.push(ev.clone());
                depth += 1;
            }
            Event::End(_) if depth > 0 => {
                current.push(ev.clone());
                depth -= 1;
                if depth == 0 {
                    xfs.push(std::mem::take(&mut current));
                }
            }
            Event::Eof => {
                return Err(ConvertError::Invalid(
                    "unexpected end of styles XML inside cellXfs".into(),
                ))
            }
            _ if depth > 0 => current.push(ev.clone()),
            _ => {}
        }
        buf.clear();
    }

    let mut clones: Vec<Vec<Event<'static>>> = Vec::new();
    for &index in used {
        let Some(xf) = xfs.get(index as usize) else {
            remap.insert(index, index);
            continue;
        };
        if xf_fill_id(xf)?.unwrap_or(0) == 0 {
            remap.insert(index, index);
            continue;
        }
        let clone = clone_without_fill(xf)?;
        remap.insert(index, (xfs.len() + clones.len()) as u32);
        clones.push(clone);
    }

    let total = xfs.len() + clones.len();
    let mut start = BytesStart::new("cellXfs");
    for attr in xfs_start.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() != b"count" {
            start.push_attribute(attr);
        }
    }
    start.push_attribute(("count", total.to_string().as_str()));

    writer.write_event(Event::Start(start))?;
    for xf in xfs.iter().chain(clones.iter()) {
        for ev in xf {
            writer.write_event(ev.clone())?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("cellXfs")))?;
    Ok(())
}

fn xf_fill_id(xf: &[Event<'static>]) -> Result<Option<u32>, ConvertError> {
    let start = match xf.first() {
        Some(Event::Start(s)) | Some(Event::Empty(s)) => s,
        _ => return Ok(None),
    };
    Ok(attr_value(start, b"fillId")?.and_then(|v| v.parse().ok()))
}

/// Clone an `xf` run with its fill reset to the default (no fill).
fn clone_without_fill(xf: &[Event<'static>]) -> Result<Vec<Event<'static>>, ConvertError> {
    let mut out = Vec::with_capacity(xf.len());
    for (pos, ev) in xf.iter().enumerate() {
        if pos != 0 {
            out.push(ev.clone());
            continue;
        }
        let (start, empty) = match ev {
            Event::Start(s) => (s, false),
            Event::Empty(s) => (s, true),
            _ => {
                out.push(ev.clone());
                continue;
            }
        };
        let mut cleared = BytesStart::new("xf");
        for attr in start.attributes() {
            let attr = attr?;
            let name = attr.key.local_name();
            if name.as_ref() == b"fillId" || name.as_ref() == b"applyFill" {
                continue;
            }
            cleared.push_attribute(attr);
        }
        cleared.push_attribute(("fillId", "0"));
        cleared.push_attribute(("applyFill", "0"));
        out.push(if empty {
            Event::Empty(cleared)
        } else {
            Event::Start(cleared)
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r#"<?xml version="1.0"?><styleSheet><fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="FFFF0000"/></patternFill></fill></fills><cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/><xf numFmtId="0" fontId="0" fillId="2" borderId="1" applyFill="1"/><xf numFmtId="14" fontId="0" fillId="2" borderId="0"><alignment horizontal="center"/></xf></cellXfs></styleSheet>"#;

    #[test]
    fn filled_styles_get_cleared_clones() {
        let used = BTreeSet::from([0u32, 1, 2]);
        let (out, remap) = clear_region_fills(STYLES.as_bytes(), &used).unwrap();
        let xml = String::from_utf8(out).unwrap();

        assert_eq!(remap[&0], 0);
        assert_eq!(remap[&1], 3);
        assert_eq!(remap[&2], 4);

        assert!(xml.contains(r#"<cellXfs count="5">"#));
        // clone of xf 1: fill gone, border kept
        assert!(xml.contains(
            r#"<xf numFmtId="0" fontId="0" borderId="1" fillId="0" applyFill="0"/>"#
        ));
        // clone of xf 2 keeps its alignment child and number format
        assert!(xml.contains(
            r#"<xf numFmtId="14" fontId="0" borderId="0" fillId="0" applyFill="0"><alignment horizontal="center"/></xf>"#
        ));
        // fills table is untouched
        assert!(xml.contains(r#"<fills count="3">"#));
    }

    #[test]
    fn out_of_range_styles_map_to_themselves() {
        let used = BTreeSet::from([9u32]);
        let (_, remap) = clear_region_fills(STYLES.as_bytes(), &used).unwrap();
        assert_eq!(remap[&9], 9);
    }
}
