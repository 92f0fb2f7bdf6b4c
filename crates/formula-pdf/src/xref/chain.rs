//! Walks the chain of cross-reference sections from `startxref` back through `/Prev` links.

use crate::error::{Error, Result};
use crate::object::{Dictionary, ObjRef, Object};
use crate::options::OpenOptions;
use crate::position_set::PositionSet;

use super::entries::XrefTable;
use super::stream::parse_xref_stream_section;
use super::table::parse_xref_table_section;
use super::SectionKind;

/// Result of a chain walk that did not hit structural damage.
#[derive(Debug)]
pub(crate) struct ChainOutcome {
    pub(crate) table: XrefTable,
    /// Trailer of the newest section.
    pub(crate) trailer: Option<Dictionary>,
    /// First `/Root` found, newest section first.
    pub(crate) root: Option<ObjRef>,
    /// Offset whose revisit stopped the walk.
    pub(crate) loop_at: Option<usize>,
    pub(crate) sections: usize,
}

/// Read a `/Root` value. Some producers write a bare object number instead of a reference.
pub(crate) fn root_from_trailer(trailer: &Dictionary) -> Option<ObjRef> {
    match trailer.get("Root")? {
        Object::Reference(r) => Some(*r),
        Object::Integer(n) => {
            let num = u32::try_from(*n).ok()?;
            log::debug!("trailer /Root is a bare object number {num}; assuming generation 0");
            Some(ObjRef::new(num, 0))
        }
        _ => None,
    }
}

fn section_offset(data: &[u8], value: &Object, key: &str, from: usize) -> Result<usize> {
    let offset = value
        .as_int()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| Error::damaged(from, format!("/{key} is not a valid offset: {value:?}")))?;
    if offset >= data.len() {
        return Err(Error::damaged(
            from,
            format!("/{key} offset {offset} is past the end of the file"),
        ));
    }
    Ok(offset)
}

fn read_section(
    data: &[u8],
    offset: usize,
    table: &mut XrefTable,
    options: &OpenOptions,
) -> Result<(SectionKind, Dictionary)> {
    let kind = SectionKind::classify(data, offset)
        .ok_or_else(|| Error::damaged(offset, "no cross-reference section at offset"))?;
    let trailer = match kind {
        SectionKind::Table => parse_xref_table_section(data, offset, table)?,
        SectionKind::Stream => {
            parse_xref_stream_section(data, offset, table, options.max_decoded_stream_bytes)?
        }
    };
    Ok((kind, trailer))
}

/// Decode every section reachable from `start`, newest first.
///
/// Any structural failure aborts the walk; the caller decides whether to reconstruct. A revisited
/// offset is not an error: the walk stops there and reports it in [`ChainOutcome::loop_at`].
pub(crate) fn walk_chain(data: &[u8], start: usize, options: &OpenOptions) -> Result<ChainOutcome> {
    if start >= data.len() {
        return Err(Error::damaged(
            start,
            "startxref points past the end of the file",
        ));
    }

    let mut visited = PositionSet::new();
    let mut outcome = ChainOutcome {
        table: XrefTable::new(options.max_xref_entries),
        trailer: None,
        root: None,
        loop_at: None,
        sections: 0,
    };

    let mut next = Some(start);
    while let Some(offset) = next.take() {
        if visited.contains(offset) {
            log::warn!("cross-reference chain revisits offset {offset}; stopping the walk");
            outcome.loop_at = Some(offset);
            break;
        }
        visited.insert(offset)?;

        let (kind, trailer) = read_section(data, offset, &mut outcome.table, options)?;

        // Hybrid files: the table's trailer points at a stream holding the compressed entries.
        // It belongs to the same revision, so it is read before moving on to `/Prev`.
        if kind == SectionKind::Table {
            if let Some(value) = trailer.get("XRefStm") {
                let side = section_offset(data, value, "XRefStm", offset)?;
                if !visited.contains(side) {
                    visited.insert(side)?;
                    parse_xref_stream_section(
                        data,
                        side,
                        &mut outcome.table,
                        options.max_decoded_stream_bytes,
                    )?;
                }
            }
        }

        if outcome.root.is_none() {
            outcome.root = root_from_trailer(&trailer);
        }
        if let Some(prev) = trailer.get("Prev") {
            next = Some(section_offset(data, prev, "Prev", offset)?);
        }
        if outcome.trailer.is_none() {
            outcome.trailer = Some(trailer);
        }
    }

    outcome.sections = visited.len();
    log::debug!(
        "cross-reference chain: {} sections, {} entries",
        outcome.sections,
        outcome.table.len()
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xref::XrefEntry;
    use pretty_assertions::assert_eq;

    fn table_section(records: &[(u32, usize)], trailer: &str) -> String {
        let mut out = String::from("xref\n");
        for (num, offset) in records {
            out.push_str(&format!("{num} 1\n{offset:010} 00000 n\r\n"));
        }
        out.push_str(&format!("trailer\n{trailer}\n"));
        out
    }

    #[test]
    fn newer_sections_win() {
        let mut data = String::from("%PDF-1.4\n");
        let old = data.len();
        data.push_str(&table_section(&[(7, 100)], "<< /Size 8 /Root 1 0 R >>"));
        let new = data.len();
        data.push_str(&table_section(
            &[(7, 200)],
            &format!("<< /Size 8 /Prev {old} /Root 2 0 R >>"),
        ));

        let outcome = walk_chain(data.as_bytes(), new, &OpenOptions::default()).unwrap();
        assert_eq!(outcome.sections, 2);
        assert_eq!(
            outcome.table.get(7),
            Some(XrefEntry::Direct {
                offset: 200,
                generation: 0
            })
        );
        assert_eq!(outcome.root, Some(ObjRef::new(2, 0)));
        assert_eq!(outcome.loop_at, None);
    }

    #[test]
    fn prev_cycle_stops_the_walk() {
        // Both sections point at each other.
        let mut data = String::from("%PDF-1.4\n");
        let a = data.len();
        let a_text = table_section(&[(1, 10)], "<< /Size 3 /Prev BBBBB /Root 1 0 R >>");
        let b = a + a_text.len();
        data.push_str(&a_text.replace("BBBBB", &format!("{b:05}")));
        data.push_str(&table_section(
            &[(2, 20)],
            &format!("<< /Size 3 /Prev {a:05} >>"),
        ));

        let outcome = walk_chain(data.as_bytes(), a, &OpenOptions::default()).unwrap();
        assert_eq!(outcome.loop_at, Some(a));
        assert_eq!(outcome.sections, 2);
        assert!(outcome.table.get(2).is_some());
    }

    #[test]
    fn bare_root_number_is_corrected() {
        let mut trailer = Dictionary::new();
        trailer.insert("Root", Object::Integer(4));
        assert_eq!(root_from_trailer(&trailer), Some(ObjRef::new(4, 0)));

        let mut trailer = Dictionary::new();
        trailer.insert("Root", Object::Name("Catalog".into()));
        assert_eq!(root_from_trailer(&trailer), None);
    }

    #[test]
    fn prev_past_eof_is_damage() {
        let data = table_section(&[(1, 10)], "<< /Prev 99999 /Root 1 0 R >>");
        let err = walk_chain(data.as_bytes(), 0, &OpenOptions::default()).unwrap_err();
        assert!(matches!(err, Error::StructuralDamage { .. }), "{err:?}");
    }

    #[test]
    fn start_at_garbage_is_damage() {
        let data = b"%PDF-1.4\nthis is not an xref section\n";
        let err = walk_chain(data, 3, &OpenOptions::default()).unwrap_err();
        assert!(err.is_structural(), "{err:?}");
    }
}
