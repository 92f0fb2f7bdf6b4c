//! Classic `xref` table sections.
//!
//! ```text
//! xref
//! 0 3
//! 0000000000 65535 f\r\n
//! 0000000015 00000 n\r\n
//! 0000000079 00000 n\r\n
//! trailer
//! << /Size 3 /Root 1 0 R >>
//! ```
//!
//! Every record is exactly 20 bytes. Anything else means the section is damaged and the whole
//! section is rejected.

use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token};
use crate::object::{Dictionary, Object};
use crate::parser::parse_object_at;

use super::entries::{XrefEntry, XrefTable};

pub(crate) const RECORD_LEN: usize = 20;

fn parse_digits(raw: &[u8]) -> Option<u64> {
    raw.iter().try_fold(0u64, |acc, b| {
        if b.is_ascii_digit() {
            acc.checked_mul(10)?.checked_add(u64::from(b - b'0'))
        } else {
            None
        }
    })
}

/// Decode one fixed-width record (`oooooooooo ggggg n` plus a two-byte end of line).
pub(crate) fn parse_table_record(raw: &[u8]) -> Option<XrefEntry> {
    if raw.len() != RECORD_LEN || raw[10] != b' ' || raw[16] != b' ' {
        return None;
    }
    if !matches!(&raw[18..20], b" \r" | b" \n" | b"\r\n") {
        return None;
    }
    let offset = parse_digits(&raw[0..10])?;
    let generation = parse_digits(&raw[11..16])?;
    match raw[17] {
        b'n' => Some(XrefEntry::Direct {
            offset: usize::try_from(offset).ok()?,
            generation: u16::try_from(generation).ok()?,
        }),
        b'f' => Some(XrefEntry::Free {
            next: offset,
            generation: u16::try_from(generation).unwrap_or(u16::MAX),
        }),
        _ => None,
    }
}

/// Parse the table section at `offset` into `table`, returning its trailer dictionary.
pub(crate) fn parse_xref_table_section(
    data: &[u8],
    offset: usize,
    table: &mut XrefTable,
) -> Result<Dictionary> {
    let mut lexer = Lexer::new(data, offset);
    if !lexer.next_token().is_keyword(b"xref") {
        return Err(Error::damaged(offset, "expected `xref` keyword"));
    }

    loop {
        lexer.skip_whitespace();
        let at = lexer.position();
        match lexer.next_token() {
            Token::Keyword(b"trailer") => {
                return match parse_object_at(data, lexer.position())? {
                    Object::Dictionary(dict) => Ok(dict),
                    other => Err(Error::damaged(
                        at,
                        format!("trailer is a {} instead of a dictionary", other.type_name()),
                    )),
                };
            }
            Token::Integer(first) => {
                let Token::Integer(count) = lexer.next_token() else {
                    return Err(Error::damaged(at, "subsection header is missing its count"));
                };
                parse_subsection(data, &mut lexer, at, first, count, table)?;
            }
            _ => {
                return Err(Error::damaged(
                    at,
                    "expected a subsection header or `trailer`",
                ))
            }
        }
    }
}

fn parse_subsection(
    data: &[u8],
    lexer: &mut Lexer<'_>,
    header_at: usize,
    first: i64,
    count: i64,
    table: &mut XrefTable,
) -> Result<()> {
    let mut first = usize::try_from(first)
        .map_err(|_| Error::damaged(header_at, format!("negative first object number {first}")))?;
    let count = usize::try_from(count)
        .map_err(|_| Error::damaged(header_at, format!("negative entry count {count}")))?;
    let end = first.checked_add(count).ok_or(Error::Overflow {
        context: "xref subsection range",
    })?;
    if end > table.max_entries() {
        return Err(Error::LimitExceeded {
            what: "cross-reference entry count",
            limit: table.max_entries() as u64,
        });
    }

    lexer.skip_whitespace();
    let start = lexer.position();
    let records_end = count
        .checked_mul(RECORD_LEN)
        .and_then(|len| start.checked_add(len))
        .ok_or(Error::Overflow {
            context: "xref subsection length",
        })?;
    let records = data
        .get(start..records_end)
        .ok_or_else(|| Error::damaged(start, format!("xref subsection of {count} entries is truncated")))?;

    // Some producers number a table that starts at object 0 from 1. The tell is object "1" being
    // the free-list head (free, generation 65535) while nothing has claimed object 0.
    if first == 1 && table.is_unset(0) {
        if let Some(XrefEntry::Free {
            generation: 65535,
            ..
        }) = records.get(..RECORD_LEN).and_then(parse_table_record)
        {
            log::debug!("xref subsection at offset {header_at} starts at 1 instead of 0; renumbering");
            first = 0;
        }
    }

    table.ensure_len(first + count)?;
    for (i, raw) in records.chunks_exact(RECORD_LEN).enumerate() {
        let entry = parse_table_record(raw).ok_or_else(|| {
            Error::damaged(start + i * RECORD_LEN, "malformed xref table record")
        })?;
        table.set_if_vacant(first + i, entry)?;
    }

    lexer.set_position(records_end);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> XrefTable {
        XrefTable::new(1000)
    }

    #[test]
    fn record_accepts_all_two_byte_line_endings() {
        for eol in [" \r", " \n", "\r\n"] {
            let raw = format!("0000000017 00000 n{eol}");
            assert_eq!(
                parse_table_record(raw.as_bytes()),
                Some(XrefEntry::Direct {
                    offset: 17,
                    generation: 0
                })
            );
        }
    }

    #[test]
    fn record_rejects_other_widths_and_kinds() {
        assert_eq!(parse_table_record(b"0000000017 00000 n\n"), None);
        assert_eq!(parse_table_record(b"000000017 00000 n \r\n"), None);
        assert_eq!(parse_table_record(b"0000000017 00000 x\r\n"), None);
        assert_eq!(parse_table_record(b"00000000a7 00000 n\r\n"), None);
        assert_eq!(parse_table_record(b"0000000017 70000 n\r\n"), None);
    }

    #[test]
    fn parses_multiple_subsections_and_trailer() {
        let data = b"xref\n0 2\n0000000000 65535 f\r\n0000000010 00000 n\r\n5 1\n0000000099 00002 n\r\ntrailer\n<< /Size 6 /Root 1 0 R >>\nstartxref\n";
        let mut table = table();
        let trailer = parse_xref_table_section(data, 0, &mut table).unwrap();
        assert_eq!(trailer.get_int("Size"), Some(6));
        assert_eq!(
            table.get(1),
            Some(XrefEntry::Direct {
                offset: 10,
                generation: 0
            })
        );
        assert_eq!(
            table.get(5),
            Some(XrefEntry::Direct {
                offset: 99,
                generation: 2
            })
        );
        assert!(table.is_unset(3));
    }

    #[test]
    fn renumbers_tables_that_start_at_one() {
        let data = b"xref\n1 2\n0000000000 65535 f\r\n0000000010 00000 n\r\ntrailer\n<< >>";
        let mut table = table();
        parse_xref_table_section(data, 0, &mut table).unwrap();
        assert!(matches!(table.get(0), Some(XrefEntry::Free { .. })));
        assert_eq!(
            table.get(1),
            Some(XrefEntry::Direct {
                offset: 10,
                generation: 0
            })
        );
    }

    #[test]
    fn keeps_numbering_when_object_zero_is_known() {
        let data = b"xref\n1 1\n0000000000 65535 f\r\ntrailer\n<< >>";
        let mut table = table();
        table
            .set_if_vacant(
                0,
                XrefEntry::Free {
                    next: 0,
                    generation: 65535,
                },
            )
            .unwrap();
        parse_xref_table_section(data, 0, &mut table).unwrap();
        assert!(matches!(table.get(1), Some(XrefEntry::Free { .. })));
    }

    #[test]
    fn truncated_subsection_is_damage() {
        let data = b"xref\n0 3\n0000000000 65535 f\r\ntrailer\n<< >>";
        let err = parse_xref_table_section(data, 0, &mut table()).unwrap_err();
        assert!(matches!(err, Error::StructuralDamage { .. }), "{err:?}");
    }

    #[test]
    fn huge_counts_fail_without_allocating() {
        let data = b"xref\n0 999999999999\n0000000000 65535 f\r\ntrailer\n<< >>";
        let err = parse_xref_table_section(data, 0, &mut table()).unwrap_err();
        assert!(err.is_structural(), "{err:?}");

        let data = b"xref\n9223372036854775807 2\ntrailer\n<< >>";
        let err = parse_xref_table_section(data, 0, &mut table()).unwrap_err();
        assert!(err.is_structural(), "{err:?}");
    }

    #[test]
    fn missing_keyword_is_damage() {
        let err = parse_xref_table_section(b"1 0 obj", 0, &mut table()).unwrap_err();
        assert!(matches!(err, Error::StructuralDamage { offset: 0, .. }));
    }
}
