//! Cross-reference streams (`/Type /XRef`).
//!
//! The stream payload is a run of fixed-width big-endian records. `/W [t o g]` gives the byte
//! width of each field and `/Index [first count ...]` the object-number ranges they cover
//! (default `[0 Size]`). Field meaning depends on the record type:
//!
//! | type | field 2 | field 3 |
//! |------|---------|---------|
//! | 0 (free) | next free object | generation |
//! | 1 (direct) | byte offset | generation |
//! | 2 (grouped) | object stream number | index within the stream |

use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token};
use crate::object::{Dictionary, Object};
use crate::parser::{NoResolver, Parser};

use super::entries::{XrefEntry, XrefTable};

/// Widest field we decode (a `u64`).
const MAX_FIELD_WIDTH: usize = 8;

/// Field widths and subsection ranges of one cross-reference stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct XrefStreamLayout {
    pub(crate) widths: [usize; 3],
    pub(crate) subsections: Vec<(usize, usize)>,
}

impl XrefStreamLayout {
    /// Validate `/W`, `/Size` and `/Index`. Ranges past `max_entries` are rejected here, before
    /// any entry storage is grown.
    pub(crate) fn from_dict(dict: &Dictionary, offset: usize, max_entries: usize) -> Result<Self> {
        let widths = match dict.get("W").and_then(Object::as_array) {
            Some([t, o, g]) => {
                let mut widths = [0usize; 3];
                for (slot, value) in widths.iter_mut().zip([t, o, g]) {
                    *slot = value
                        .as_int()
                        .and_then(|w| usize::try_from(w).ok())
                        .filter(|w| *w <= MAX_FIELD_WIDTH)
                        .ok_or_else(|| {
                            Error::damaged(offset, format!("invalid /W field width {value:?}"))
                        })?;
                }
                widths
            }
            _ => return Err(Error::damaged(offset, "/W must be an array of three integers")),
        };
        if widths.iter().all(|w| *w == 0) {
            return Err(Error::damaged(offset, "/W describes zero-width records"));
        }

        let size = dict
            .get_int("Size")
            .ok_or_else(|| Error::damaged(offset, "cross-reference stream has no /Size"))?;
        let size = usize::try_from(size)
            .map_err(|_| Error::damaged(offset, format!("negative /Size {size}")))?;

        let subsections = match dict.get("Index") {
            None => vec![(0, size)],
            Some(Object::Array(items)) => {
                if items.len() % 2 != 0 {
                    return Err(Error::damaged(offset, "/Index has an odd number of elements"));
                }
                let mut out = Vec::with_capacity(items.len() / 2);
                for pair in items.chunks_exact(2) {
                    let (Some(first), Some(count)) = (pair[0].as_int(), pair[1].as_int()) else {
                        return Err(Error::damaged(offset, "/Index entries must be integers"));
                    };
                    let first = usize::try_from(first).map_err(|_| {
                        Error::damaged(offset, format!("negative /Index start {first}"))
                    })?;
                    let count = usize::try_from(count).map_err(|_| {
                        Error::damaged(offset, format!("negative /Index count {count}"))
                    })?;
                    out.push((first, count));
                }
                out
            }
            Some(_) => return Err(Error::damaged(offset, "/Index must be an array")),
        };

        for &(first, count) in &subsections {
            let end = first.checked_add(count).ok_or(Error::Overflow {
                context: "xref stream subsection range",
            })?;
            if end > max_entries {
                return Err(Error::LimitExceeded {
                    what: "cross-reference entry count",
                    limit: max_entries as u64,
                });
            }
        }

        Ok(Self {
            widths,
            subsections,
        })
    }

    pub(crate) fn record_len(&self) -> usize {
        self.widths.iter().sum()
    }
}

fn read_field(raw: &[u8]) -> u64 {
    raw.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

/// Decode one record. `None` means an unknown type, which reads as a null reference.
pub(crate) fn decode_record(widths: [usize; 3], raw: &[u8]) -> Result<Option<XrefEntry>> {
    let (t, rest) = raw.split_at(widths[0]);
    let (f2, f3) = rest.split_at(widths[1]);
    // An absent type field defaults to 1.
    let kind = if widths[0] == 0 { 1 } else { read_field(t) };
    let f2 = read_field(f2);
    let f3 = read_field(f3);

    let entry = match kind {
        0 => XrefEntry::Free {
            next: f2,
            generation: u16::try_from(f3).unwrap_or(u16::MAX),
        },
        1 => XrefEntry::Direct {
            offset: usize::try_from(f2).map_err(|_| Error::Overflow {
                context: "xref stream byte offset",
            })?,
            generation: u16::try_from(f3).map_err(|_| Error::Overflow {
                context: "xref stream generation",
            })?,
        },
        2 => XrefEntry::Grouped {
            host: u32::try_from(f2).map_err(|_| Error::Overflow {
                context: "object stream number",
            })?,
            slot: u32::try_from(f3).map_err(|_| Error::Overflow {
                context: "object stream index",
            })?,
        },
        _ => return Ok(None),
    };
    Ok(Some(entry))
}

/// Parse the cross-reference stream object at `offset` into `table`, returning its dictionary
/// (which doubles as the section trailer).
pub(crate) fn parse_xref_stream_section(
    data: &[u8],
    offset: usize,
    table: &mut XrefTable,
    max_decoded_bytes: usize,
) -> Result<Dictionary> {
    let mut lexer = Lexer::new(data, offset);
    let header = (lexer.next_token(), lexer.next_token(), lexer.next_token());
    if !matches!(header, (Token::Integer(_), Token::Integer(_), ref kw) if kw.is_keyword(b"obj")) {
        return Err(Error::damaged(offset, "expected `<num> <gen> obj` header"));
    }

    let mut resolver = NoResolver;
    let obj = Parser::new(data, lexer.position(), &mut resolver).parse_object_allowing_stream()?;
    let Object::Stream(stream) = obj else {
        return Err(Error::damaged(
            offset,
            format!("cross-reference stream is a {}", obj.type_name()),
        ));
    };

    let layout = XrefStreamLayout::from_dict(&stream.dict, offset, table.max_entries())?;
    let decoded = stream.decoded(max_decoded_bytes)?;
    let record_len = layout.record_len();

    let mut cursor = 0usize;
    for &(first, count) in &layout.subsections {
        let len = count.checked_mul(record_len).ok_or(Error::Overflow {
            context: "xref stream subsection length",
        })?;
        let end = cursor.checked_add(len).ok_or(Error::Overflow {
            context: "xref stream subsection length",
        })?;
        let records = decoded.get(cursor..end).ok_or_else(|| {
            Error::damaged(
                offset,
                format!(
                    "xref stream holds {} bytes, subsection {first}+{count} needs {end}",
                    decoded.len()
                ),
            )
        })?;

        table.ensure_len(first + count)?;
        for (i, raw) in records.chunks_exact(record_len).enumerate() {
            if let Some(entry) = decode_record(layout.widths, raw)? {
                table.set_if_vacant(first + i, entry)?;
            }
        }
        cursor = end;
    }

    Ok(stream.dict)
}
