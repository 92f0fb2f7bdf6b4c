//! Rebuild the cross-reference index by scanning the whole file.
//!
//! Used when the section chain is missing, damaged or has no root. The scan is line oriented:
//! `N G obj` headers become direct entries, the first `trailer` carrying a `/Root` reference
//! becomes the trailer, and every `endstream` position is kept so that streams with unreliable
//! `/Length` values can still be delimited.
//!
//! Each line is examined at most once and dictionaries are only parsed within a fixed window,
//! so the scan stays linear in the file size.

use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token};
use crate::object::{Dictionary, ObjRef, Object};
use crate::object_stream::ObjectStream;
use crate::options::OpenOptions;
use crate::parser::{find_subslice, parse_object_at, Parser, Resolver};
use crate::xref::{XrefEntry, XrefTable};

const TRAILER: &[u8] = b"trailer";
const ENDSTREAM: &[u8] = b"endstream";

/// Bytes a trailer or object dictionary may span before the scan gives up on it.
const DICT_WINDOW: usize = 4096;

/// Index rebuilt from a full scan.
#[derive(Debug)]
pub(crate) struct Recovered {
    pub(crate) table: XrefTable,
    pub(crate) trailer: Dictionary,
    pub(crate) root: ObjRef,
    /// Sorted offsets of every `endstream` keyword.
    pub(crate) stream_ends: Vec<usize>,
}

/// Resolver for the post-pass: stream bodies end at the recorded `endstream` offsets.
struct RecordedEnds<'a>(&'a [usize]);

impl Resolver for RecordedEnds<'_> {
    fn resolve_length(&mut self, _r: ObjRef, _depth: usize) -> Option<i64> {
        None
    }

    fn stream_end_fallback(&self, stream_start: usize) -> Option<usize> {
        let idx = self.0.partition_point(|end| *end < stream_start);
        self.0.get(idx).copied()
    }

    fn decrypt(&self, _obj: ObjRef, _data: &mut Vec<u8>) {}
}

/// Objects whose dictionaries matter after the scan.
#[derive(Default)]
struct Candidates {
    object_streams: Vec<(ObjRef, usize)>,
    xref_streams: Vec<Dictionary>,
}

fn line_starts(data: &[u8]) -> impl Iterator<Item = usize> + '_ {
    std::iter::once(0).chain(
        data.iter()
            .enumerate()
            .filter(|(_, b)| matches!(b, b'\r' | b'\n'))
            .map(|(i, _)| i + 1)
            .filter(move |start| *start < data.len() && !matches!(data[*start], b'\r' | b'\n')),
    )
}

/// `data` truncated to at most [`DICT_WINDOW`] bytes past `from`.
fn dict_window(data: &[u8], from: usize) -> &[u8] {
    &data[..from.saturating_add(DICT_WINDOW).min(data.len())]
}

/// Offset of the first byte at or after `at` that is not a space, tab, form feed or NUL.
fn skip_blanks(data: &[u8], at: usize) -> usize {
    data.get(at..)
        .and_then(|rest| rest.iter().position(|b| !matches!(b, b' ' | b'\t' | b'\x0C' | b'\0')))
        .map_or(data.len(), |i| at + i)
}

fn line_end(data: &[u8], at: usize) -> usize {
    data.get(at..)
        .and_then(|rest| rest.iter().position(|b| matches!(b, b'\r' | b'\n')))
        .map_or(data.len(), |i| at + i)
}

fn trailer_root(trailer: &Dictionary) -> Option<ObjRef> {
    trailer.get("Root").and_then(Object::as_reference)
}

/// `N G obj` at `at`, all on one line: returns the reference and the position after `obj`.
fn object_header(data: &[u8], at: usize) -> Option<(ObjRef, usize)> {
    let mut lexer = Lexer::new(&data[..line_end(data, at)], at);
    let (Token::Integer(num), Token::Integer(gen)) = (lexer.next_token(), lexer.next_token()) else {
        return None;
    };
    if !lexer.next_token().is_keyword(b"obj") {
        return None;
    }
    let r = ObjRef::new(u32::try_from(num).ok()?, u16::try_from(gen).ok()?);
    Some((r, lexer.position()))
}

fn record_stream_ends(data: &[u8]) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut from = 0usize;
    while let Some(rel) = data.get(from..).and_then(|rest| find_subslice(rest, ENDSTREAM)) {
        let at = from + rel;
        ends.push(at);
        from = at + ENDSTREAM.len();
    }
    ends
}

/// Peek at the dictionary after an object header, keeping the ones the post-pass needs.
fn note_candidate(data: &[u8], r: ObjRef, at: usize, body: usize, candidates: &mut Candidates) {
    let window = dict_window(data, body);
    let mut lexer = Lexer::new(window, body);
    if lexer.next_token() != Token::DictStart {
        return;
    }
    let Ok(Object::Dictionary(dict)) = parse_object_at(window, body) else {
        return;
    };
    if dict.is_type("ObjStm") {
        candidates.object_streams.push((r, at));
    } else if dict.is_type("XRef") {
        candidates.xref_streams.push(dict);
    }
}

/// Add members of a scanned object stream for numbers no direct body claimed.
fn add_object_stream_members(
    data: &[u8],
    host: ObjRef,
    at: usize,
    stream_ends: &[usize],
    table: &mut XrefTable,
    options: &OpenOptions,
) -> Result<()> {
    let mut resolver = RecordedEnds(stream_ends);
    let obj = Parser::new(data, at, &mut resolver).parse_indirect_object(host)?;
    let Object::Stream(stream) = obj else {
        return Err(Error::damaged(at, "object stream is not a stream"));
    };
    let parsed = ObjectStream::parse(
        host.num,
        &stream,
        options.max_object_stream_members,
        options.max_decoded_stream_bytes,
    )?;
    for (slot, num) in parsed.member_numbers().enumerate() {
        let slot = u32::try_from(slot).map_err(|_| Error::Overflow {
            context: "object stream slot",
        })?;
        table.set_if_vacant(
            num as usize,
            XrefEntry::Grouped {
                host: parsed.host(),
                slot,
            },
        )?;
    }
    Ok(())
}

/// Scan `data` from the start and rebuild the index.
///
/// Fails with [`Error::NoRoot`] when no trailer (or cross-reference stream dictionary) names a
/// root; nothing else about the file is fatal here.
pub(crate) fn reconstruct(data: &[u8], options: &OpenOptions) -> Result<Recovered> {
    log::warn!("reconstructing cross-reference index from {} bytes", data.len());

    let mut table = XrefTable::new(options.max_xref_entries);
    let mut trailer: Option<(Dictionary, ObjRef)> = None;
    let mut candidates = Candidates::default();

    for start in line_starts(data) {
        let at = skip_blanks(data, start);
        let Some(&first) = data.get(at) else {
            continue;
        };

        if data[at..].starts_with(TRAILER) {
            if trailer.is_some() {
                continue;
            }
            let dict_at = at + TRAILER.len();
            if let Ok(Object::Dictionary(dict)) =
                parse_object_at(dict_window(data, dict_at), dict_at)
            {
                if let Some(root) = trailer_root(&dict) {
                    trailer = Some((dict, root));
                }
            }
        } else if first.is_ascii_digit() {
            let Some((r, body)) = object_header(data, at) else {
                continue;
            };
            let entry = XrefEntry::Direct {
                offset: at,
                generation: r.gen,
            };
            if let Err(err) = table.set_if_newer_generation(r.num as usize, entry) {
                log::debug!("skipping object {r} at offset {at}: {err}");
                continue;
            }
            note_candidate(data, r, at, body, &mut candidates);
        }
    }

    let stream_ends = record_stream_ends(data);
    for (host, at) in candidates.object_streams {
        // Only the body the table settled on is authoritative for this number.
        if table.get(host.num as usize)
            != Some(XrefEntry::Direct {
                offset: at,
                generation: host.gen,
            })
        {
            continue;
        }
        if stream_ends.last().map_or(true, |last| *last < at) {
            log::debug!("object stream {host} at offset {at} has no `endstream`");
            continue;
        }
        let added = add_object_stream_members(data, host, at, &stream_ends, &mut table, options);
        if let Err(err) = added {
            log::warn!("ignoring damaged object stream {host} at offset {at}: {err}");
        }
    }

    let (trailer, root) = match trailer {
        Some(found) => found,
        None => candidates
            .xref_streams
            .into_iter()
            .find_map(|dict| trailer_root(&dict).map(|root| (dict, root)))
            .ok_or(Error::NoRoot)?,
    };

    log::debug!(
        "reconstructed {} entries, root {root}, {} stream ends",
        table.len(),
        stream_ends.len()
    );
    Ok(Recovered {
        table,
        trailer,
        root,
        stream_ends,
    })
}
