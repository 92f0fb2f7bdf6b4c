//! Object streams (`/Type /ObjStm`) and the small MRU cache of decoded ones.
//!
//! The decoded payload starts with `N` pairs of integers (`member-number offset`), followed at
//! byte `/First` by the members themselves. Offsets are relative to `/First`.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token};
use crate::object::{Object, Stream};
use crate::parser::{NoResolver, Parser};

/// One decoded object stream.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ObjectStream {
    host: u32,
    members: Vec<(u32, Object)>,
}

fn header_int(host: u32, stream: &Stream, key: &str) -> Result<usize> {
    let value = stream
        .dict
        .get_int(key)
        .ok_or_else(|| Error::damaged(0, format!("object stream {host} has no /{key}")))?;
    usize::try_from(value)
        .map_err(|_| Error::damaged(0, format!("object stream {host} has negative /{key} {value}")))
}

impl ObjectStream {
    /// Decode `stream` (the body of object `host`) and parse every member.
    ///
    /// Errors carry offsets into the decoded payload.
    pub(crate) fn parse(
        host: u32,
        stream: &Stream,
        max_members: usize,
        max_decoded_bytes: usize,
    ) -> Result<Self> {
        let count = header_int(host, stream, "N")?;
        let first = header_int(host, stream, "First")?;
        if count > max_members {
            return Err(Error::LimitExceeded {
                what: "object stream member count",
                limit: max_members as u64,
            });
        }

        let data = stream.decoded(max_decoded_bytes)?;
        if first > data.len() {
            return Err(Error::damaged(
                first,
                format!("object stream {host}: /First is past the {} decoded bytes", data.len()),
            ));
        }
        // Each header pair takes at least four bytes, so a count this large cannot be real.
        if count > first {
            return Err(Error::damaged(
                0,
                format!("object stream {host}: /N {count} does not fit in a {first}-byte header"),
            ));
        }

        let header = &data[..first];
        let mut lexer = Lexer::new(header, 0);
        let mut index = Vec::with_capacity(count);
        let mut last_offset = 0usize;
        for slot in 0..count {
            let at = lexer.position();
            let (Token::Integer(num), Token::Integer(offset)) = (lexer.next_token(), lexer.next_token())
            else {
                return Err(Error::damaged(
                    at,
                    format!("object stream {host}: header pair {slot} is not two integers"),
                ));
            };
            let num = u32::try_from(num).map_err(|_| {
                Error::damaged(at, format!("object stream {host}: bad member number {num}"))
            })?;
            let offset = usize::try_from(offset)
                .ok()
                .and_then(|offset| first.checked_add(offset))
                .filter(|start| *start <= data.len())
                .ok_or_else(|| {
                    Error::damaged(at, format!("object stream {host}: bad member offset {offset}"))
                })?;
            if offset < last_offset {
                return Err(Error::damaged(
                    at,
                    format!("object stream {host}: member offsets go backwards"),
                ));
            }
            last_offset = offset;
            index.push((num, offset));
        }

        let mut members = Vec::with_capacity(count);
        for (i, &(num, start)) in index.iter().enumerate() {
            let end = index.get(i + 1).map_or(data.len(), |(_, next)| *next);
            let mut resolver = NoResolver;
            let obj = Parser::new(&data[..end], start, &mut resolver).parse_object()?;
            members.push((num, obj));
        }

        log::debug!("decoded object stream {host} with {count} members");
        Ok(Self { host, members })
    }

    pub(crate) fn host(&self) -> u32 {
        self.host
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    pub(crate) fn member_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.members.iter().map(|(num, _)| *num)
    }

    /// Member at `slot`, but only if it really is object `expected`.
    pub(crate) fn member(&self, slot: u32, expected: u32) -> Option<&Object> {
        let (num, obj) = self.members.get(slot as usize)?;
        if *num != expected {
            log::warn!(
                "object stream {} slot {slot} holds object {num}, not {expected}",
                self.host
            );
            return None;
        }
        Some(obj)
    }
}

/// Most-recently-used cache of decoded object streams, keyed by host object number.
pub(crate) struct ObjectStreamCache {
    streams: LruCache<u32, ObjectStream>,
}

impl ObjectStreamCache {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            streams: LruCache::new(capacity),
        }
    }

    /// Look up `host`, promoting it to most recently used.
    pub(crate) fn get(&mut self, host: u32) -> Option<&ObjectStream> {
        self.streams.get(&host)
    }

    /// Insert a decoded stream at the front, evicting the least recently used one when full.
    pub(crate) fn insert(&mut self, stream: ObjectStream) {
        let host = stream.host;
        if let Some((evicted, _)) = self.streams.push(host, stream) {
            if evicted != host {
                log::debug!("evicted object stream {evicted} from cache");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.streams.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, host: u32) -> bool {
        self.streams.contains(&host)
    }
}
