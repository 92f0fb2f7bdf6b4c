//! Object parser built on [`Lexer`].
//!
//! The parser turns a byte offset into an [`Object`]. It needs help from its owner in two places,
//! both routed through [`Resolver`]: an indirect `/Length` on a stream (which re-enters object
//! resolution) and decryption of string/stream payloads.

use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token};
use crate::object::{Dictionary, Name, ObjRef, Object, Stream};

/// Maximum array/dictionary nesting inside a single object.
pub(crate) const MAX_NESTING: usize = 256;

const ENDSTREAM: &[u8] = b"endstream";

/// Services the parser needs from the document that owns the bytes.
pub(crate) trait Resolver {
    /// Resolve an indirect stream `/Length`. `depth` is the fetch depth of the object being parsed.
    fn resolve_length(&mut self, r: ObjRef, depth: usize) -> Option<i64>;

    /// End offset of the stream whose data starts at `stream_start`, when the index recorded one.
    fn stream_end_fallback(&self, stream_start: usize) -> Option<usize>;

    /// Decrypt a string or stream payload owned by `obj`.
    fn decrypt(&self, obj: ObjRef, data: &mut Vec<u8>);
}

/// Resolver for contexts where indirect lengths and decryption do not apply (trailers,
/// object-stream members, recovery scans).
pub(crate) struct NoResolver;

impl Resolver for NoResolver {
    fn resolve_length(&mut self, _r: ObjRef, _depth: usize) -> Option<i64> {
        None
    }

    fn stream_end_fallback(&self, _stream_start: usize) -> Option<usize> {
        None
    }

    fn decrypt(&self, _obj: ObjRef, _data: &mut Vec<u8>) {}
}

pub(crate) struct Parser<'a, 'r> {
    lexer: Lexer<'a>,
    resolver: &'r mut dyn Resolver,
    /// Object whose payloads are decrypted; `None` disables decryption.
    decrypt_as: Option<ObjRef>,
    depth: usize,
}

impl<'a, 'r> Parser<'a, 'r> {
    pub(crate) fn new(data: &'a [u8], offset: usize, resolver: &'r mut dyn Resolver) -> Self {
        Self {
            lexer: Lexer::new(data, offset),
            resolver,
            decrypt_as: None,
            depth: 0,
        }
    }

    pub(crate) fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub(crate) fn with_decryption(mut self, owner: Option<ObjRef>) -> Self {
        self.decrypt_as = owner;
        self
    }

    /// Parse `num gen obj <object>` and require the header to name `expected` exactly.
    pub(crate) fn parse_indirect_object(&mut self, expected: ObjRef) -> Result<Object> {
        let start = self.lexer.position();
        let num = self.lexer.next_token();
        let gen = self.lexer.next_token();
        let keyword = self.lexer.next_token();

        let header_matches = matches!(
            (&num, &gen),
            (Token::Integer(n), Token::Integer(g))
                if *n == i64::from(expected.num) && *g == i64::from(expected.gen)
        ) && keyword.is_keyword(b"obj");
        if !header_matches {
            return Err(Error::damaged(
                start,
                format!("expected object header `{} {} obj`", expected.num, expected.gen),
            ));
        }

        self.parse_object_allowing_stream()
    }

    /// Parse a single object; a dictionary followed by `stream` is read as a stream.
    pub(crate) fn parse_object_allowing_stream(&mut self) -> Result<Object> {
        let obj = self.parse_object()?;
        if let Object::Dictionary(dict) = obj {
            if self.lexer.peek_token().is_keyword(b"stream") {
                self.lexer.next_token();
                return self.parse_stream_body(dict).map(Object::Stream);
            }
            return Ok(Object::Dictionary(dict));
        }
        Ok(obj)
    }

    pub(crate) fn parse_object(&mut self) -> Result<Object> {
        self.parse_nested(0)
    }

    fn parse_nested(&mut self, nesting: usize) -> Result<Object> {
        if nesting > MAX_NESTING {
            return Err(Error::damaged(
                self.lexer.position(),
                format!("objects nested deeper than {MAX_NESTING}"),
            ));
        }

        let start = self.lexer.position();
        match self.lexer.next_token() {
            Token::Integer(value) => Ok(self
                .try_reference(value)
                .map_or(Object::Integer(value), Object::Reference)),
            Token::Real(value) => Ok(Object::Real(value)),
            Token::String(mut bytes) | Token::HexString(mut bytes) => {
                if let Some(owner) = self.decrypt_as {
                    self.resolver.decrypt(owner, &mut bytes);
                }
                Ok(Object::String(bytes))
            }
            Token::Name(name) => Ok(Object::Name(Name(name))),
            Token::ArrayStart => {
                let mut items = Vec::new();
                loop {
                    match self.lexer.peek_token() {
                        Token::ArrayEnd => {
                            self.lexer.next_token();
                            return Ok(Object::Array(items));
                        }
                        Token::Eof => {
                            return Err(Error::damaged(start, "unterminated array"));
                        }
                        _ => items.push(self.parse_nested(nesting + 1)?),
                    }
                }
            }
            Token::DictStart => self.parse_dict_body(start, nesting).map(Object::Dictionary),
            Token::Keyword(b"true") => Ok(Object::Bool(true)),
            Token::Keyword(b"false") => Ok(Object::Bool(false)),
            Token::Keyword(b"null") => Ok(Object::Null),
            Token::Keyword(other) => Err(Error::damaged(
                start,
                format!("unexpected keyword `{}`", String::from_utf8_lossy(other)),
            )),
            Token::ArrayEnd | Token::DictEnd => {
                Err(Error::damaged(start, "unexpected closing delimiter"))
            }
            Token::Eof => Err(Error::damaged(start, "unexpected end of data")),
        }
    }

    fn parse_dict_body(&mut self, start: usize, nesting: usize) -> Result<Dictionary> {
        let mut dict = Dictionary::new();
        loop {
            match self.lexer.next_token() {
                Token::DictEnd => return Ok(dict),
                Token::Name(key) => match self.lexer.peek_token() {
                    // `<< /Key >>`: a key without a value reads as null.
                    Token::DictEnd => dict.insert(Name(key), Object::Null),
                    _ => {
                        let value = self.parse_nested(nesting + 1)?;
                        dict.insert(Name(key), value);
                    }
                },
                Token::Eof => return Err(Error::damaged(start, "unterminated dictionary")),
                other => {
                    log::debug!("skipping non-name dictionary key {other:?} at offset {start}");
                }
            }
        }
    }

    /// After an integer, consume `gen R` if present.
    fn try_reference(&mut self, num: i64) -> Option<ObjRef> {
        let saved = self.lexer.position();
        let gen = self.lexer.next_token();
        let keyword = self.lexer.next_token();
        if let (Token::Integer(gen), true) = (gen, keyword.is_keyword(b"R")) {
            if let (Ok(num), Ok(gen)) = (u32::try_from(num), u16::try_from(gen)) {
                return Some(ObjRef::new(num, gen));
            }
        }
        self.lexer.set_position(saved);
        None
    }

    fn parse_stream_body(&mut self, dict: Dictionary) -> Result<Stream> {
        let data = self.lexer.data();
        let mut data_start = self.lexer.position();
        // `stream` is followed by CRLF or LF; a lone CR is tolerated.
        if data.get(data_start) == Some(&b'\r') {
            data_start += 1;
        }
        if data.get(data_start) == Some(&b'\n') {
            data_start += 1;
        }

        let declared = match dict.get("Length") {
            Some(Object::Integer(len)) => Some(*len),
            Some(Object::Reference(r)) => self.resolver.resolve_length(*r, self.depth),
            _ => None,
        };

        let (data_end, resume_at) = match declared.and_then(|len| self.check_length(data_start, len))
        {
            Some(found) => found,
            None => self.find_stream_end(data_start)?,
        };

        let mut payload = data[data_start..data_end].to_vec();
        if let Some(owner) = self.decrypt_as {
            // Cross-reference streams are never encrypted.
            if !dict.is_type("XRef") {
                self.resolver.decrypt(owner, &mut payload);
            }
        }
        self.lexer.set_position(resume_at);
        Ok(Stream {
            dict,
            data: payload,
        })
    }

    /// Accept a declared length only if `endstream` follows the data.
    fn check_length(&self, data_start: usize, len: i64) -> Option<(usize, usize)> {
        let data = self.lexer.data();
        let len = usize::try_from(len).ok()?;
        let data_end = data_start.checked_add(len)?;
        if data_end > data.len() {
            return None;
        }
        let mut probe = Lexer::new(data, data_end);
        probe.skip_whitespace();
        let keyword_start = probe.position();
        let keyword_end = keyword_start.checked_add(ENDSTREAM.len())?;
        if data.get(keyword_start..keyword_end)? == ENDSTREAM {
            Some((data_end, keyword_end))
        } else {
            None
        }
    }

    /// Locate the stream end when `/Length` is missing or incredible.
    fn find_stream_end(&self, data_start: usize) -> Result<(usize, usize)> {
        let data = self.lexer.data();
        let keyword_start = match self.resolver.stream_end_fallback(data_start) {
            Some(end) if end >= data_start && end <= data.len() => end,
            _ => find_subslice(&data[data_start..], ENDSTREAM)
                .and_then(|rel| data_start.checked_add(rel))
                .ok_or_else(|| Error::damaged(data_start, "stream has no `endstream`"))?,
        };

        let mut data_end = keyword_start;
        if data_end > data_start && data[data_end - 1] == b'\n' {
            data_end -= 1;
        }
        if data_end > data_start && data[data_end - 1] == b'\r' {
            data_end -= 1;
        }
        let resume_at = keyword_start
            .saturating_add(ENDSTREAM.len())
            .min(data.len());
        Ok((data_end, resume_at))
    }
}

pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse a standalone object (no stream support, no resolution) at `offset`.
pub(crate) fn parse_object_at(data: &[u8], offset: usize) -> Result<Object> {
    let mut resolver = NoResolver;
    Parser::new(data, offset, &mut resolver).parse_object()
}
