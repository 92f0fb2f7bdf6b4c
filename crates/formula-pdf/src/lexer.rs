//! PDF tokenizer.
//!
//! The lexer is deliberately forgiving: unterminated strings end at EOF, stray delimiters are
//! surfaced as one-byte keywords, and numbers that overflow `i64` degrade to reals. Callers decide
//! whether a token sequence makes sense.

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token<'a> {
    Integer(i64),
    Real(f64),
    String(Vec<u8>),
    HexString(Vec<u8>),
    Name(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    Keyword(&'a [u8]),
    Eof,
}

impl Token<'_> {
    pub(crate) fn is_keyword(&self, keyword: &[u8]) -> bool {
        matches!(self, Token::Keyword(k) if *k == keyword)
    }
}

pub(crate) fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

pub(crate) struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Create a lexer positioned at `pos` (clamped to the end of `data`).
    pub(crate) fn new(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    pub(crate) fn data(&self) -> &'a [u8] {
        self.data
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Skip whitespace and `%` comments.
    pub(crate) fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek_byte() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(b) = self.peek_byte() {
                    if b == b'\r' || b == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Return the next token without consuming it.
    pub(crate) fn peek_token(&mut self) -> Token<'a> {
        let saved = self.pos;
        let token = self.next_token();
        self.pos = saved;
        token
    }

    pub(crate) fn next_token(&mut self) -> Token<'a> {
        self.skip_whitespace();
        let Some(b) = self.peek_byte() else {
            return Token::Eof;
        };

        match b {
            b'[' => {
                self.pos += 1;
                Token::ArrayStart
            }
            b']' => {
                self.pos += 1;
                Token::ArrayEnd
            }
            b'<' => {
                if self.data.get(self.pos + 1) == Some(&b'<') {
                    self.pos += 2;
                    Token::DictStart
                } else {
                    self.pos += 1;
                    self.lex_hex_string()
                }
            }
            b'>' => {
                if self.data.get(self.pos + 1) == Some(&b'>') {
                    self.pos += 2;
                    Token::DictEnd
                } else {
                    self.single_byte_keyword()
                }
            }
            b'(' => {
                self.pos += 1;
                self.lex_literal_string()
            }
            b'/' => {
                self.pos += 1;
                self.lex_name()
            }
            b'0'..=b'9' | b'+' | b'-' | b'.' => self.lex_number(),
            b')' | b'{' | b'}' => self.single_byte_keyword(),
            _ => {
                let start = self.pos;
                while self.peek_byte().is_some_and(is_regular) {
                    self.pos += 1;
                }
                Token::Keyword(&self.data[start..self.pos])
            }
        }
    }

    fn single_byte_keyword(&mut self) -> Token<'a> {
        let start = self.pos;
        self.pos += 1;
        Token::Keyword(&self.data[start..self.pos])
    }

    fn lex_number(&mut self) -> Token<'a> {
        let start = self.pos;
        while self.peek_byte().is_some_and(is_regular) {
            self.pos += 1;
        }
        let raw = &self.data[start..self.pos];
        let Ok(text) = std::str::from_utf8(raw) else {
            return Token::Keyword(raw);
        };

        if !text.contains('.') {
            if let Ok(value) = text.parse::<i64>() {
                return Token::Integer(value);
            }
        }
        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Token::Real(value),
            // Producers emit things like `--3` or `1.2.3`; keep them visible as keywords so the
            // parser can reject them in context.
            _ => Token::Keyword(raw),
        }
    }

    fn lex_name(&mut self) -> Token<'a> {
        let mut out = Vec::new();
        while let Some(b) = self.peek_byte() {
            if !is_regular(b) {
                break;
            }
            self.pos += 1;
            if b == b'#' {
                let hi = self.data.get(self.pos).copied().and_then(hex_value);
                let lo = self.data.get(self.pos + 1).copied().and_then(hex_value);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    out.push((hi << 4) | lo);
                    self.pos += 2;
                    continue;
                }
            }
            out.push(b);
        }
        Token::Name(out)
    }

    fn lex_hex_string(&mut self) -> Token<'a> {
        let mut out = Vec::new();
        let mut pending: Option<u8> = None;
        while let Some(b) = self.peek_byte() {
            self.pos += 1;
            if b == b'>' {
                break;
            }
            let Some(nibble) = hex_value(b) else {
                continue;
            };
            match pending.take() {
                Some(hi) => out.push((hi << 4) | nibble),
                None => pending = Some(nibble),
            }
        }
        if let Some(hi) = pending {
            out.push(hi << 4);
        }
        Token::HexString(out)
    }

    fn lex_literal_string(&mut self) -> Token<'a> {
        let mut out = Vec::new();
        let mut depth = 1usize;
        while let Some(b) = self.peek_byte() {
            self.pos += 1;
            match b {
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(b);
                }
                b'\\' => self.lex_escape(&mut out),
                b'\r' => {
                    // Bare CR and CRLF both read as a single LF.
                    if self.peek_byte() == Some(b'\n') {
                        self.pos += 1;
                    }
                    out.push(b'\n');
                }
                _ => out.push(b),
            }
        }
        Token::String(out)
    }

    fn lex_escape(&mut self, out: &mut Vec<u8>) {
        let Some(b) = self.peek_byte() else {
            return;
        };
        self.pos += 1;
        match b {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'0'..=b'7' => {
                let mut value = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.peek_byte() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            }
            b'\r' => {
                if self.peek_byte() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            b'\n' => {}
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &[u8]) -> Vec<Token<'_>> {
        let mut lexer = Lexer::new(input, 0);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            if token == Token::Eof {
                return out;
            }
            out.push(token);
        }
    }

    #[test]
    fn lexes_object_header_and_dictionary() {
        let toks = tokens(b"12 0 obj\n<< /Type /Catalog /Count -3 /Scale 1.5 >>\nendobj");
        assert_eq!(
            toks,
            vec![
                Token::Integer(12),
                Token::Integer(0),
                Token::Keyword(b"obj"),
                Token::DictStart,
                Token::Name(b"Type".to_vec()),
                Token::Name(b"Catalog".to_vec()),
                Token::Name(b"Count".to_vec()),
                Token::Integer(-3),
                Token::Name(b"Scale".to_vec()),
                Token::Real(1.5),
                Token::DictEnd,
                Token::Keyword(b"endobj"),
            ]
        );
    }

    #[test]
    fn literal_strings_handle_escapes_and_nesting() {
        let toks = tokens(b"(a\\(b\\) (nested) \\101\\\nc\r\nd)");
        assert_eq!(toks, vec![Token::String(b"a(b) (nested) Ac\nd".to_vec())]);
    }

    #[test]
    fn hex_strings_pad_odd_nibbles_and_skip_whitespace() {
        assert_eq!(
            tokens(b"<48 65 6c6C 6>"),
            vec![Token::HexString(vec![0x48, 0x65, 0x6c, 0x6c, 0x60])]
        );
    }

    #[test]
    fn names_decode_hash_escapes() {
        assert_eq!(
            tokens(b"/A#20B /C#zz"),
            vec![Token::Name(b"A B".to_vec()), Token::Name(b"C#zz".to_vec())]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            tokens(b"%PDF-1.7\n%\xE2\xE3\n1 % trailing\n2"),
            vec![Token::Integer(1), Token::Integer(2)]
        );
    }

    #[test]
    fn malformed_numbers_surface_as_keywords() {
        assert_eq!(tokens(b"--3"), vec![Token::Keyword(b"--3")]);
        assert_eq!(
            tokens(b"99999999999999999999"),
            vec![Token::Real(99999999999999999999.0)]
        );
    }

    #[test]
    fn unterminated_string_stops_at_eof() {
        assert_eq!(tokens(b"(abc"), vec![Token::String(b"abc".to_vec())]);
    }
}
