#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

/// One row of a cross-reference stream.
#[derive(Debug, Clone, Copy)]
pub enum Row {
    Free,
    Direct(usize, u16),
    Grouped(u32, u32),
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Appends objects and cross-reference sections to an in-memory document, remembering where each
/// object body starts.
pub struct DocBuilder {
    out: Vec<u8>,
    offsets: BTreeMap<u32, (usize, u16)>,
}

impl DocBuilder {
    pub fn new() -> Self {
        Self {
            out: b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec(),
            offsets: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.out
    }

    pub fn finish(self) -> Vec<u8> {
        self.out
    }

    pub fn offset_of(&self, num: u32) -> usize {
        self.offsets[&num].0
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.out.extend_from_slice(bytes);
        self
    }

    /// `num gen obj <body> endobj`; returns the body's offset.
    pub fn object(&mut self, num: u32, gen: u16, body: &str) -> usize {
        let at = self.out.len();
        self.out
            .extend_from_slice(format!("{num} {gen} obj\n{body}\nendobj\n").as_bytes());
        self.offsets.insert(num, (at, gen));
        at
    }

    /// A stream object with a direct `/Length`.
    pub fn stream(&mut self, num: u32, dict_entries: &str, data: &[u8]) -> usize {
        let at = self.out.len();
        self.out.extend_from_slice(
            format!(
                "{num} 0 obj\n<< {dict_entries} /Length {} >>\nstream\n",
                data.len()
            )
            .as_bytes(),
        );
        self.out.extend_from_slice(data);
        self.out.extend_from_slice(b"\nendstream\nendobj\n");
        self.offsets.insert(num, (at, 0));
        at
    }

    /// A compressed object stream holding `members` in order.
    pub fn object_stream(&mut self, num: u32, members: &[(u32, &str)]) -> usize {
        let mut header = String::new();
        let mut body = String::new();
        for (member, text) in members {
            header.push_str(&format!("{member} {} ", body.len()));
            body.push_str(text);
            body.push(' ');
        }
        let payload = format!("{header}{body}");
        let dict = format!(
            "/Type /ObjStm /N {} /First {} /Filter /FlateDecode",
            members.len(),
            header.len()
        );
        self.stream(num, &dict, &deflate(payload.as_bytes()))
    }

    /// A classic table listing `nums` (at their recorded offsets) plus the free head at 0.
    pub fn xref_table(&mut self, nums: &[u32], trailer: &str) -> usize {
        let at = self.out.len();
        let mut text = String::from("xref\n0 1\n0000000000 65535 f\r\n");
        for num in nums {
            let (offset, gen) = self.offsets[num];
            text.push_str(&format!("{num} 1\n{offset:010} {gen:05} n\r\n"));
        }
        text.push_str(&format!("trailer\n{trailer}\n"));
        self.out.extend_from_slice(text.as_bytes());
        at
    }

    /// A compressed cross-reference stream with `/W [1 4 2]` and one subsection per row.
    pub fn xref_stream(&mut self, num: u32, rows: &[(u32, Row)], dict_entries: &str) -> usize {
        let mut payload = Vec::new();
        let mut index = String::new();
        for (obj, row) in rows {
            index.push_str(&format!("{obj} 1 "));
            let (kind, f2, f3): (u8, u32, u16) = match *row {
                Row::Free => (0, 0, 65535),
                Row::Direct(offset, gen) => (1, offset as u32, gen),
                Row::Grouped(host, slot) => (2, host, slot as u16),
            };
            payload.push(kind);
            payload.extend_from_slice(&f2.to_be_bytes());
            payload.extend_from_slice(&f3.to_be_bytes());
        }
        let size = rows.iter().map(|(obj, _)| obj + 1).max().unwrap_or(0).max(num + 1);
        let dict = format!(
            "/Type /XRef /W [1 4 2] /Size {size} /Index [{index}] /Filter /FlateDecode {dict_entries}"
        );
        self.stream(num, &dict, &deflate(&payload))
    }

    pub fn startxref(&mut self, offset: usize) -> &mut Self {
        self.out
            .extend_from_slice(format!("startxref\n{offset}\n%%EOF\n").as_bytes());
        self
    }
}

/// Catalog, pages tree and one page as objects 1-3.
pub fn basic_objects(doc: &mut DocBuilder) {
    doc.object(1, 0, "<< /Type /Catalog /Pages 2 0 R >>");
    doc.object(2, 0, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    doc.object(3, 0, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>");
}

/// A well-formed single-section document with objects 1-3.
pub fn simple_document() -> Vec<u8> {
    let mut doc = DocBuilder::new();
    basic_objects(&mut doc);
    let xref = doc.xref_table(&[1, 2, 3], "<< /Size 4 /Root 1 0 R >>");
    doc.startxref(xref);
    doc.finish()
}
