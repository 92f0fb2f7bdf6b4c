mod common;

use std::io::{Cursor, Write};
use std::sync::Arc;

use common::{basic_objects, simple_document, DocBuilder, Row};
use formula_pdf::{
    CryptAlgorithm, Decryptor, EncryptionParams, Error, ObjRef, Object, OpenOptions, Permissions,
    Xref,
};
use pretty_assertions::assert_eq;

fn open(bytes: Vec<u8>) -> Xref {
    Xref::from_bytes(Arc::from(bytes), OpenOptions::default()).unwrap()
}

/// Objects 1-3 direct, 2 and 3 also reachable through object stream 10, described by an xref
/// stream whose rows are supplied by the caller.
fn grouped_document(rows_for_3: Row) -> Vec<u8> {
    let mut doc = DocBuilder::new();
    doc.object(1, 0, "<< /Type /Catalog /Pages 2 0 R >>");
    doc.object_stream(
        10,
        &[
            (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
            (3, "<< /Type /Page /Parent 2 0 R >>"),
        ],
    );
    let at = doc.len();
    let rows = [
        (1, Row::Direct(doc.offset_of(1), 0)),
        (2, Row::Grouped(10, 0)),
        (3, rows_for_3),
        (10, Row::Direct(doc.offset_of(10), 0)),
        (11, Row::Direct(at, 0)),
    ];
    doc.xref_stream(11, &rows, "/Root 1 0 R");
    doc.startxref(at);
    doc.finish()
}

#[test]
fn group_member_guard_rejects_wrong_slot() {
    // Object 3 claims slot 0, which actually holds object 2.
    let mut xref = open(grouped_document(Row::Grouped(10, 0)));
    assert!(!xref.is_reconstructed());
    assert_eq!(xref.fetch(3, 0), Object::Null);
    assert_eq!(xref.try_fetch(3, 0, 0).unwrap(), None);
    // The stream is fine for the object that really lives there.
    assert_eq!(xref.fetch(2, 0).as_dict().unwrap().get_int("Count"), Some(1));
}

#[test]
fn slot_past_the_member_count_is_null() {
    let mut xref = open(grouped_document(Row::Grouped(10, 7)));
    assert_eq!(xref.fetch(3, 0), Object::Null);
}

#[test]
fn object_streams_cannot_nest() {
    // Object 3 lives in "stream" 2, which is itself a grouped object.
    let mut xref = open(grouped_document(Row::Grouped(2, 0)));
    let err = xref.try_fetch(3, 0, 0).unwrap_err();
    assert!(matches!(err, Error::StructuralDamage { .. }), "{err:?}");
    assert_eq!(xref.fetch(3, 0), Object::Null);
}

#[test]
fn cached_object_stream_serves_repeat_lookups() {
    let mut xref = open(grouped_document(Row::Grouped(10, 1)));
    let page = xref.fetch(3, 0);
    assert!(page.as_dict().unwrap().is_type("Page"));
    for _ in 0..3 {
        assert_eq!(xref.fetch(3, 0), page);
        assert!(!xref.fetch(2, 0).is_null());
    }
}

#[test]
fn header_mismatch_is_structural_damage() {
    let mut doc = DocBuilder::new();
    basic_objects(&mut doc);
    doc.object(4, 0, "(four)");
    let at = doc.len();
    // Entry 4 points at object 3's body.
    let text = format!(
        "xref\n0 5\n0000000000 65535 f\r\n{:010} 00000 n\r\n{:010} 00000 n\r\n{:010} 00000 n\r\n{:010} 00000 n\r\ntrailer\n<< /Size 5 /Root 1 0 R >>\n",
        doc.offset_of(1),
        doc.offset_of(2),
        doc.offset_of(3),
        doc.offset_of(3),
    );
    doc.raw(text.as_bytes());
    doc.startxref(at);

    let mut xref = open(doc.finish());
    assert!(!xref.is_reconstructed());
    let err = xref.try_fetch(4, 0, 0).unwrap_err();
    assert!(matches!(err, Error::StructuralDamage { .. }), "{err:?}");
    assert_eq!(xref.fetch(4, 0), Object::Null);
}

#[test]
fn recursion_depth_is_capped() {
    let mut doc = DocBuilder::new();
    basic_objects(&mut doc);
    // A stream whose /Length is itself.
    doc.object(4, 0, "<< /Length 4 0 R >>\nstream\nabc\nendstream");
    let at = doc.xref_table(&[1, 2, 3, 4], "<< /Size 5 /Root 1 0 R >>");
    doc.startxref(at);

    let options = OpenOptions {
        max_fetch_depth: 4,
        ..OpenOptions::default()
    };
    let mut xref = Xref::from_bytes(Arc::from(doc.finish()), options).unwrap();
    let err = xref.try_fetch(1, 0, 5).unwrap_err();
    assert!(matches!(err, Error::RecursionLimit { depth: 4 }), "{err:?}");

    // The self-reference bottoms out and the stream is delimited by `endstream`.
    let stream = xref.fetch(4, 0);
    assert_eq!(stream.as_stream().unwrap().data, b"abc");
}

#[test]
fn unencrypted_documents_allow_everything() {
    let xref = open(simple_document());
    assert_eq!(xref.permissions(), Permissions::ALL);
    assert!(xref.ok_to_print(true));
    assert!(xref.ok_to_change(true));
    assert!(xref.ok_to_copy(true));
    assert!(xref.ok_to_add_notes(true));
    assert!(xref.encryption().is_none());
}

#[test]
fn permission_bits_decode() {
    let mut xref = open(simple_document());
    xref.set_encryption(Permissions::PRINT, false, b"key", 3, 1, CryptAlgorithm::Rc4);
    assert!(xref.ok_to_print(true));
    assert!(!xref.ok_to_change(true));
    assert!(!xref.ok_to_copy(true));
    assert!(!xref.ok_to_add_notes(true));

    xref.set_encryption(Permissions::PRINT, true, b"key", 3, 1, CryptAlgorithm::Rc4);
    assert!(xref.ok_to_copy(false));
    assert!(!xref.ok_to_copy(true));
}

#[test]
fn encryption_key_is_capped() {
    let mut xref = open(simple_document());
    let key = [7u8; 48];
    xref.set_encryption(0, false, &key, 48, 5, CryptAlgorithm::Aes256);
    let params = xref.encryption().unwrap();
    assert_eq!(params.key_length, 32);
    assert_eq!(params.key(), &key[..32]);
    assert_eq!(params.algorithm, CryptAlgorithm::Aes256);
    assert!(!format!("{params:?}").contains('7'));
}

/// XORs each payload byte with the key byte and the owning object number.
struct XorDecryptor;

impl Decryptor for XorDecryptor {
    fn decrypt(&self, params: &EncryptionParams, obj: ObjRef, data: &mut Vec<u8>) {
        let mask = params.key()[0] ^ obj.num as u8;
        for b in data.iter_mut() {
            *b ^= mask;
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

#[test]
fn decryptor_sees_strings_and_streams_of_direct_objects() {
    let key = 0x5Au8;
    let mask4 = key ^ 4;
    let mask5 = key ^ 5;
    let secret: Vec<u8> = b"secret".iter().map(|b| b ^ mask4).collect();
    let payload: Vec<u8> = b"stream body".iter().map(|b| b ^ mask5).collect();

    let mut doc = DocBuilder::new();
    basic_objects(&mut doc);
    doc.object(4, 0, &format!("<< /Title <{}> >>", hex(&secret)));
    doc.stream(5, "", &payload);
    let at = doc.xref_table(&[1, 2, 3, 4, 5], "<< /Size 6 /Root 1 0 R >>");
    doc.startxref(at);

    let mut xref = open(doc.finish());
    // Without a decryptor the bytes come back as stored.
    let raw = xref.fetch(4, 0);
    assert_eq!(
        raw.as_dict().unwrap().get("Title"),
        Some(&Object::String(secret.clone()))
    );

    xref.set_encryption(Permissions::ALL.0, false, &[key], 1, 1, CryptAlgorithm::Rc4);
    xref.set_decryptor(Box::new(XorDecryptor));
    let info = xref.fetch(4, 0);
    assert_eq!(
        info.as_dict().unwrap().get("Title"),
        Some(&Object::String(b"secret".to_vec()))
    );
    let stream = xref.fetch(5, 0);
    assert_eq!(stream.as_stream().unwrap().data, b"stream body");
}

#[test]
fn opens_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&simple_document()).unwrap();
    file.flush().unwrap();

    let mut xref = Xref::open(file.path()).unwrap();
    assert!(xref.fetch(3, 0).as_dict().unwrap().is_type("Page"));
}

#[test]
fn reader_input_over_the_size_cap_is_rejected() {
    let bytes = simple_document();
    let options = OpenOptions {
        max_document_bytes: 64,
        ..OpenOptions::default()
    };
    let err = Xref::open_from_reader(Cursor::new(bytes.clone()), options).unwrap_err();
    assert!(matches!(err, Error::LimitExceeded { limit: 64, .. }), "{err:?}");

    let xref = Xref::open_from_reader(Cursor::new(bytes), OpenOptions::default()).unwrap();
    assert_eq!(xref.root(), ObjRef::new(1, 0));
}
