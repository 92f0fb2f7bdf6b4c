//! The cross-reference index: where every object of a document lives.
//!
//! [`Xref`] is built once per document. Construction walks the section chain announced by the
//! trailing `startxref`; if that chain is unusable the whole file is scanned instead (see
//! [`crate::recovery`]). After construction the index is read-only apart from the object-stream
//! cache, and all lookups go through [`Xref::fetch`].

mod chain;
mod entries;
mod stream;
mod table;

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::lexer::{is_whitespace, Lexer, Token};
use crate::object::{Dictionary, ObjRef, Object};
use crate::object_stream::ObjectStreamCache;
use crate::options::OpenOptions;
use crate::recovery;
use crate::security::{CryptAlgorithm, Decryptor, EncryptionParams, Permissions, SecurityState};

pub use entries::XrefEntry;
pub(crate) use entries::XrefTable;

/// How far from the end of the file `startxref` is searched for.
const STARTXREF_WINDOW: usize = 1024;

/// The two on-disk encodings of a cross-reference section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SectionKind {
    /// `xref` keyword followed by fixed-width text records.
    Table,
    /// `N G obj` introducing a `/Type /XRef` stream.
    Stream,
}

impl SectionKind {
    /// Sniff the bytes at `offset` (leading whitespace is skipped).
    pub(crate) fn classify(data: &[u8], offset: usize) -> Option<Self> {
        let mut lexer = Lexer::new(data, offset);
        lexer.skip_whitespace();
        let at = lexer.position();
        let rest = data.get(at..)?;
        if rest.starts_with(b"xref") && rest.get(4).copied().is_some_and(is_whitespace) {
            return Some(SectionKind::Table);
        }
        match (lexer.next_token(), lexer.next_token(), lexer.next_token()) {
            (Token::Integer(_), Token::Integer(_), kw) if kw.is_keyword(b"obj") => {
                Some(SectionKind::Stream)
            }
            _ => None,
        }
    }
}

/// Locate the offset announced by the last `startxref` near the end of the file.
pub(crate) fn find_startxref(data: &[u8]) -> Option<usize> {
    const KEYWORD: &[u8] = b"startxref";
    let window_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let window = &data[window_start..];
    let rel = window
        .windows(KEYWORD.len())
        .rposition(|w| w == KEYWORD)?;
    let after = window_start.checked_add(rel)?.checked_add(KEYWORD.len())?;
    match Lexer::new(data, after).next_token() {
        Token::Integer(offset) => usize::try_from(offset).ok(),
        _ => None,
    }
}

/// Non-fatal problems found while building the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XrefWarning {
    /// No `startxref` pointer in the last kilobyte of the file.
    MissingStartXref,
    /// A `/Prev` chain revisited `offset`.
    LoopDetected { offset: usize },
    /// The section chain was abandoned because of damage.
    SectionDamaged { message: String },
    /// The chain produced no usable `/Root`.
    MissingRoot,
    /// The index was rebuilt by scanning the file.
    Reconstructed,
}

/// Cross-reference index and object resolver for one document.
pub struct Xref {
    pub(crate) data: Arc<[u8]>,
    pub(crate) table: XrefTable,
    trailer: Dictionary,
    root: ObjRef,
    /// Sorted `endstream` offsets; only present after reconstruction.
    stream_ends: Option<Vec<usize>>,
    pub(crate) object_streams: ObjectStreamCache,
    pub(crate) security: SecurityState,
    pub(crate) decryptor: Option<Box<dyn Decryptor>>,
    pub(crate) options: OpenOptions,
    warnings: Vec<XrefWarning>,
    reconstructed: bool,
}

impl fmt::Debug for Xref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Xref")
            .field("len", &self.data.len())
            .field("entries", &self.table.len())
            .field("root", &self.root)
            .field("reconstructed", &self.reconstructed)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

struct Built {
    table: XrefTable,
    trailer: Dictionary,
    root: ObjRef,
    stream_ends: Option<Vec<usize>>,
    reconstructed: bool,
}

impl Built {
    fn from_recovery(recovered: recovery::Recovered) -> Self {
        Self {
            table: recovered.table,
            trailer: recovered.trailer,
            root: recovered.root,
            stream_ends: Some(recovered.stream_ends),
            reconstructed: true,
        }
    }
}

/// The chain's root must name an in-use entry.
fn root_is_live(table: &XrefTable, root: ObjRef) -> bool {
    matches!(
        table.get(root.num as usize),
        Some(XrefEntry::Direct { .. } | XrefEntry::Grouped { .. })
    )
}

fn build(data: &[u8], options: &OpenOptions, warnings: &mut Vec<XrefWarning>) -> Result<Built> {
    let walked = match find_startxref(data) {
        None => {
            log::warn!("no startxref found; reconstructing the cross-reference index");
            warnings.push(XrefWarning::MissingStartXref);
            None
        }
        Some(start) => match chain::walk_chain(data, start, options) {
            Ok(outcome) => Some(outcome),
            Err(err) if err.is_structural() => {
                log::warn!("cross-reference chain is damaged ({err}); reconstructing");
                warnings.push(XrefWarning::SectionDamaged {
                    message: err.to_string(),
                });
                None
            }
            Err(err) => return Err(err),
        },
    };

    let Some(outcome) = walked else {
        warnings.push(XrefWarning::Reconstructed);
        return recovery::reconstruct(data, options).map(Built::from_recovery);
    };

    let live_root = outcome
        .root
        .filter(|root| root_is_live(&outcome.table, *root));
    let Some(root) = live_root else {
        log::warn!("cross-reference chain has no usable /Root; reconstructing");
        warnings.push(XrefWarning::MissingRoot);
        warnings.push(XrefWarning::Reconstructed);
        return recovery::reconstruct(data, options).map(Built::from_recovery);
    };

    let chain_built = Built {
        table: outcome.table,
        trailer: outcome.trailer.unwrap_or_default(),
        root,
        stream_ends: None,
        reconstructed: false,
    };
    let Some(offset) = outcome.loop_at else {
        return Ok(chain_built);
    };

    warnings.push(XrefWarning::LoopDetected { offset });
    match recovery::reconstruct(data, options) {
        Ok(recovered) => {
            warnings.push(XrefWarning::Reconstructed);
            Ok(Built::from_recovery(recovered))
        }
        Err(Error::NoRoot) => {
            log::warn!("reconstruction found no /Root; keeping the partial cross-reference chain");
            Ok(chain_built)
        }
        Err(err) => Err(err),
    }
}

impl Xref {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, OpenOptions::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::open_from_reader(file, options)
    }

    /// Read the whole document from `reader`, refusing inputs over
    /// [`OpenOptions::max_document_bytes`].
    pub fn open_from_reader<R: Read + Seek>(mut reader: R, options: OpenOptions) -> Result<Self> {
        let max = options.max_document_bytes;
        let len = reader.seek(SeekFrom::End(0))?;
        if len > max {
            return Err(Error::LimitExceeded {
                what: "document size",
                limit: max,
            });
        }
        reader.seek(SeekFrom::Start(0))?;

        let mut bytes = Vec::new();
        reader.take(max.saturating_add(1)).read_to_end(&mut bytes)?;
        if bytes.len() as u64 > max {
            return Err(Error::LimitExceeded {
                what: "document size",
                limit: max,
            });
        }
        Self::from_bytes(bytes.into(), options)
    }

    /// Build the index over an in-memory document.
    ///
    /// Fails only when the document is too large or when neither the section chain nor a full
    /// scan yields a document root ([`Error::NoRoot`]).
    pub fn from_bytes(data: Arc<[u8]>, options: OpenOptions) -> Result<Self> {
        if data.len() as u64 > options.max_document_bytes {
            return Err(Error::LimitExceeded {
                what: "document size",
                limit: options.max_document_bytes,
            });
        }

        let mut warnings = Vec::new();
        let built = build(&data, &options, &mut warnings)?;
        log::debug!(
            "opened document: {} bytes, {} entries, root {}, reconstructed: {}",
            data.len(),
            built.table.len(),
            built.root,
            built.reconstructed
        );

        Ok(Self {
            data,
            table: built.table,
            trailer: built.trailer,
            root: built.root,
            stream_ends: built.stream_ends,
            object_streams: ObjectStreamCache::new(options.object_stream_cache_capacity),
            security: SecurityState::default(),
            decryptor: None,
            options,
            warnings,
            reconstructed: built.reconstructed,
        })
    }

    /// Reference to the document catalog.
    pub fn root(&self) -> ObjRef {
        self.root
    }

    /// Trailer of the newest section (or the recovered trailer after reconstruction).
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Trailer entry `key`, or [`Object::Null`] when absent.
    pub fn trailer_value(&self, key: &str) -> Object {
        self.trailer.get(key).cloned().unwrap_or(Object::Null)
    }

    /// Number of addressable object numbers.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Entry for object `num`; `None` when no section mentions it.
    pub fn entry(&self, num: u32) -> Option<XrefEntry> {
        self.table.get(num as usize)
    }

    /// True when the index came from scanning the file rather than its section chain.
    pub fn is_reconstructed(&self) -> bool {
        self.reconstructed
    }

    pub fn warnings(&self) -> &[XrefWarning] {
        &self.warnings
    }

    /// End of the stream whose data starts at `stream_start`: the first recorded `endstream`
    /// at or after it. Only available after reconstruction.
    pub fn stream_end_fallback(&self, stream_start: usize) -> Option<usize> {
        let ends = self.stream_ends.as_ref()?;
        let idx = ends.partition_point(|end| *end < stream_start);
        ends.get(idx).copied()
    }

    /// Record the outcome of authenticating against the document's security handler.
    ///
    /// `perm_flags` is the raw `/P` value. The key is truncated to
    /// [`crate::security::MAX_KEY_LENGTH`] bytes.
    pub fn set_encryption(
        &mut self,
        perm_flags: u32,
        owner_password_ok: bool,
        key: &[u8],
        key_length: usize,
        version: u32,
        algorithm: CryptAlgorithm,
    ) {
        self.security = SecurityState {
            permissions: Permissions(perm_flags),
            owner_password_ok,
            params: Some(EncryptionParams::new(key, key_length, version, algorithm)),
        };
    }

    pub fn encryption(&self) -> Option<&EncryptionParams> {
        self.security.params.as_ref()
    }

    /// Install the cipher used for string and stream payloads once encryption is set.
    pub fn set_decryptor(&mut self, decryptor: Box<dyn Decryptor>) {
        self.decryptor = Some(decryptor);
    }

    pub fn permissions(&self) -> Permissions {
        self.security.permissions
    }

    pub fn ok_to_print(&self, ignore_owner_password: bool) -> bool {
        self.security.allows(Permissions::PRINT, ignore_owner_password)
    }

    pub fn ok_to_change(&self, ignore_owner_password: bool) -> bool {
        self.security.allows(Permissions::CHANGE, ignore_owner_password)
    }

    pub fn ok_to_copy(&self, ignore_owner_password: bool) -> bool {
        self.security.allows(Permissions::COPY, ignore_owner_password)
    }

    pub fn ok_to_add_notes(&self, ignore_owner_password: bool) -> bool {
        self.security
            .allows(Permissions::ADD_NOTES, ignore_owner_password)
    }
}
