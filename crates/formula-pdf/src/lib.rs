//! PDF document index and object resolution.
//!
//! [`Xref`] locates every indirect object of a document: it decodes classic `xref` tables and
//! cross-reference streams along the `/Prev` chain, falls back to scanning the whole file when
//! that chain is damaged, and resolves objects (including members of compressed object streams)
//! on demand.
//!
//! ```no_run
//! use formula_pdf::Xref;
//!
//! let mut xref = Xref::open("document.pdf")?;
//! let catalog = xref.fetch_ref(xref.root());
//! let pages = catalog.as_dict().and_then(|d| d.get("Pages")).cloned();
//! # Ok::<(), formula_pdf::Error>(())
//! ```
//!
//! Decryption is delegated: after authenticating with the document's security handler, call
//! [`Xref::set_encryption`] and install a [`Decryptor`].

mod error;
mod fetch;
mod filters;
mod lexer;
mod object;
mod object_stream;
mod options;
mod parser;
mod position_set;
mod recovery;
pub mod security;
mod xref;


pub use error::{Error, Result};
pub use object::{Dictionary, Name, ObjRef, Object, Stream};
pub use options::OpenOptions;
pub use security::{CryptAlgorithm, Decryptor, EncryptionParams, Permissions};
pub use xref::{Xref, XrefEntry, XrefWarning};
