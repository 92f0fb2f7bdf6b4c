//! Encryption parameters and permission flags carried by the index.
//!
//! This crate never derives keys or runs a cipher. The security handler that authenticates a
//! password hands the resulting key to [`crate::Xref::set_encryption`], and an installed
//! [`Decryptor`] is invoked for every string and stream payload read from a direct object.

use std::fmt;

use crate::object::ObjRef;

/// Maximum key length accepted by [`EncryptionParams`] (AES-256).
pub const MAX_KEY_LENGTH: usize = 32;

/// `/P` permission bits. Bit numbering follows the file format (bit 1 is the LSB), so "print"
/// (bit 3) is `1 << 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions(pub u32);

impl Permissions {
    pub const PRINT: u32 = 1 << 2;
    pub const CHANGE: u32 = 1 << 3;
    pub const COPY: u32 = 1 << 4;
    pub const ADD_NOTES: u32 = 1 << 5;

    /// Every operation allowed; used for unencrypted documents.
    pub const ALL: Permissions = Permissions(0xFFFF_FFFC);

    pub fn allows(self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::ALL
    }
}

/// Algorithm tag forwarded to the [`Decryptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptAlgorithm {
    Rc4,
    Aes128,
    Aes256,
    /// A handler-specific algorithm identifier.
    Other(u32),
}

/// Key material and algorithm for decrypting object payloads.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionParams {
    key: Vec<u8>,
    pub key_length: usize,
    /// `/V` of the encryption dictionary.
    pub version: u32,
    pub algorithm: CryptAlgorithm,
}

impl EncryptionParams {
    /// Build parameters, truncating the key and `key_length` to [`MAX_KEY_LENGTH`].
    pub fn new(key: &[u8], key_length: usize, version: u32, algorithm: CryptAlgorithm) -> Self {
        let key_length = key_length.min(MAX_KEY_LENGTH).min(key.len());
        Self {
            key: key[..key_length].to_vec(),
            key_length,
            version,
            algorithm,
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

// Keep key bytes out of logs.
impl fmt::Debug for EncryptionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionParams")
            .field("key", &"<redacted>")
            .field("key_length", &self.key_length)
            .field("version", &self.version)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Decrypts string and stream payloads of a single object in place.
///
/// `obj` is the object that *owns* the payload (nested strings use their enclosing object's
/// number and generation).
pub trait Decryptor {
    fn decrypt(&self, params: &EncryptionParams, obj: ObjRef, data: &mut Vec<u8>);
}

/// Permission/owner state plus optional key material, as owned by the index.
#[derive(Debug, Default)]
pub(crate) struct SecurityState {
    pub(crate) permissions: Permissions,
    pub(crate) owner_password_ok: bool,
    pub(crate) params: Option<EncryptionParams>,
}

impl SecurityState {
    pub(crate) fn allows(&self, bit: u32, ignore_owner_password: bool) -> bool {
        (!ignore_owner_password && self.owner_password_ok) || self.permissions.allows(bit)
    }
}
