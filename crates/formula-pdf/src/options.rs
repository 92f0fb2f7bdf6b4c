/// Maximum document size we will buffer into memory.
const MAX_DOCUMENT_BYTES: u64 = 1024 * 1024 * 1024; // 1 GiB

/// Upper bound on the highest object number the index will address.
///
/// A tiny hostile file can declare a subsection of billions of entries; the cap turns that into a
/// section failure instead of a multi-gigabyte allocation.
const MAX_XREF_ENTRIES: usize = 10_000_000;

/// Sanity ceiling on `/N` of a single object stream.
const MAX_OBJECT_STREAM_MEMBERS: usize = 1_000_000;

const OBJECT_STREAM_CACHE_CAPACITY: usize = 4;

/// Nesting cap for fetches that re-enter resolution (indirect `/Length`, object streams).
const MAX_FETCH_DEPTH: usize = 32;

const MAX_DECODED_STREAM_BYTES: usize = 256 * 1024 * 1024; // 256 MiB

const ENV_MAX_DOCUMENT_BYTES: &str = "FORMULA_PDF_MAX_DOCUMENT_BYTES";
const ENV_MAX_XREF_ENTRIES: &str = "FORMULA_PDF_MAX_XREF_ENTRIES";
const ENV_MAX_OBJECT_STREAM_MEMBERS: &str = "FORMULA_PDF_MAX_OBJECT_STREAM_MEMBERS";
const ENV_OBJECT_STREAM_CACHE: &str = "FORMULA_PDF_OBJECT_STREAM_CACHE";
const ENV_MAX_FETCH_DEPTH: &str = "FORMULA_PDF_MAX_FETCH_DEPTH";
const ENV_MAX_DECODED_STREAM_BYTES: &str = "FORMULA_PDF_MAX_DECODED_STREAM_BYTES";

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Resource limits applied while opening a document and resolving its objects.
///
/// Defaults can be overridden per process with the `FORMULA_PDF_*` environment variables, which
/// are read when [`OpenOptions::default`] is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    /// Reject inputs larger than this before reading them.
    pub max_document_bytes: u64,
    /// Highest object number (exclusive) the index may address.
    pub max_xref_entries: usize,
    /// Largest `/N` accepted for an object stream.
    pub max_object_stream_members: usize,
    /// Number of decoded object streams kept in the MRU cache (at least 1).
    pub object_stream_cache_capacity: usize,
    /// Maximum nesting of re-entrant fetches.
    pub max_fetch_depth: usize,
    /// Output cap for a single stream's filter chain.
    pub max_decoded_stream_bytes: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            max_document_bytes: env_or(ENV_MAX_DOCUMENT_BYTES, MAX_DOCUMENT_BYTES),
            max_xref_entries: env_or(ENV_MAX_XREF_ENTRIES, MAX_XREF_ENTRIES),
            max_object_stream_members: env_or(
                ENV_MAX_OBJECT_STREAM_MEMBERS,
                MAX_OBJECT_STREAM_MEMBERS,
            ),
            object_stream_cache_capacity: env_or(
                ENV_OBJECT_STREAM_CACHE,
                OBJECT_STREAM_CACHE_CAPACITY,
            ),
            max_fetch_depth: env_or(ENV_MAX_FETCH_DEPTH, MAX_FETCH_DEPTH),
            max_decoded_stream_bytes: env_or(
                ENV_MAX_DECODED_STREAM_BYTES,
                MAX_DECODED_STREAM_BYTES,
            ),
        }
    }
}
