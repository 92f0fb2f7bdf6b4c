use thiserror::Error;

/// Errors produced while building the cross-reference index or resolving objects.
///
/// Lookup-time failures never reach [`crate::Xref::fetch`] callers (they collapse to
/// [`crate::Object::Null`]); [`crate::Xref::try_fetch`] exposes them for diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    /// The bytes at `offset` do not have the shape the format requires.
    #[error("structural damage at offset {offset}: {context}")]
    StructuralDamage { offset: usize, context: String },
    /// Checked arithmetic or an allocation request overflowed.
    #[error("arithmetic overflow: {context}")]
    Overflow { context: &'static str },
    /// A configured resource cap was hit.
    #[error("{what} exceeds limit of {limit}")]
    LimitExceeded { what: &'static str, limit: u64 },
    /// Object resolution nested deeper than the configured fetch depth.
    #[error("object resolution exceeded recursion depth {depth}")]
    RecursionLimit { depth: usize },
    /// Reconstruction scanned the whole file without finding a document root.
    #[error("no document root found (index reconstruction failed)")]
    NoRoot,
    #[error("unsupported stream filter `{0}`")]
    UnsupportedFilter(String),
    #[error("failed to decompress stream: {0}")]
    Decompress(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn damaged(offset: usize, context: impl Into<String>) -> Self {
        Error::StructuralDamage {
            offset,
            context: context.into(),
        }
    }

    /// True for errors that only invalidate the enclosing section or object.
    ///
    /// Overflow, resource caps and recursion limits are handled exactly like structural damage:
    /// the caller falls back (construction) or degrades to "no object" (lookup).
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::StructuralDamage { .. }
                | Error::Overflow { .. }
                | Error::LimitExceeded { .. }
                | Error::RecursionLimit { .. }
                | Error::UnsupportedFilter(_)
                | Error::Decompress(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_grouping_excludes_fatal_errors() {
        assert!(Error::damaged(4, "bad").is_structural());
        assert!(Error::Overflow { context: "grow" }.is_structural());
        assert!(Error::RecursionLimit { depth: 3 }.is_structural());
        assert!(!Error::NoRoot.is_structural());
        assert!(!Error::Io(std::io::Error::other("boom")).is_structural());
    }

    #[test]
    fn display_includes_offset_and_context() {
        let err = Error::damaged(120, "expected `obj` keyword");
        assert_eq!(
            err.to_string(),
            "structural damage at offset 120: expected `obj` keyword"
        );
    }
}
