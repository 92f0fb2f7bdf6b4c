use crate::error::{Error, Result};

/// Sorted, deduplicated set of section offsets visited during a chain walk.
///
/// Walking `/Prev` links in a hostile file can revisit an offset forever; the walker records
/// every offset here before decoding it and stops when it sees one again.
#[derive(Debug, Default)]
pub(crate) struct PositionSet {
    positions: Vec<usize>,
}

impl PositionSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, offset: usize) -> bool {
        self.positions.binary_search(&offset).is_ok()
    }

    /// Insert `offset`, returning `false` if it was already present.
    ///
    /// Growth is checked up front so a capacity overflow surfaces as [`Error::Overflow`] rather
    /// than an abort.
    pub(crate) fn insert(&mut self, offset: usize) -> Result<bool> {
        let idx = match self.positions.binary_search(&offset) {
            Ok(_) => return Ok(false),
            Err(idx) => idx,
        };
        self.positions.try_reserve(1).map_err(|_| Error::Overflow {
            context: "position set growth",
        })?;
        self.positions.insert(idx, offset);
        Ok(true)
    }

    pub(crate) fn len(&self) -> usize {
        self.positions.len()
    }
}
