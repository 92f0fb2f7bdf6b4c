use crate::error::{Error, Result};

/// Where an object lives, as recorded by the cross-reference index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// Declared free. `next` is the next free object number from the free list.
    Free { next: u64, generation: u16 },
    /// Stored uncompressed at a byte offset.
    Direct { offset: usize, generation: u16 },
    /// Member `slot` of the object stream whose object number is `host`.
    Grouped { host: u32, slot: u32 },
}

impl XrefEntry {
    /// Generation used when comparing entries found by the recovery scan.
    ///
    /// Grouped objects always have generation 0.
    fn generation(self) -> u16 {
        match self {
            XrefEntry::Free { generation, .. } | XrefEntry::Direct { generation, .. } => generation,
            XrefEntry::Grouped { .. } => 0,
        }
    }
}

/// Dense table of entries indexed by object number.
///
/// Slots that no section has written yet are `None`; lookups treat them like free entries. A
/// declared free entry is still vacant as far as later writes are concerned. The table only grows,
/// and never past `max_entries`.
#[derive(Debug)]
pub(crate) struct XrefTable {
    entries: Vec<Option<XrefEntry>>,
    max_entries: usize,
}

impl XrefTable {
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub(crate) fn get(&self, num: usize) -> Option<XrefEntry> {
        self.entries.get(num).copied().flatten()
    }

    pub(crate) fn is_unset(&self, num: usize) -> bool {
        self.get(num).is_none()
    }

    /// Grow the table so that object numbers `< len` are addressable.
    pub(crate) fn ensure_len(&mut self, len: usize) -> Result<()> {
        if len <= self.entries.len() {
            return Ok(());
        }
        if len > self.max_entries {
            return Err(Error::LimitExceeded {
                what: "cross-reference entry count",
                limit: self.max_entries as u64,
            });
        }
        let additional = len - self.entries.len();
        self.entries
            .try_reserve(additional)
            .map_err(|_| Error::Overflow {
                context: "cross-reference table growth",
            })?;
        self.entries.resize(len, None);
        Ok(())
    }

    /// Chain-walk rule: sections are visited newest first, so the first in-use write wins.
    pub(crate) fn set_if_vacant(&mut self, num: usize, entry: XrefEntry) -> Result<()> {
        let len = num.checked_add(1).ok_or(Error::Overflow {
            context: "object number",
        })?;
        self.ensure_len(len)?;
        let slot = &mut self.entries[num];
        if matches!(slot, None | Some(XrefEntry::Free { .. })) {
            *slot = Some(entry);
        }
        Ok(())
    }

    /// Recovery rule: the scan order says nothing about age, so the highest generation wins
    /// (ties go to the later occurrence).
    pub(crate) fn set_if_newer_generation(&mut self, num: usize, entry: XrefEntry) -> Result<()> {
        let len = num.checked_add(1).ok_or(Error::Overflow {
            context: "object number",
        })?;
        self.ensure_len(len)?;
        let slot = &mut self.entries[num];
        let replace = match *slot {
            None | Some(XrefEntry::Free { .. }) => true,
            Some(existing) => entry.generation() >= existing.generation(),
        };
        if replace {
            *slot = Some(entry);
        }
        Ok(())
    }
}
