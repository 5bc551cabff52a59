//! Ledger of outstanding leases on a ring buffer.
//!
//! Entries are kept ordered by offset. A lease covers at most two linear
//! spans of the arena; the second one only exists when the lease wraps past
//! the end.

use dsbridge_core::{BridgeError, Result};
use smallvec::SmallVec;

/// A contiguous byte range inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Offset from the start of the arena.
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// One past the last byte.
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Half-open overlap test. Empty spans never overlap anything.
    #[inline]
    pub fn overlaps(&self, other: &Span) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        !(self.end() <= other.start || other.end() <= self.start)
    }
}

/// One outstanding lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRegion {
    /// Requested start offset.
    pub offset: usize,
    /// Requested length in bytes.
    pub length: usize,
    /// Span starting at `offset`.
    pub first: Span,
    /// Wrap tail starting at the arena origin.
    pub second: Option<Span>,
}

impl LockRegion {
    /// Split `[offset, offset + length)` over an arena of `capacity` bytes.
    pub(crate) fn compute(offset: usize, length: usize, capacity: usize) -> Self {
        let first_len = length.min(capacity - offset);
        let second = if offset + length > capacity {
            Some(Span::new(0, offset + length - capacity))
        } else {
            None
        };
        Self {
            offset,
            length,
            first: Span::new(offset, first_len),
            second,
        }
    }

    /// Identity used to match an unlock against its lock.
    #[inline]
    pub fn key(&self) -> (usize, Option<usize>) {
        (self.first.start, self.second.map(|s| s.start))
    }

    pub fn spans(&self) -> impl Iterator<Item = Span> + '_ {
        std::iter::once(self.first).chain(self.second)
    }

    /// True if any byte of `self` is also covered by `other`.
    pub fn overlaps(&self, other: &LockRegion) -> bool {
        self.spans()
            .any(|a| other.spans().any(|b| a.overlaps(&b)))
    }

    /// Total bytes covered by both spans.
    pub fn total_len(&self) -> usize {
        self.first.len + self.second.map_or(0, |s| s.len)
    }
}

/// Ordered collection of outstanding leases.
#[derive(Debug, Default, Clone)]
pub struct LockLedger {
    entries: SmallVec<[LockRegion; 4]>,
}

impl LockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LockRegion> {
        self.entries.iter()
    }

    /// Check that `candidate` could be inserted.
    pub fn check(&self, candidate: &LockRegion) -> Result<()> {
        if let Some(dup) = self.entries.iter().find(|e| e.key() == candidate.key()) {
            return Err(BridgeError::RegionConflict(format!(
                "duplicate lease at offset {} (length {})",
                dup.offset, dup.length
            )));
        }
        if let Some(hit) = self.entries.iter().find(|e| e.overlaps(candidate)) {
            return Err(BridgeError::RegionConflict(format!(
                "[{}, {}) overlaps outstanding lease [{}, {})",
                candidate.offset,
                candidate.offset + candidate.length,
                hit.offset,
                hit.offset + hit.length
            )));
        }
        Ok(())
    }

    /// Insert a lease, keeping entries ordered by offset.
    pub fn insert(&mut self, region: LockRegion) -> Result<()> {
        self.check(&region)?;
        let pos = self
            .entries
            .iter()
            .position(|e| e.offset > region.offset)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, region);
        Ok(())
    }

    /// Look up the lease whose key matches exactly.
    pub fn find(&self, key: (usize, Option<usize>)) -> Option<&LockRegion> {
        self.entries.iter().find(|e| e.key() == key)
    }

    /// Remove the lease whose key matches exactly.
    pub fn remove(&mut self, key: (usize, Option<usize>)) -> Result<LockRegion> {
        match self.entries.iter().position(|e| e.key() == key) {
            Some(pos) => Ok(self.entries.remove(pos)),
            None => Err(BridgeError::invalid(format!(
                "no outstanding lease matches spans {:?}",
                key
            ))),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
