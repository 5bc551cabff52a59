//! Fixed-capacity circular byte store with read/write cursors and a lease ledger.
//!
//! Client threads lease regions with [`RingBuffer::lock`], fill them through
//! [`RingBuffer::write_region`] and hand them back with [`RingBuffer::unlock`].
//! The render thread drains with [`RingBuffer::read`], which never moves the
//! cursors; cursor movement is explicit.
//!
//! Every operation on one instance is serialized by a single mutex. The byte
//! arena itself is reference-counted and shared by duplicates, each of which
//! has its own cursors and ledger.

use crate::lock_ledger::{LockLedger, LockRegion};
use dsbridge_core::{BridgeError, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::trace;

/// Which cursor to query or move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorKind {
    /// Consumer side: where the mixer reads next.
    Read,
    /// Producer side: end of the unread region.
    Write,
}

/// Shared sample storage.
#[derive(Debug)]
struct Arena {
    bytes: RwLock<Box<[u8]>>,
}

impl Arena {
    fn zeroed(capacity: usize) -> Result<Self> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(capacity).map_err(|_| {
            BridgeError::OutOfMemory(format!("ring buffer arena of {} bytes", capacity))
        })?;
        bytes.resize(capacity, 0u8);
        Ok(Self {
            bytes: RwLock::new(bytes.into_boxed_slice()),
        })
    }

    /// Copy `data` over the region's spans in order. Returns bytes copied.
    fn copy_in(&self, region: &LockRegion, data: &[u8]) -> usize {
        let mut bytes = self.bytes.write();
        let mut written = 0;
        for span in region.spans() {
            let n = span.len.min(data.len() - written);
            bytes[span.start..span.start + n].copy_from_slice(&data[written..written + n]);
            written += n;
            if written == data.len() {
                break;
            }
        }
        written
    }
}

#[derive(Debug)]
struct RingState {
    /// `None` once the instance has been released.
    arena: Option<Arc<Arena>>,
    read_cursor: usize,
    write_cursor: usize,
    ledger: LockLedger,
}

impl RingState {
    fn arena(&self) -> Result<&Arc<Arena>> {
        self.arena
            .as_ref()
            .ok_or_else(|| BridgeError::invalid("ring buffer has been released"))
    }

    /// Bytes between the read and write cursors, walking forward from read.
    fn unread(&self, capacity: usize) -> usize {
        if self.write_cursor >= self.read_cursor {
            self.write_cursor - self.read_cursor
        } else {
            capacity - (self.read_cursor - self.write_cursor)
        }
    }
}

/// A circular byte buffer with lease tracking.
#[derive(Debug)]
pub struct RingBuffer {
    capacity: usize,
    state: Mutex<RingState>,
}

impl RingBuffer {
    /// Create a zero-filled buffer with both cursors at 0.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(BridgeError::invalid("ring buffer capacity must be non-zero"));
        }
        let arena = Arena::zeroed(capacity)?;
        Ok(Self {
            capacity,
            state: Mutex::new(RingState {
                arena: Some(Arc::new(arena)),
                read_cursor: 0,
                write_cursor: 0,
                ledger: LockLedger::new(),
            }),
        })
    }

    /// New instance over the same arena, with copied cursors and an empty ledger.
    pub fn duplicate(&self) -> Result<Self> {
        let state = self.state.lock();
        let arena = Arc::clone(state.arena()?);
        trace!(capacity = self.capacity, "Duplicating ring buffer");
        Ok(Self {
            capacity: self.capacity,
            state: Mutex::new(RingState {
                arena: Some(arena),
                read_cursor: state.read_cursor,
                write_cursor: state.write_cursor,
                ledger: LockLedger::new(),
            }),
        })
    }

    /// Drop this instance's share of the arena. Later calls fail.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.ledger.clear();
        state.arena = None;
    }

    /// Capacity in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.capacity
    }

    /// Number of instances sharing the arena, or 0 once released.
    pub fn share_count(&self) -> usize {
        self.state
            .lock()
            .arena
            .as_ref()
            .map_or(0, Arc::strong_count)
    }

    /// Bytes that can be leased ahead of the write cursor without passing the
    /// read cursor.
    ///
    /// Always `capacity - unread` with `unread` walked forward from read to
    /// write; keep it that way when `read > write` too.
    pub fn lockable_size(&self) -> usize {
        let state = self.state.lock();
        self.capacity - state.unread(self.capacity)
    }

    /// Bytes between the read and write cursors.
    pub fn unread_size(&self) -> usize {
        self.state.lock().unread(self.capacity)
    }

    /// Number of leases not yet unlocked.
    pub fn outstanding_locks(&self) -> usize {
        self.state.lock().ledger.len()
    }

    /// Lease `[offset, offset + length)`, wrapping past the end if needed.
    pub fn lock(&self, offset: usize, length: usize) -> Result<LockRegion> {
        if length == 0 {
            return Err(BridgeError::invalid("lock length must be non-zero"));
        }
        if offset > self.capacity || length > self.capacity {
            return Err(BridgeError::invalid(format!(
                "lock [{}, +{}) outside buffer of {} bytes",
                offset, length, self.capacity
            )));
        }

        let mut state = self.state.lock();
        state.arena()?;
        let lockable = self.capacity - state.unread(self.capacity);
        if length > lockable {
            return Err(BridgeError::invalid(format!(
                "lock length {} exceeds lockable size {}",
                length, lockable
            )));
        }

        let region = LockRegion::compute(offset, length, self.capacity);
        state.ledger.insert(region)?;
        trace!(offset, length, wrapped = region.second.is_some(), "Locked region");
        Ok(region)
    }

    /// Return a lease. Matches on the spans `lock` handed out.
    pub fn unlock(&self, region: &LockRegion) -> Result<()> {
        let mut state = self.state.lock();
        state.ledger.remove(region.key())?;
        trace!(offset = region.offset, length = region.length, "Unlocked region");
        Ok(())
    }

    /// Copy `data` into a leased region, first span then wrap tail.
    ///
    /// Returns the number of bytes written, at most the leased length.
    pub fn write_region(&self, region: &LockRegion, data: &[u8]) -> Result<usize> {
        let state = self.state.lock();
        let arena = state.arena()?;
        match state.ledger.find(region.key()) {
            Some(held) if held == region => {}
            _ => {
                return Err(BridgeError::invalid(format!(
                    "region at offset {} is not leased",
                    region.offset
                )))
            }
        }

        Ok(arena.copy_in(region, data))
    }

    /// Copy up to `n` unread bytes starting at the read cursor into `dest`.
    ///
    /// Cursors are left untouched. Returns the number of bytes copied.
    pub fn read(&self, n: usize, dest: &mut [u8]) -> Result<usize> {
        let state = self.state.lock();
        let arena = state.arena()?;
        let count = n.min(state.unread(self.capacity)).min(dest.len());
        if count == 0 {
            return Ok(0);
        }

        let start = state.read_cursor;
        let first = (self.capacity - start).min(count);
        let second = count - first;

        let bytes = arena.bytes.read();
        dest[..first].copy_from_slice(&bytes[start..start + first]);
        if second > 0 {
            dest[first..count].copy_from_slice(&bytes[..second]);
        }
        Ok(count)
    }

    pub fn cursor(&self, kind: CursorKind) -> Result<usize> {
        let state = self.state.lock();
        state.arena()?;
        Ok(match kind {
            CursorKind::Read => state.read_cursor,
            CursorKind::Write => state.write_cursor,
        })
    }

    /// Both cursors as `(read, write)`.
    pub fn cursors(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.read_cursor, state.write_cursor)
    }

    /// Move a cursor. With `wrap` the value is taken modulo the capacity,
    /// otherwise anything past the capacity is rejected.
    pub fn set_cursor(&self, kind: CursorKind, value: usize, wrap: bool) -> Result<()> {
        let value = if wrap {
            value % self.capacity
        } else if value > self.capacity {
            return Err(BridgeError::invalid(format!(
                "cursor {} past capacity {}",
                value, self.capacity
            )));
        } else {
            value % self.capacity
        };

        let mut state = self.state.lock();
        state.arena()?;
        match kind {
            CursorKind::Read => state.read_cursor = value,
            CursorKind::Write => state.write_cursor = value,
        }
        Ok(())
    }

    /// Advance both cursors by `n` bytes, wrapping at the capacity.
    pub fn advance_cursors(&self, n: usize) -> Result<()> {
        let mut state = self.state.lock();
        state.arena()?;
        state.read_cursor = (state.read_cursor + n) % self.capacity;
        state.write_cursor = (state.write_cursor + n) % self.capacity;
        Ok(())
    }

    /// Append `data` at the write cursor and advance it.
    ///
    /// Returns the number of bytes stored. One byte of headroom is always left
    /// free so a full buffer never reads back as empty.
    pub fn push(&self, data: &[u8]) -> Result<usize> {
        self.push_aligned(data, 1)
    }

    /// Like [`RingBuffer::push`], but only stores whole multiples of `align` bytes.
    ///
    /// The cursor read, the lease check, the copy and the cursor advance all
    /// happen under one acquisition of the instance lock.
    pub fn push_aligned(&self, data: &[u8], align: usize) -> Result<usize> {
        let align = align.max(1);
        let mut state = self.state.lock();
        let arena = Arc::clone(state.arena()?);

        let room = (self.capacity - state.unread(self.capacity)).saturating_sub(1);
        let length = data.len().min(room) / align * align;
        if length == 0 {
            return Ok(0);
        }

        let offset = state.write_cursor;
        let region = LockRegion::compute(offset, length, self.capacity);
        state.ledger.check(&region)?;
        let written = arena.copy_in(&region, &data[..length]);
        state.write_cursor = (offset + written) % self.capacity;
        trace!(offset, written, "Pushed bytes");
        Ok(written)
    }
}
