//! Per-tick bump arena for mixer intermediates.
//!
//! Allocations hand out index handles rather than references, so several
//! intermediates can be alive at once and the arena can still grow. `reset`
//! rewinds without freeing; once the arena has reached its working size the
//! render thread does no heap allocation.

use tracing::warn;

/// Handle to a run of `f32` samples in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSlice {
    start: usize,
    len: usize,
}

impl SampleSlice {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Handle to a run of bytes in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSlice {
    start: usize,
    len: usize,
}

impl ByteSlice {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bump allocator of samples and bytes, reset once per render tick.
#[derive(Debug, Default)]
pub struct ScratchArena {
    samples: Vec<f32>,
    samples_used: usize,
    bytes: Vec<u8>,
    bytes_used: usize,
}

impl ScratchArena {
    /// Pre-size for `samples` floats and `bytes` bytes.
    pub fn with_capacity(samples: usize, bytes: usize) -> Self {
        Self {
            samples: vec![0.0; samples],
            samples_used: 0,
            bytes: vec![0; bytes],
            bytes_used: 0,
        }
    }

    /// Rewind both pools. Existing handles become invalid.
    pub fn reset(&mut self) {
        self.samples_used = 0;
        self.bytes_used = 0;
    }

    /// Zeroed run of `len` samples.
    pub fn alloc_samples(&mut self, len: usize) -> SampleSlice {
        let start = self.samples_used;
        let end = start + len;
        if end > self.samples.len() {
            let grown = end.next_power_of_two();
            warn!(from = self.samples.len(), to = grown, "Growing sample scratch arena");
            self.samples.resize(grown, 0.0);
        }
        self.samples[start..end].fill(0.0);
        self.samples_used = end;
        SampleSlice { start, len }
    }

    /// Zeroed run of `len` bytes.
    pub fn alloc_bytes(&mut self, len: usize) -> ByteSlice {
        let start = self.bytes_used;
        let end = start + len;
        if end > self.bytes.len() {
            let grown = end.next_power_of_two();
            warn!(from = self.bytes.len(), to = grown, "Growing byte scratch arena");
            self.bytes.resize(grown, 0);
        }
        self.bytes[start..end].fill(0);
        self.bytes_used = end;
        ByteSlice { start, len }
    }

    pub fn samples(&self, slice: SampleSlice) -> &[f32] {
        &self.samples[slice.start..slice.start + slice.len]
    }

    pub fn samples_mut(&mut self, slice: SampleSlice) -> &mut [f32] {
        &mut self.samples[slice.start..slice.start + slice.len]
    }

    pub fn bytes(&self, slice: ByteSlice) -> &[u8] {
        &self.bytes[slice.start..slice.start + slice.len]
    }

    pub fn bytes_mut(&mut self, slice: ByteSlice) -> &mut [u8] {
        &mut self.bytes[slice.start..slice.start + slice.len]
    }

    /// Borrow a sample run and a byte run at the same time.
    pub fn split_mut(&mut self, samples: SampleSlice, bytes: ByteSlice) -> (&mut [f32], &mut [u8]) {
        (
            &mut self.samples[samples.start..samples.start + samples.len],
            &mut self.bytes[bytes.start..bytes.start + bytes.len],
        )
    }

    /// `dst[i] += src[i]` over the shorter of the two runs.
    pub fn accumulate(&mut self, dst: SampleSlice, src: SampleSlice) {
        let n = dst.len.min(src.len);
        for k in 0..n {
            let v = self.samples[src.start + k];
            self.samples[dst.start + k] += v;
        }
    }

    /// Samples handed out since the last reset.
    pub fn samples_used(&self) -> usize {
        self.samples_used
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    /// Current pool sizes as `(samples, bytes)`.
    pub fn capacity(&self) -> (usize, usize) {
        (self.samples.len(), self.bytes.len())
    }
}
