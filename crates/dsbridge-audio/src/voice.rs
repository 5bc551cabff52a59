//! Playback voice: one client buffer with its format, gain and play state.

use crate::lock_ledger::LockRegion;
use crate::ring_buffer::{CursorKind, RingBuffer};
use dsbridge_core::{limits, BridgeError, Result, WaveFormat};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a voice within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

impl VoiceId {
    fn next() -> Self {
        Self(NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Playback rate override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frequency {
    /// Play at the voice format's native rate.
    #[default]
    Original,
    /// Play at an explicit rate in Hz.
    Hz(u32),
}

impl Frequency {
    /// Legacy encoding: 0 means "original".
    pub fn from_raw(hz: u32) -> Self {
        match hz {
            0 => Self::Original,
            hz => Self::Hz(hz),
        }
    }
}

/// Legacy status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoiceStatus(u32);

impl VoiceStatus {
    pub const STOPPED: Self = Self(0);
    pub const PLAYING: Self = Self(limits::STATUS_PLAYING);
    pub const LOOPING: Self = Self(limits::STATUS_LOOPING);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_playing(self) -> bool {
        self.0 & limits::STATUS_PLAYING != 0
    }

    pub fn is_looping(self) -> bool {
        self.0 & limits::STATUS_LOOPING != 0
    }
}

impl std::ops::BitOr for VoiceStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Parameters needed to create a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceDesc {
    pub format: WaveFormat,
    /// Buffer size in bytes.
    pub capacity: usize,
}

impl VoiceDesc {
    pub fn new(format: WaveFormat, capacity: usize) -> Self {
        Self { format, capacity }
    }

    /// Description sized to hold `millis` of audio.
    pub fn with_duration_ms(format: WaveFormat, millis: u32) -> Self {
        let frames = format.sample_rate as usize * millis as usize / 1000;
        Self {
            format,
            capacity: frames.max(1) * format.block_align(),
        }
    }
}

/// Snapshot of the mutable voice state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    /// Linear volume (0.0 to 1.0).
    pub volume: f32,
    /// Pan (-1.0 = full left, 0.0 = center, 1.0 = full right).
    pub pan: f32,
    pub frequency: Frequency,
    pub status: VoiceStatus,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            frequency: Frequency::Original,
            status: VoiceStatus::STOPPED,
        }
    }
}

/// A playback buffer.
pub struct Voice {
    id: VoiceId,
    format: WaveFormat,
    buffer: RingBuffer,
    params: Mutex<VoiceParams>,
    notifications: Mutex<SmallVec<[usize; 4]>>,
}

impl Voice {
    /// Create a stopped voice with a zeroed buffer.
    pub fn new(desc: VoiceDesc) -> Result<Self> {
        desc.format.validate()?;
        let align = desc.format.block_align();
        if desc.capacity == 0 || desc.capacity % align != 0 {
            return Err(BridgeError::invalid(format!(
                "capacity {} is not a non-zero multiple of block align {}",
                desc.capacity, align
            )));
        }
        let voice = Self {
            id: VoiceId::next(),
            format: desc.format,
            buffer: RingBuffer::new(desc.capacity)?,
            params: Mutex::new(VoiceParams::default()),
            notifications: Mutex::new(SmallVec::new()),
        };
        debug!(voice = %voice.id, format = ?desc.format, capacity = desc.capacity, "Created voice");
        Ok(voice)
    }

    /// New voice over the same sample memory. Starts stopped.
    pub fn duplicate(&self) -> Result<Self> {
        let buffer = self.buffer.duplicate()?;
        let mut params = self.params();
        params.status = VoiceStatus::STOPPED;
        let voice = Self {
            id: VoiceId::next(),
            format: self.format,
            buffer,
            params: Mutex::new(params),
            notifications: Mutex::new(SmallVec::new()),
        };
        debug!(source = %self.id, voice = %voice.id, "Duplicated voice");
        Ok(voice)
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn format(&self) -> &WaveFormat {
        &self.format
    }

    /// Backing ring buffer.
    pub fn buffer(&self) -> &RingBuffer {
        &self.buffer
    }

    /// Consistent copy of volume, pan, frequency and status.
    pub fn params(&self) -> VoiceParams {
        *self.params.lock()
    }

    pub fn volume(&self) -> f32 {
        self.params.lock().volume
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(BridgeError::invalid(format!("volume {volume} outside [0, 1]")));
        }
        self.params.lock().volume = volume;
        debug!(voice = %self.id, volume, "Set volume");
        Ok(())
    }

    pub fn pan(&self) -> f32 {
        self.params.lock().pan
    }

    pub fn set_pan(&self, pan: f32) -> Result<()> {
        if !(-1.0..=1.0).contains(&pan) {
            return Err(BridgeError::invalid(format!("pan {pan} outside [-1, 1]")));
        }
        self.params.lock().pan = pan;
        debug!(voice = %self.id, pan, "Set pan");
        Ok(())
    }

    pub fn frequency(&self) -> Frequency {
        self.params.lock().frequency
    }

    pub fn set_frequency(&self, frequency: Frequency) -> Result<()> {
        if let Frequency::Hz(hz) = frequency {
            if !(limits::FREQUENCY_MIN..=limits::FREQUENCY_MAX).contains(&hz) {
                return Err(BridgeError::invalid(format!(
                    "frequency {hz} outside [{}, {}]",
                    limits::FREQUENCY_MIN,
                    limits::FREQUENCY_MAX
                )));
            }
        }
        self.params.lock().frequency = frequency;
        debug!(voice = %self.id, ?frequency, "Set frequency");
        Ok(())
    }

    /// Rate the mixer should treat the source as running at.
    pub fn effective_rate(&self) -> u32 {
        match self.frequency() {
            Frequency::Original => self.format.sample_rate,
            Frequency::Hz(hz) => hz,
        }
    }

    pub fn status(&self) -> VoiceStatus {
        self.params.lock().status
    }

    pub fn is_playing(&self) -> bool {
        self.status().is_playing()
    }

    /// Start playback. Takes effect on the next render tick.
    pub fn play(&self, looping: bool) {
        let status = if looping {
            VoiceStatus::PLAYING | VoiceStatus::LOOPING
        } else {
            VoiceStatus::PLAYING
        };
        self.params.lock().status = status;
        debug!(voice = %self.id, looping, "Play");
    }

    /// Stop playback. Takes effect on the next render tick.
    pub fn stop(&self) {
        self.params.lock().status = VoiceStatus::STOPPED;
        debug!(voice = %self.id, "Stop");
    }

    pub fn lock(&self, offset: usize, length: usize) -> Result<LockRegion> {
        self.buffer.lock(offset, length)
    }

    pub fn unlock(&self, region: &LockRegion) -> Result<()> {
        self.buffer.unlock(region)
    }

    pub fn write_region(&self, region: &LockRegion, data: &[u8]) -> Result<usize> {
        self.buffer.write_region(region, data)
    }

    /// Append whole frames at the write cursor. Returns bytes stored.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.buffer.push_aligned(data, self.format.block_align())
    }

    /// `(read_cursor, write_cursor)`.
    pub fn positions(&self) -> (usize, usize) {
        self.buffer.cursors()
    }

    /// Move the play (read) cursor, as the legacy set-current-position call does.
    pub fn set_current_position(&self, offset: usize) -> Result<()> {
        self.buffer.set_cursor(CursorKind::Read, offset, false)
    }

    /// Store wake-up offsets. Each must lie inside the buffer.
    pub fn set_notification_positions(&self, offsets: &[usize]) -> Result<()> {
        let capacity = self.buffer.size();
        if let Some(bad) = offsets.iter().find(|&&o| o >= capacity) {
            return Err(BridgeError::invalid(format!(
                "notification offset {bad} outside buffer of {capacity} bytes"
            )));
        }
        let mut sorted: SmallVec<[usize; 4]> = offsets.iter().copied().collect();
        sorted.sort_unstable();
        sorted.dedup();
        *self.notifications.lock() = sorted;
        Ok(())
    }

    pub fn notification_positions(&self) -> Vec<usize> {
        self.notifications.lock().to_vec()
    }
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("capacity", &self.buffer.size())
            .field("params", &self.params())
            .finish()
    }
}
