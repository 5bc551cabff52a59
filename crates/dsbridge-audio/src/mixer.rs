//! Audio mixer: turns the playing voices into one device-format buffer per
//! render tick.

use crate::convert::{self, check_source_format, check_target_format};
use crate::scratch::{ByteSlice, ScratchArena};
use crate::voice::Voice;
use dsbridge_core::{BridgeError, Result, WaveFormat};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::trace;

/// Per-channel gain derived from volume and pan (linear panning law).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attenuation {
    pub left: f32,
    pub right: f32,
}

impl Attenuation {
    /// Gains for `volume` and `pan`, or `None` at unity (volume 1, pan 0).
    pub fn from_volume_pan(volume: f32, pan: f32) -> Option<Self> {
        if volume == 1.0 && pan == 0.0 {
            return None;
        }
        let left = volume * if pan > 0.0 { 1.0 - pan } else { 1.0 };
        let right = volume * if pan < 0.0 { 1.0 + pan } else { 1.0 };
        Some(Self { left, right })
    }

    /// Scale interleaved stereo samples in place.
    pub fn apply(&self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(2) {
            frame[0] *= self.left;
            frame[1] *= self.right;
        }
    }
}

/// Source bytes a voice must supply for `frame_count` output frames.
pub fn source_demand(
    format: &WaveFormat,
    effective_rate: u32,
    target_rate: u32,
    frame_count: usize,
) -> (usize, usize) {
    let frames = (frame_count as f64 * effective_rate as f64 / target_rate as f64).round() as usize;
    (frames, frames * format.block_align())
}

/// Mixes voices into the device format.
///
/// Owns the per-tick scratch arena; one instance per device session.
pub struct Mixer {
    arena: ScratchArena,
    /// Source bytes consumed per voice this tick.
    consumed: SmallVec<[usize; 16]>,
    /// Whether each voice was playing when its parameters were sampled.
    played: SmallVec<[bool; 16]>,
    output: Option<ByteSlice>,
}

impl Mixer {
    /// Create a mixer whose arena starts out sized for `scratch_frames` stereo frames.
    pub fn new(scratch_frames: usize) -> Self {
        // mix + normalized + resampled for a handful of voices
        let samples = scratch_frames * 2 * 8;
        let bytes = scratch_frames * 8 * 4;
        Self {
            arena: ScratchArena::with_capacity(samples, bytes),
            consumed: SmallVec::new(),
            played: SmallVec::new(),
            output: None,
        }
    }

    /// Mix `voices` into `frame_count` frames of `target`.
    ///
    /// Returns the encoded output; its length is the byte length of the mix.
    /// Playing voices have both cursors advanced by the bytes consumed.
    pub fn mix(
        &mut self,
        voices: &[Arc<Voice>],
        target: &WaveFormat,
        frame_count: usize,
    ) -> Result<&[u8]> {
        if voices.is_empty() {
            return Err(BridgeError::invalid("mix requires at least one voice"));
        }
        if frame_count == 0 {
            return Err(BridgeError::invalid("mix requires a non-zero frame count"));
        }
        check_target_format(target)?;

        self.arena.reset();
        self.consumed.clear();
        self.played.clear();
        self.output = None;

        let mix = self.arena.alloc_samples(frame_count * 2);

        for voice in voices {
            let format = *voice.format();
            check_source_format(&format)?;
            let params = voice.params();
            let rate = voice.effective_rate();

            let (src_frames, demand) = source_demand(&format, rate, target.sample_rate, frame_count);
            let raw = self.arena.alloc_bytes(demand);
            let got = voice.buffer().read(demand, self.arena.bytes_mut(raw))?;

            let normalized = self.arena.alloc_samples(src_frames * 2);
            {
                let (out, bytes) = self.arena.split_mut(normalized, raw);
                convert::normalize_to_stereo(&bytes[..got], &format, out)?;
            }

            let stream = convert::resample(
                &mut self.arena,
                normalized,
                rate,
                target.sample_rate,
                frame_count,
            );

            if let Some(gain) = Attenuation::from_volume_pan(params.volume, params.pan) {
                gain.apply(self.arena.samples_mut(stream));
            }

            self.arena.accumulate(mix, stream);
            self.consumed.push(got);
            self.played.push(params.status.is_playing());
            trace!(voice = %voice.id(), demand, got, rate, "Mixed voice");
        }

        let scale = 1.0 / voices.len() as f32;
        for s in self.arena.samples_mut(mix) {
            *s *= scale;
        }

        let out = self.arena.alloc_bytes(frame_count * target.block_align());
        {
            let (samples, bytes) = self.arena.split_mut(mix, out);
            convert::encode_float(samples, bytes);
        }

        // Both cursors move: the buffer behaves as a sliding window.
        // Play state comes from the same snapshot as the gains.
        for ((voice, &got), &played) in voices.iter().zip(&self.consumed).zip(&self.played) {
            if played {
                voice.buffer().advance_cursors(got)?;
            }
        }

        self.output = Some(out);
        Ok(self.arena.bytes(out))
    }

    /// Output of the last successful mix.
    pub fn last_output(&self) -> Option<&[u8]> {
        self.output.map(|out| self.arena.bytes(out))
    }

    /// Source bytes each voice supplied in the last mix, in voice order.
    pub fn consumed(&self) -> &[usize] {
        &self.consumed
    }

    /// Per-voice play state sampled for the last mix, in voice order.
    pub fn played(&self) -> &[bool] {
        &self.played
    }

    pub fn arena(&self) -> &ScratchArena {
        &self.arena
    }
}
