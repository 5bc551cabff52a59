//! Sample format conversion and linear-interpolation resampling.
//!
//! Everything between the voice's wire format and the device's wire format is
//! interleaved stereo `f32` in the range [-1, 1].

use crate::scratch::{SampleSlice, ScratchArena};
use dsbridge_core::{BridgeError, Result, SampleEncoding, WaveFormat};

/// Check that the mixer can decode `format`.
pub fn check_source_format(format: &WaveFormat) -> Result<()> {
    if format.encoding != SampleEncoding::Pcm
        || !matches!(format.bits_per_sample, 8 | 16)
        || !matches!(format.channels, 1 | 2)
    {
        return Err(BridgeError::unsupported(format!(
            "source format {:?}/{}ch/{}bit",
            format.encoding, format.channels, format.bits_per_sample
        )));
    }
    Ok(())
}

/// Check that the mixer can produce `format`.
pub fn check_target_format(format: &WaveFormat) -> Result<()> {
    format.validate()?;
    if format.encoding != SampleEncoding::IeeeFloat {
        return Err(BridgeError::unsupported(format!(
            "mixing to {}-bit PCM targets",
            format.bits_per_sample
        )));
    }
    if format.channels != 2 {
        return Err(BridgeError::unsupported(format!(
            "mixing to {} channel targets",
            format.channels
        )));
    }
    Ok(())
}

/// Decode PCM `src` into interleaved stereo `out`.
///
/// `out` holds `out.len() / 2` frames; frames past the end of `src` are left
/// untouched, so a zeroed `out` ends in silence.
pub fn normalize_to_stereo(src: &[u8], format: &WaveFormat, out: &mut [f32]) -> Result<()> {
    check_source_format(format)?;
    let frames = format.frames_in(src.len()).min(out.len() / 2);
    let mono = format.channels == 1;

    match format.bits_per_sample {
        8 => {
            let decode = |b: u8| (b as f32 - 128.0) / 128.0;
            for i in 0..frames {
                let (l, r) = if mono {
                    let s = decode(src[i]);
                    (s, s)
                } else {
                    (decode(src[i * 2]), decode(src[i * 2 + 1]))
                };
                out[i * 2] = l;
                out[i * 2 + 1] = r;
            }
        }
        _ => {
            let decode = |at: usize| i16::from_le_bytes([src[at], src[at + 1]]) as f32 / 32768.0;
            for i in 0..frames {
                let (l, r) = if mono {
                    let s = decode(i * 2);
                    (s, s)
                } else {
                    (decode(i * 4), decode(i * 4 + 2))
                };
                out[i * 2] = l;
                out[i * 2 + 1] = r;
            }
        }
    }
    Ok(())
}

/// Resample stereo `input` from `in_rate` to `out_rate`, producing `out_frames`.
///
/// Equal rates return `input` itself.
pub fn resample(
    arena: &mut ScratchArena,
    input: SampleSlice,
    in_rate: u32,
    out_rate: u32,
    out_frames: usize,
) -> SampleSlice {
    if in_rate == out_rate {
        return input;
    }

    let output = arena.alloc_samples(out_frames * 2);
    let in_frames = input.len() / 2;
    if in_frames == 0 {
        return output;
    }

    let last = in_frames - 1;
    let step = in_rate as f64 / out_rate as f64;
    for i in 0..out_frames {
        let t = i as f64 * step;
        let base = t.floor();
        let frac = (t - base) as f32;
        let i0 = (base as usize).min(last);
        let i1 = (i0 + 1).min(last);
        for c in 0..2 {
            let a = arena.samples(input)[i0 * 2 + c];
            let b = arena.samples(input)[i1 * 2 + c];
            arena.samples_mut(output)[i * 2 + c] = a + (b - a) * frac;
        }
    }
    output
}

/// Encode interleaved stereo `mix` into a float target.
pub fn encode_float(mix: &[f32], out: &mut [u8]) {
    for (sample, chunk) in mix.iter().zip(out.chunks_exact_mut(4)) {
        chunk.copy_from_slice(&sample.to_le_bytes());
    }
}
