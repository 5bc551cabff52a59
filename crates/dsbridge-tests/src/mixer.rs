//! Integration tests for the mix pipeline.

use dsbridge_audio::convert::{normalize_to_stereo, resample};
use dsbridge_audio::{Attenuation, Frequency, Mixer, ScratchArena, Voice, VoiceDesc};
use dsbridge_core::{BridgeError, WaveFormat};
use std::sync::Arc;

fn target() -> WaveFormat {
    WaveFormat::ieee_float(2, 44_100)
}

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Playing 16-bit stereo voice whose every sample is `value`.
fn constant_voice(value: i16, frames: usize) -> Arc<Voice> {
    let format = WaveFormat::pcm(2, 44_100, 16);
    let voice = Voice::new(VoiceDesc::new(format, (frames + 1) * format.block_align())).unwrap();
    let pcm: Vec<u8> = std::iter::repeat(value.to_le_bytes())
        .take(frames * 2)
        .flatten()
        .collect();
    assert_eq!(voice.write(&pcm).unwrap(), pcm.len());
    voice.play(false);
    Arc::new(voice)
}

#[test]
fn equal_rate_resample_is_passthrough() {
    let mut arena = ScratchArena::with_capacity(64, 0);
    let input = arena.alloc_samples(8);
    arena
        .samples_mut(input)
        .copy_from_slice(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3, 0.4, -0.4]);

    let output = resample(&mut arena, input, 44_100, 44_100, 4);
    assert_eq!(output, input);
    assert_eq!(arena.samples(output), &[0.1, -0.1, 0.2, -0.2, 0.3, -0.3, 0.4, -0.4]);
    assert_eq!(arena.samples_used(), 8);
}

#[test]
fn unsigned_midpoint_is_silence() {
    let format = WaveFormat::pcm(1, 22_050, 8);
    for frames in [1usize, 3, 128, 4096] {
        let src = vec![128u8; frames];
        let mut out = vec![1.0f32; frames * 2];
        normalize_to_stereo(&src, &format, &mut out).unwrap();
        assert!(out.iter().all(|&s| s == 0.0), "{frames} frames");
    }
}

#[test]
fn hard_pan_zeroes_opposite_channel() {
    let left = Attenuation::from_volume_pan(1.0, -1.0).unwrap();
    assert_eq!(left.right, 0.0);
    assert_eq!(left.left, 1.0);

    let right = Attenuation::from_volume_pan(1.0, 1.0).unwrap();
    assert_eq!(right.left, 0.0);

    let mut samples = vec![0.5f32; 16];
    left.apply(&mut samples);
    for frame in samples.chunks_exact(2) {
        assert_eq!(frame, &[0.5, 0.0]);
    }
}

#[test]
fn mix_of_equal_constants_is_that_constant() {
    let voices = vec![constant_voice(8192, 64), constant_voice(8192, 64)];
    let mut mixer = Mixer::new(64);
    let out = mixer.mix(&voices, &target(), 32).unwrap();
    assert_eq!(out.len(), 32 * 8);
    assert!(floats(out).iter().all(|&s| s == 0.25));
}

#[test]
fn mix_averages_unequal_voices() {
    let voices = vec![constant_voice(16384, 16), constant_voice(0, 16)];
    let mut mixer = Mixer::new(16);
    let out = mixer.mix(&voices, &target(), 8).unwrap();
    assert!(floats(out).iter().all(|&s| s == 0.25));
}

#[test]
fn unsupported_voice_formats_fail() {
    let mut mixer = Mixer::new(16);
    for format in [WaveFormat::pcm(2, 44_100, 24), WaveFormat::pcm(4, 44_100, 16)] {
        let voice = Arc::new(Voice::new(VoiceDesc::new(format, format.block_align() * 16)).unwrap());
        voice.play(false);
        assert!(matches!(
            mixer.mix(&[voice], &target(), 8),
            Err(BridgeError::NotSupported(_))
        ));
    }
}

#[test]
fn pcm_target_is_not_supported() {
    let voices = vec![constant_voice(100, 8)];
    let mut mixer = Mixer::new(8);
    assert!(matches!(
        mixer.mix(&voices, &WaveFormat::pcm(2, 44_100, 16), 8),
        Err(BridgeError::NotSupported(_))
    ));
}

#[test]
fn frequency_override_changes_demand() {
    let voice = constant_voice(8192, 200);
    voice.set_frequency(Frequency::Hz(22_050)).unwrap();
    let mut mixer = Mixer::new(64);
    mixer.mix(&[Arc::clone(&voice)], &target(), 100).unwrap();
    // half the output rate: 50 source frames of 4 bytes
    assert_eq!(mixer.consumed(), &[200]);
    // both cursors move, the write cursor wrapping past 804
    assert_eq!(voice.positions(), (200, 196));
}
